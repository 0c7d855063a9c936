//! rawline - small raw-mode line editor
//!
//! Features:
//! - Byte-wise editing with cursor movement and history browsing
//! - History files with pluggable formats
//! - Cooperates with Ctrl-C, suspend and resume
//! - Argument parser for the accompanying tools

pub mod args;
pub mod config;
pub mod interrupt;
pub mod line;

pub use line::{LineError, Options, ReadOutcome, Session};

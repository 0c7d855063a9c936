//! Raw-mode line editing: buffer, history, key bindings and the read loop.

pub mod editor;
pub mod error;
pub mod history;
pub mod input;
pub mod keys;
pub mod term;

use serde::{Deserialize, Serialize};

pub use editor::{BasicEditCommand, EditBuffer, EditCommand, EditEffect, LineEditor};
pub use error::{ErrorKind, ErrorSlot, LineError};
pub use history::{History, HistoryCodec, HistoryEntry, LineCodec, UserData};
pub use input::{DefaultHooks, ExecStatus, LineHooks, LineReader, ReadOutcome, ReadStatus, Session};
pub use keys::{DefaultKeys, KeyContext, KeyHandler, KeyOutcome};
pub use term::{StdTerminal, TermEvent, Terminal};

/// Session options, also the `[terminal]` table of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Keep the signal keys (Ctrl-C, Ctrl-Z) working in raw mode.
    pub cbreak: bool,
    /// Turn on escape sequence processing in consoles that need it.
    pub enable_vt: bool,
    pub install_signal_handlers: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cbreak: false,
            enable_vt: true,
            install_signal_handlers: false,
        }
    }
}

//! Error types and the per-session last-error slot.

use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Category of the most recent failure, as kept by [`ErrorSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorKind {
    #[default]
    None,
    Write,
    NotTty,
    NotInitialized,
    MissingOutput,
    MissingPrompt,
    Interrupted,
    Read,
    Alloc,
    Terminal,
}

impl ErrorKind {
    /// Fixed description for kinds that don't carry an OS error.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorKind::None => "",
            ErrorKind::Write => "write failed",
            ErrorKind::NotTty => "Not inside a tty!",
            ErrorKind::NotInitialized => "Session must be initialized before reading",
            ErrorKind::MissingOutput => "Output line can not be absent",
            ErrorKind::MissingPrompt => "Prompt cannot be absent",
            ErrorKind::Interrupted => "Interrupt",
            ErrorKind::Read => "read failed",
            ErrorKind::Alloc => "Out of memory while growing the line buffer",
            ErrorKind::Terminal => "Terminal setup failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum LineError {
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("not inside a tty")]
    NotTty,
    #[error("session is not initialized")]
    NotInitialized,
    #[error("no output line given")]
    MissingOutput,
    #[error("no prompt given")]
    MissingPrompt,
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("failed to grow line buffer: {0}")]
    Alloc(#[from] TryReserveError),
    #[error("terminal setup failed: {0}")]
    Terminal(#[source] io::Error),
    #[error("history file {}: {source}", path.display())]
    HistoryFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("saving history to {}: {source}", path.display())]
    HistorySave {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("history file could not be parsed: {0}")]
    HistoryParse(String),
}

impl LineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LineError::Write(_) | LineError::HistorySave { .. } => ErrorKind::Write,
            LineError::NotTty => ErrorKind::NotTty,
            LineError::NotInitialized => ErrorKind::NotInitialized,
            LineError::MissingOutput => ErrorKind::MissingOutput,
            LineError::MissingPrompt => ErrorKind::MissingPrompt,
            LineError::Read(_) | LineError::HistoryParse(_) => ErrorKind::Read,
            LineError::HistoryFile { .. } => ErrorKind::Read,
            LineError::Alloc(_) => ErrorKind::Alloc,
            LineError::Terminal(_) => ErrorKind::Terminal,
        }
    }

    fn os_code(&self) -> Option<i32> {
        match self {
            LineError::Write(e)
            | LineError::Read(e)
            | LineError::Terminal(e)
            | LineError::HistoryFile { source: e, .. }
            | LineError::HistorySave { source: e, .. } => e.raw_os_error(),
            _ => None,
        }
    }
}

/// Last error recorded by a session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorSlot {
    kind: ErrorKind,
    os_code: Option<i32>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, kind: ErrorKind) {
        self.kind = kind;
        self.os_code = None;
    }

    pub fn record(&mut self, err: &LineError) {
        self.kind = err.kind();
        self.os_code = err.os_code();
    }

    pub fn clear(&mut self) {
        self.set(ErrorKind::None);
    }

    pub fn last(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable text for the stored error. Read and write failures
    /// render the underlying OS error when one was captured.
    pub fn message(&self) -> String {
        match (self.kind, self.os_code) {
            (ErrorKind::Read | ErrorKind::Write | ErrorKind::Terminal, Some(code)) => {
                io::Error::from_raw_os_error(code).to_string()
            }
            (kind, _) => kind.describe().to_string(),
        }
    }
}

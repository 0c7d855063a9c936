//! Command history with optional file persistence.
//!
//! Entries are append-only. A separate browsing cursor walks them for the
//! arrow keys: `None` is the live edit line, `Some(count)` sits just past the
//! newest entry, anything else points at an entry.

use std::any::Any;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::error::LineError;

/// Upper bound on how much of the history file is read at init. Longer
/// files are read from the end, so the newest entries survive.
pub const MAX_HISTFILE_LEN: u64 = 65536;
const INITIAL_CAPACITY: usize = 128;

/// Caller-owned data attached to an entry. The store never looks inside.
pub type UserData = Arc<dyn Any + Send + Sync>;

pub struct HistoryEntry {
    text: String,
    userdata: Option<UserData>,
}

impl HistoryEntry {
    pub fn text(&self) -> &str { &self.text }
    pub fn userdata(&self) -> Option<&UserData> { self.userdata.as_ref() }
}

impl std::fmt::Debug for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryEntry")
            .field("text", &self.text)
            .field("userdata", &self.userdata.is_some())
            .finish()
    }
}

/// Serialization of the history file.
pub trait HistoryCodec {
    /// Turns raw file bytes into entries, oldest first.
    fn parse(&self, data: &[u8]) -> Result<Vec<String>, LineError>;
    /// Renders the full history for saving.
    fn write(&self, entries: &[HistoryEntry]) -> Vec<u8>;
}

/// One entry per line; backslash, `\n` and `\r` are escaped. Lines that
/// aren't valid UTF-8 are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineCodec;

impl HistoryCodec for LineCodec {
    fn parse(&self, data: &[u8]) -> Result<Vec<String>, LineError> {
        let mut entries = Vec::new();
        for raw in data.split(|&b| b == b'\n') {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }
            match std::str::from_utf8(raw) {
                Ok(line) => entries.push(unescape_history_line(line)),
                Err(e) => trace!(error = %e, "skipping history line"),
            }
        }
        Ok(entries)
    }

    fn write(&self, entries: &[HistoryEntry]) -> Vec<u8> {
        let mut out = String::new();
        for entry in entries {
            out.push_str(&escape_history_line(entry.text()));
            out.push('\n');
        }
        out.into_bytes()
    }
}

pub fn escape_history_line(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape_history_line(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

struct Backing {
    path: PathBuf,
    file: File,
}

#[derive(Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    position: Option<usize>,
    backing: Option<Backing>,
    codec: Option<Box<dyn HistoryCodec>>,
    initialized: bool,
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("entries", &self.entries.len())
            .field("position", &self.position)
            .field("path", &self.backing.as_ref().map(|b| &b.path))
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl History {
    pub fn new() -> Self { Self::default() }

    pub fn with_codec(codec: impl HistoryCodec + 'static) -> Self {
        Self {
            codec: Some(Box::new(codec)),
            ..Self::default()
        }
    }

    pub fn set_codec(&mut self, codec: impl HistoryCodec + 'static) {
        self.codec = Some(Box::new(codec));
    }

    pub fn is_initialized(&self) -> bool { self.initialized }

    /// Prepares the store, optionally backed by `path`.
    ///
    /// The file is created if missing. With a codec configured, up to
    /// [`MAX_HISTFILE_LEN`] bytes are read and parsed once. Calling this on an
    /// initialized store does nothing.
    pub fn init(&mut self, path: Option<&Path>) -> Result<(), LineError> {
        if self.initialized {
            return Ok(());
        }
        self.entries = Vec::with_capacity(INITIAL_CAPACITY);
        self.position = None;

        if let Some(path) = path {
            let file_err = |source| LineError::HistoryFile {
                path: path.to_path_buf(),
                source,
            };
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(file_err)?;

            if let Some(codec) = &self.codec {
                let raw = read_tail(&mut file).map_err(file_err)?;
                let parsed = if raw.is_empty() { Vec::new() } else { codec.parse(&raw)? };
                for text in parsed {
                    self.push_entry(text, None)?;
                }
                debug!(path = %path.display(), entries = self.entries.len(), "history loaded");
            }
            self.backing = Some(Backing {
                path: path.to_path_buf(),
                file,
            });
        }
        self.initialized = true;
        self.get_last();
        Ok(())
    }

    /// Saves through the codec (if both a file and a codec are present) and
    /// frees every entry. A second call returns `NotInitialized`.
    pub fn shutdown(&mut self) -> Result<(), LineError> {
        if !self.initialized {
            return Err(LineError::NotInitialized);
        }
        let result = match (self.backing.take(), &self.codec) {
            (Some(mut backing), Some(codec)) => {
                let data = codec.write(&self.entries);
                let saved = save(&mut backing.file, &data).map_err(|source| {
                    LineError::HistorySave {
                        path: backing.path.clone(),
                        source,
                    }
                });
                if let Err(e) = &saved {
                    warn!("saving history failed: {e}");
                } else {
                    debug!(path = %backing.path.display(), bytes = data.len(), "history saved");
                }
                saved
            }
            _ => Ok(()),
        };
        self.entries = Vec::new();
        self.position = None;
        self.initialized = false;
        result
    }

    fn push_entry(&mut self, text: String, userdata: Option<UserData>) -> Result<(), LineError> {
        if self.entries.len() + 1 >= self.entries.capacity() {
            let target = self.entries.capacity().max(INITIAL_CAPACITY / 2) * 2;
            self.entries.try_reserve_exact(target - self.entries.len())?;
        }
        self.entries.push(HistoryEntry { text, userdata });
        Ok(())
    }

    /// Appends a copy of `text` and moves the browsing cursor past the newest
    /// entry. Returns the new cursor value (the entry count).
    pub fn append(&mut self, text: &str, userdata: Option<UserData>) -> Result<usize, LineError> {
        if !self.initialized {
            return Err(LineError::NotInitialized);
        }
        self.push_entry(text.to_string(), userdata)?;
        self.get_last();
        Ok(self.entries.len())
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    /// Moves toward older entries. Returns `None` on the live line and at the
    /// oldest entry; never wraps.
    pub fn previous(&mut self) -> Option<&HistoryEntry> {
        match self.position {
            Some(pos) if pos > 0 => {
                self.position = Some(pos - 1);
                self.entries.get(pos - 1)
            }
            _ => None,
        }
    }

    /// Moves toward newer entries. Returns `None` on the live line and at the
    /// newest entry.
    pub fn next(&mut self) -> Option<&HistoryEntry> {
        match self.position {
            Some(pos) if pos + 1 < self.entries.len() => {
                self.position = Some(pos + 1);
                self.entries.get(pos + 1)
            }
            _ => None,
        }
    }

    /// Puts the cursor just past the newest entry so the next `previous`
    /// returns it.
    pub fn get_last(&mut self) -> usize {
        if !self.entries.is_empty() {
            self.position = Some(self.entries.len());
        }
        self.entries.len()
    }

    /// Drops any browsing state; called whenever the line is edited.
    pub fn set_dirty(&mut self) {
        self.position = None;
    }

    pub fn position(&self) -> Option<usize> { self.position }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn entries(&self) -> &[HistoryEntry] { &self.entries }
}

/// The last [`MAX_HISTFILE_LEN`] bytes of `file`, starting at a line.
fn read_tail(file: &mut File) -> io::Result<Vec<u8>> {
    let len = file.metadata()?.len();
    let mut raw = Vec::new();
    if len <= MAX_HISTFILE_LEN {
        file.read_to_end(&mut raw)?;
        return Ok(raw);
    }
    // one byte more shows whether the cut lands on a line start
    file.seek(SeekFrom::Start(len - MAX_HISTFILE_LEN - 1))?;
    Read::take(&mut *file, MAX_HISTFILE_LEN + 1).read_to_end(&mut raw)?;
    let start = raw.iter().position(|&b| b == b'\n').map_or(raw.len(), |i| i + 1);
    raw.drain(..start);
    Ok(raw)
}

fn save(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(data)?;
    file.sync_all()
}

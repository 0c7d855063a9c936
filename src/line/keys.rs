//! Default key bindings.
//!
//! Bytes arrive one at a time. `ESC` starts a two byte sequence; `ESC [ A..D`
//! are the arrow keys. Everything else is either an edit command for the
//! editor or ignored.

use std::io::Write;

use tracing::trace;

use super::editor::{EditEffect, LineEditor, BACKSPACE, NEWLINE};
use super::error::LineError;
use super::history::History;

const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

/// Result of feeding one byte to a [`KeyHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not handled; the read loop just reads the next byte.
    Unhandled,
    /// Consumed with no visible change.
    Consumed,
    /// Consumed and the line must be redrawn.
    Changed,
}

/// State a key handler may touch.
pub struct KeyContext<'a> {
    pub editor: &'a mut LineEditor,
    pub history: &'a mut History,
    pub out: &'a mut dyn Write,
    /// Set to request completion of the current line.
    pub done: &'a mut bool,
}

impl KeyContext<'_> {
    /// Writes `s` completely, retrying interrupted writes.
    pub fn puts(&mut self, s: &[u8]) -> Result<(), LineError> {
        self.out.write_all(s).map_err(LineError::Write)?;
        self.out.flush().map_err(LineError::Write)
    }
}

/// Raw byte handler. Installing one replaces the default bindings entirely.
pub trait KeyHandler {
    fn handle(&mut self, byte: u8, ctx: &mut KeyContext<'_>) -> Result<KeyOutcome, LineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
    Right,
    Left,
}

/// Two byte lookahead after `ESC`.
#[derive(Debug, Default)]
pub struct EscapeDecoder {
    pending: bool,
    seq: [u8; 2],
    filled: usize,
}

pub enum Decoded {
    /// Still collecting.
    Partial,
    /// Sequence complete; `None` if it wasn't recognized.
    Done(Option<Arrow>),
}

impl EscapeDecoder {
    pub fn is_pending(&self) -> bool { self.pending }

    pub fn start(&mut self) {
        self.pending = true;
        self.seq = [0; 2];
        self.filled = 0;
    }

    /// Feeds one byte; always returns to normal mode after the second.
    pub fn feed(&mut self, byte: u8) -> Decoded {
        self.seq[self.filled] = byte;
        self.filled += 1;
        if self.filled < self.seq.len() {
            return Decoded::Partial;
        }
        self.pending = false;
        self.filled = 0;
        let arrow = match self.seq {
            [b'[', b'A'] => Some(Arrow::Up),
            [b'[', b'B'] => Some(Arrow::Down),
            [b'[', b'C'] => Some(Arrow::Right),
            [b'[', b'D'] => Some(Arrow::Left),
            _ => None,
        };
        Decoded::Done(arrow)
    }
}

#[derive(Debug, Default)]
pub struct DefaultKeys {
    escape: EscapeDecoder,
}

impl DefaultKeys {
    pub fn new() -> Self { Self::default() }

    fn arrow(&mut self, arrow: Arrow, ctx: &mut KeyContext<'_>) -> Result<KeyOutcome, LineError> {
        trace!(?arrow, "arrow key");
        let entry = match arrow {
            Arrow::Up => ctx.history.previous(),
            Arrow::Down => ctx.history.next(),
            Arrow::Right | Arrow::Left => {
                ctx.editor.move_by(if arrow == Arrow::Right { 1 } else { -1 });
                return Ok(KeyOutcome::Changed);
            }
        };
        match entry {
            Some(entry) => {
                ctx.editor.set_content(entry.text().as_bytes())?;
                Ok(KeyOutcome::Changed)
            }
            None => Ok(KeyOutcome::Consumed),
        }
    }

    /// Runs an edit command; `echo` is written only if the buffer changed.
    fn edit(byte: u8, echo: &[u8], ctx: &mut KeyContext<'_>) -> Result<KeyOutcome, LineError> {
        ctx.history.set_dirty();
        match ctx.editor.apply(byte)? {
            EditEffect::Redraw => {
                ctx.puts(echo)?;
                Ok(KeyOutcome::Changed)
            }
            EditEffect::None => Ok(KeyOutcome::Consumed),
        }
    }
}

impl KeyHandler for DefaultKeys {
    fn handle(&mut self, byte: u8, ctx: &mut KeyContext<'_>) -> Result<KeyOutcome, LineError> {
        if self.escape.is_pending() {
            return match self.escape.feed(byte) {
                Decoded::Partial | Decoded::Done(None) => Ok(KeyOutcome::Consumed),
                Decoded::Done(Some(arrow)) => self.arrow(arrow, ctx),
            };
        }
        match byte {
            b'\r' | b'\n' => {
                ctx.editor.apply(NEWLINE)?;
                *ctx.done = true;
                ctx.puts(b"\r\n")?;
                Ok(KeyOutcome::Changed)
            }
            ESC => {
                self.escape.start();
                Ok(KeyOutcome::Consumed)
            }
            DEL | BACKSPACE => Self::edit(BACKSPACE, b"\x08 \x08", ctx),
            b'\t' | 0x20.. => Self::edit(byte, &[byte], ctx),
            _ => Ok(KeyOutcome::Unhandled),
        }
    }
}

//! Editable line buffer.
//!
//! The buffer is a plain byte vector with a cursor. Multi-byte characters are
//! not interpreted; every byte is one column.

use super::error::LineError;

pub const MIN_CAPACITY: usize = 128;
const CONTENT_ALIGN: usize = 16;

pub const BACKSPACE: u8 = 0x08;
pub const NEWLINE: u8 = b'\n';

/// What the caller has to do after a command was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditEffect {
    /// Nothing visible changed.
    None,
    /// The buffer changed and the line has to be redrawn.
    Redraw,
}

/// Byte buffer plus cursor and the last committed character.
///
/// `0 <= cursor <= len <= capacity` holds after every operation.
#[derive(Debug, Default)]
pub struct EditBuffer {
    bytes: Vec<u8>,
    cursor: usize,
    last_char: u8,
    initialized: bool,
}

impl EditBuffer {
    pub fn new() -> Self { Self::default() }

    /// Drops the storage and starts over.
    pub fn reset(&mut self) {
        self.bytes = Vec::new();
        self.cursor = 0;
        self.last_char = 0;
        self.initialized = true;
    }

    fn ensure_init(&mut self) {
        if !self.initialized {
            self.reset();
        }
    }

    pub fn as_bytes(&self) -> &[u8] { &self.bytes }
    pub fn len(&self) -> usize { self.bytes.len() }
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }
    pub fn capacity(&self) -> usize { self.bytes.capacity() }
    pub fn cursor(&self) -> usize { self.cursor }
    pub fn last_char(&self) -> u8 { self.last_char }
    pub fn set_last_char(&mut self, c: u8) { self.last_char = c; }

    /// Inserts `c` at the cursor and advances past it.
    pub fn insert(&mut self, c: u8) -> Result<(), LineError> {
        self.ensure_init();
        if self.bytes.len() + 1 >= self.bytes.capacity() {
            let target = match self.bytes.capacity() {
                0 => MIN_CAPACITY,
                cap => cap * 2,
            };
            self.bytes.try_reserve_exact(target - self.bytes.len())?;
        }
        self.bytes.insert(self.cursor, c);
        self.cursor += 1;
        self.last_char = c;
        Ok(())
    }

    /// Deletes the byte before the cursor. Returns false at column 0.
    pub fn delete_before_cursor(&mut self) -> bool {
        self.ensure_init();
        if self.cursor == 0 {
            return false;
        }
        self.bytes.remove(self.cursor - 1);
        self.cursor -= 1;
        self.last_char = match self.cursor {
            0 => 0,
            n => self.bytes[n - 1],
        };
        true
    }

    /// Relative motion, saturating at both ends.
    pub fn move_by(&mut self, offset: isize) {
        self.ensure_init();
        let target = if offset < 0 {
            self.cursor.saturating_sub(offset.unsigned_abs())
        } else {
            self.cursor.saturating_add(offset as usize)
        };
        self.cursor = target.min(self.bytes.len());
    }

    /// Absolute motion, clamped to `[0, len]`.
    pub fn goto(&mut self, pos: isize) {
        self.ensure_init();
        self.cursor = if pos < 0 { 0 } else { (pos as usize).min(self.bytes.len()) };
    }

    /// Replaces the whole buffer with a copy of `content` and puts the cursor at
    /// the end. Empty content leaves an empty buffer.
    pub fn set_content(&mut self, content: &[u8]) -> Result<(), LineError> {
        self.initialized = true;
        if content.is_empty() {
            self.bytes = Vec::new();
            self.cursor = 0;
            self.last_char = 0;
            return Ok(());
        }
        let capacity = content.len().div_ceil(CONTENT_ALIGN) * CONTENT_ALIGN + CONTENT_ALIGN;
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(capacity)?;
        bytes.extend_from_slice(content);
        self.bytes = bytes;
        self.cursor = self.bytes.len();
        self.last_char = content[content.len() - 1];
        Ok(())
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Interprets single-character edit commands against a buffer.
///
/// Installing a custom implementation replaces the built-in backspace,
/// newline and insert behavior entirely.
pub trait EditCommand {
    fn apply(&mut self, buf: &mut EditBuffer, c: u8) -> Result<EditEffect, LineError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BasicEditCommand;

impl EditCommand for BasicEditCommand {
    fn apply(&mut self, buf: &mut EditBuffer, c: u8) -> Result<EditEffect, LineError> {
        match c {
            BACKSPACE => Ok(if buf.delete_before_cursor() {
                EditEffect::Redraw
            } else {
                EditEffect::None
            }),
            // completion marker, not content
            NEWLINE => {
                buf.set_last_char(NEWLINE);
                Ok(EditEffect::None)
            }
            c => {
                buf.insert(c)?;
                Ok(EditEffect::Redraw)
            }
        }
    }
}

/// Buffer plus the command strategy that edits it.
pub struct LineEditor {
    buffer: EditBuffer,
    command: Box<dyn EditCommand>,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LineEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineEditor").field("buffer", &self.buffer).finish_non_exhaustive()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self::with_command(BasicEditCommand)
    }

    pub fn with_command(command: impl EditCommand + 'static) -> Self {
        Self {
            buffer: EditBuffer::new(),
            command: Box::new(command),
        }
    }

    pub fn set_command(&mut self, command: impl EditCommand + 'static) {
        self.command = Box::new(command);
    }

    pub fn reset(&mut self) { self.buffer.reset(); }

    pub fn apply(&mut self, c: u8) -> Result<EditEffect, LineError> {
        self.command.apply(&mut self.buffer, c)
    }

    pub fn move_by(&mut self, offset: isize) { self.buffer.move_by(offset); }
    pub fn goto(&mut self, pos: isize) { self.buffer.goto(pos); }
    pub fn last_char(&self) -> u8 { self.buffer.last_char() }

    pub fn set_content(&mut self, content: &[u8]) -> Result<(), LineError> {
        self.buffer.set_content(content)
    }

    pub fn buffer(&self) -> &EditBuffer { &self.buffer }
    pub fn as_bytes(&self) -> &[u8] { self.buffer.as_bytes() }
    pub fn len(&self) -> usize { self.buffer.len() }
    pub fn is_empty(&self) -> bool { self.buffer.is_empty() }
    pub fn cursor(&self) -> usize { self.buffer.cursor() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> LineEditor {
        let mut editor = LineEditor::new();
        editor.reset();
        for b in text.bytes() {
            editor.apply(b).unwrap();
        }
        editor
    }

    #[test]
    fn test_insert_appends() {
        let editor = typed("hi");
        assert_eq!(editor.as_bytes(), b"hi");
        assert_eq!(editor.cursor(), 2);
        assert_eq!(editor.last_char(), b'i');
    }

    #[test]
    fn test_effects() {
        let mut editor = LineEditor::new();
        editor.reset();
        assert_eq!(editor.apply(BACKSPACE).unwrap(), EditEffect::None);
        assert_eq!(editor.apply(b'x').unwrap(), EditEffect::Redraw);
        assert_eq!(editor.apply(NEWLINE).unwrap(), EditEffect::None);
        assert_eq!(editor.apply(BACKSPACE).unwrap(), EditEffect::Redraw);
    }

    #[test]
    fn test_first_insert_reserves_minimum() {
        let mut buf = EditBuffer::new();
        buf.insert(b'x').unwrap();
        assert!(buf.capacity() >= MIN_CAPACITY);
    }

    #[test]
    fn test_growth_keeps_content() {
        let text: String = std::iter::repeat('a').take(300).collect();
        let editor = typed(&text);
        assert_eq!(editor.len(), 300);
        assert!(editor.buffer().capacity() >= 300);
        assert_eq!(editor.as_bytes(), text.as_bytes());
    }

    #[test]
    fn test_backspace_at_end() {
        let mut editor = typed("hello");
        assert_eq!(editor.apply(BACKSPACE).unwrap(), EditEffect::Redraw);
        assert_eq!(editor.as_bytes(), b"hell");
        assert_eq!(editor.cursor(), 4);
        assert_eq!(editor.last_char(), b'l');
    }

    #[test]
    fn test_backspace_mid_buffer() {
        let mut editor = typed("abcd");
        editor.move_by(-2);
        editor.apply(BACKSPACE).unwrap();
        assert_eq!(editor.as_bytes(), b"acd");
        assert_eq!(editor.cursor(), 1);
        assert_eq!(editor.last_char(), b'a');
    }

    #[test]
    fn test_backspace_to_empty_uses_sentinel() {
        let mut editor = typed("a");
        editor.apply(BACKSPACE).unwrap();
        assert!(editor.is_empty());
        assert_eq!(editor.last_char(), 0);
        // nothing left to delete
        assert_eq!(editor.apply(BACKSPACE).unwrap(), EditEffect::None);
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_newline_marks_without_inserting() {
        let mut editor = typed("ls");
        editor.apply(NEWLINE).unwrap();
        assert_eq!(editor.as_bytes(), b"ls");
        assert_eq!(editor.last_char(), b'\n');
    }

    #[test]
    fn test_insert_then_delete_mid_restores() {
        let mut editor = typed("hello world");
        editor.goto(5);
        editor.apply(b',').unwrap();
        assert_eq!(editor.as_bytes(), b"hello, world");
        assert_eq!(editor.cursor(), 6);
        editor.apply(BACKSPACE).unwrap();
        assert_eq!(editor.as_bytes(), b"hello world");
        assert_eq!(editor.cursor(), 5);
    }

    #[test]
    fn test_move_clamps() {
        let mut editor = typed("abc");
        editor.move_by(-10);
        assert_eq!(editor.cursor(), 0);
        editor.move_by(2);
        assert_eq!(editor.cursor(), 2);
        editor.move_by(isize::MAX);
        assert_eq!(editor.cursor(), 3);
        editor.move_by(isize::MIN);
        assert_eq!(editor.cursor(), 0);
    }

    #[test]
    fn test_goto_clamps() {
        let mut editor = typed("abc");
        editor.goto(-4);
        assert_eq!(editor.cursor(), 0);
        editor.goto(99);
        assert_eq!(editor.cursor(), 3);
        editor.goto(1);
        assert_eq!(editor.cursor(), 1);
    }

    #[test]
    fn test_lazy_init_before_reset() {
        let mut editor = LineEditor::new();
        editor.move_by(3);
        assert_eq!(editor.cursor(), 0);
        editor.apply(b'z').unwrap();
        assert_eq!(editor.as_bytes(), b"z");
    }

    #[test]
    fn test_set_content() {
        let mut editor = typed("old");
        editor.set_content(b"git status").unwrap();
        assert_eq!(editor.as_bytes(), b"git status");
        assert_eq!(editor.cursor(), 10);
        assert_eq!(editor.last_char(), b's');
        assert!(editor.buffer().capacity() >= 16);
    }

    #[test]
    fn test_set_content_empty_clears() {
        let mut editor = typed("old");
        editor.set_content(b"").unwrap();
        assert!(editor.is_empty());
        assert_eq!(editor.cursor(), 0);
        assert_eq!(editor.last_char(), 0);
    }

    #[test]
    fn test_random_edits_keep_invariants() {
        let mut editor = LineEditor::new();
        editor.reset();
        let mut expected_len = 0usize;
        // deterministic pseudo random walk
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..2000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            match seed % 4 {
                0 => {
                    let before = editor.cursor();
                    editor.apply(BACKSPACE).unwrap();
                    if before > 0 {
                        expected_len -= 1;
                    }
                }
                1 => editor.move_by((seed % 7) as isize - 3),
                _ => {
                    editor.apply(b'a' + (seed % 26) as u8).unwrap();
                    expected_len += 1;
                }
            }
            assert_eq!(editor.len(), expected_len);
            assert!(editor.cursor() <= editor.len());
            assert!(editor.len() <= editor.buffer().capacity());
        }
    }

    struct Upper;

    impl EditCommand for Upper {
        fn apply(&mut self, buf: &mut EditBuffer, c: u8) -> Result<EditEffect, LineError> {
            buf.insert(c.to_ascii_uppercase())?;
            Ok(EditEffect::Redraw)
        }
    }

    #[test]
    fn test_custom_command_overrides_everything() {
        let mut editor = LineEditor::with_command(Upper);
        editor.reset();
        for b in b"ab\x08" {
            editor.apply(*b).unwrap();
        }
        // backspace was inserted, not interpreted
        assert_eq!(editor.as_bytes(), b"AB\x08");
    }
}

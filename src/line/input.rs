//! The read loop.
//!
//! A [`Session`] owns the terminal, the editor and the history. Each call to
//! [`Session::read_line`] writes the prompt, feeds input bytes to the key
//! handler and redraws after every visible change until the completion hook
//! reports the line as finished.

use std::io;

use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use tracing::{debug, info, trace, warn};
use unicode_width::UnicodeWidthChar;

use super::editor::{LineEditor, BACKSPACE, NEWLINE};
use super::error::{ErrorKind, ErrorSlot, LineError};
use super::history::History;
use super::keys::{DefaultKeys, KeyContext, KeyHandler, KeyOutcome};
use super::term::{StdTerminal, TermEvent, Terminal};
use super::Options;
use crate::interrupt::SignalKind;

/// What [`Session::read_into`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// A finished line of this many bytes was written to the output.
    Line(usize),
    /// A signal cut the read short. Not fatal; read again.
    Interrupted,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    Interrupted,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Continue,
    /// Shut the session down and exit the process.
    Exit,
}

/// The session as seen from [`LineHooks::exec`].
pub trait LineReader {
    /// Reads a nested line. Raw mode stays on until the outermost read ends.
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome, LineError>;
    fn history_mut(&mut self) -> &mut History;
    fn puts(&mut self, s: &str) -> Result<(), LineError>;
    /// Number of reads in progress.
    fn depth(&self) -> usize;
}

/// Completion and execution hooks.
pub trait LineHooks {
    /// Whether the line is finished. `done` is true when a key handler asked
    /// for completion since the last check.
    fn is_done(&mut self, done: bool, editor: &LineEditor) -> bool {
        done || editor.last_char() == NEWLINE
    }

    /// Runs once per finished line.
    ///
    /// Lines read through `reader` while this runs complete on Enter and are
    /// not passed to `exec` again.
    fn exec(&mut self, line: &str, reader: &mut dyn LineReader) -> ExecStatus;
}

/// Installed while `exec` runs.
struct NestedHooks;

impl LineHooks for NestedHooks {
    fn exec(&mut self, _line: &str, _reader: &mut dyn LineReader) -> ExecStatus {
        ExecStatus::Continue
    }
}

/// Records non-empty lines in the history; the exit keyword ends the process.
#[derive(Debug, Clone)]
pub struct DefaultHooks {
    pub exit_keyword: Option<String>,
}

impl Default for DefaultHooks {
    fn default() -> Self {
        Self { exit_keyword: Some("exit".to_string()) }
    }
}

impl LineHooks for DefaultHooks {
    fn exec(&mut self, line: &str, reader: &mut dyn LineReader) -> ExecStatus {
        if !line.is_empty() {
            if let Err(e) = reader.history_mut().append(line, None) {
                warn!(error = %e, "history append failed");
            }
        }
        match &self.exit_keyword {
            Some(keyword) if keyword == line => ExecStatus::Exit,
            _ => ExecStatus::Continue,
        }
    }
}

pub struct Session<T: Terminal = StdTerminal> {
    term: T,
    options: Options,
    initialized: bool,
    depth: usize,
    prompt: Option<String>,
    editor: LineEditor,
    history: History,
    keys: Box<dyn KeyHandler>,
    hooks: Box<dyn LineHooks>,
    done: bool,
    errors: ErrorSlot,
}

impl Session<StdTerminal> {
    /// Session on the process's stdin/stdout.
    pub fn stdio() -> Self { Self::new(StdTerminal::new()) }
}

impl<T: Terminal> Session<T> {
    pub fn new(term: T) -> Self {
        Self {
            term,
            options: Options::default(),
            initialized: false,
            depth: 0,
            prompt: None,
            editor: LineEditor::new(),
            history: History::new(),
            keys: Box::new(DefaultKeys::new()),
            hooks: Box::new(DefaultHooks::default()),
            done: false,
            errors: ErrorSlot::new(),
        }
    }

    pub fn set_key_handler(&mut self, keys: impl KeyHandler + 'static) {
        self.keys = Box::new(keys);
    }

    pub fn set_hooks(&mut self, hooks: impl LineHooks + 'static) {
        self.hooks = Box::new(hooks);
    }

    /// Replaces the history store. Initialize it first to keep it file backed.
    pub fn set_history(&mut self, history: History) {
        self.history = history;
    }

    pub fn history(&self) -> &History { &self.history }
    pub fn history_mut(&mut self) -> &mut History { &mut self.history }
    pub fn editor(&self) -> &LineEditor { &self.editor }
    pub fn editor_mut(&mut self) -> &mut LineEditor { &mut self.editor }
    pub fn terminal(&self) -> &T { &self.term }
    pub fn options(&self) -> &Options { &self.options }
    pub fn is_initialized(&self) -> bool { self.initialized }
    pub fn depth(&self) -> usize { self.depth }

    pub fn set_error(&mut self, kind: ErrorKind) { self.errors.set(kind); }
    pub fn last_error(&self) -> ErrorKind { self.errors.last() }
    pub fn error_message(&self) -> String { self.errors.message() }

    /// Prepares the terminal. A second call is a no-op.
    ///
    /// A history store that wasn't initialized yet is initialized in memory.
    pub fn init(&mut self, options: Options) -> Result<(), LineError> {
        if self.initialized {
            return Ok(());
        }
        self.options = options;
        if self.term.is_tty() {
            if let Err(e) = self.term.configure(&self.options) {
                let err = LineError::Terminal(e);
                self.errors.record(&err);
                return Err(err);
            }
        }
        if !self.history.is_initialized() {
            self.history.init(None)?;
        }
        self.initialized = true;
        debug!(?options, "session initialized");
        Ok(())
    }

    /// Restores the terminal and saves the history. Does nothing if the
    /// session isn't initialized.
    pub fn shutdown(&mut self) -> Result<(), LineError> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;
        self.depth = 0;
        if self.term.is_tty() {
            self.term.restore().map_err(LineError::Terminal)?;
        }
        match self.history.shutdown() {
            Ok(()) | Err(LineError::NotInitialized) => {}
            Err(e) => return Err(e),
        }
        debug!("session shut down");
        Ok(())
    }

    /// Reads one line with `prompt`.
    pub fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome, LineError> {
        let mut line = String::new();
        Ok(match self.read_into(Some(prompt), Some(&mut line))? {
            ReadStatus::Line(_) => ReadOutcome::Line(line),
            ReadStatus::Interrupted => ReadOutcome::Interrupted,
            ReadStatus::Eof => ReadOutcome::Eof,
        })
    }

    /// Reads one line into `out`. Preconditions are checked in order (tty,
    /// initialized, output, prompt) and fail without side effects.
    pub fn read_into(
        &mut self,
        prompt: Option<&str>,
        out: Option<&mut String>,
    ) -> Result<ReadStatus, LineError> {
        let result = self.read_checked(prompt, out);
        match &result {
            Ok(ReadStatus::Interrupted) => self.errors.set(ErrorKind::Interrupted),
            Ok(_) => {}
            Err(e) => self.errors.record(e),
        }
        result
    }

    fn read_checked(
        &mut self,
        prompt: Option<&str>,
        out: Option<&mut String>,
    ) -> Result<ReadStatus, LineError> {
        if !self.term.is_tty() {
            return Err(LineError::NotTty);
        }
        if !self.initialized {
            return Err(LineError::NotInitialized);
        }
        let out = out.ok_or(LineError::MissingOutput)?;
        let prompt = prompt.ok_or(LineError::MissingPrompt)?;
        out.clear();

        while let Some(sig) = self.term.pending_signal() {
            // An idle stop already happened through the default action.
            if sig == SignalKind::Suspend && self.depth == 0 {
                continue;
            }
            self.on_signal(sig)?;
        }

        let outer_prompt = self.prompt.replace(prompt.to_owned());
        self.depth += 1;
        if self.depth == 1 {
            if let Err(e) = self.term.enter_raw() {
                self.depth -= 1;
                self.prompt = outer_prompt;
                return Err(LineError::Terminal(e));
            }
        }
        let status = self.run(out);
        self.leave();
        self.prompt = outer_prompt;
        status
    }

    fn run(&mut self, out: &mut String) -> Result<ReadStatus, LineError> {
        self.write_prompt()?;
        self.editor.reset();
        self.history.get_last();
        self.done = false;
        self.redraw()?;

        loop {
            let event = match self.term.read_event() {
                Ok(event) => event,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    TermEvent::Signal(SignalKind::Interrupt)
                }
                Err(e) => {
                    warn!(error = %e, "read failed");
                    return Err(LineError::Read(e));
                }
            };
            let byte = match event {
                TermEvent::Byte(b) => b,
                TermEvent::Eof => {
                    debug!("end of input");
                    return Ok(ReadStatus::Eof);
                }
                TermEvent::Signal(SignalKind::Interrupt) => {
                    debug!("read interrupted");
                    self.editor.reset();
                    self.puts("^C\r\n")?;
                    return Ok(ReadStatus::Interrupted);
                }
                TermEvent::Signal(sig) => {
                    self.on_signal(sig)?;
                    continue;
                }
            };

            let outcome = {
                let mut ctx = KeyContext {
                    editor: &mut self.editor,
                    history: &mut self.history,
                    out: self.term.output(),
                    done: &mut self.done,
                };
                self.keys.handle(byte, &mut ctx)?
            };
            if outcome == KeyOutcome::Unhandled {
                trace!(byte, "unhandled byte");
                continue;
            }

            let done = std::mem::take(&mut self.done);
            if self.hooks.is_done(done, &self.editor) {
                return self.finish(out);
            }
            if outcome == KeyOutcome::Changed {
                self.redraw()?;
            }
        }
    }

    fn finish(&mut self, out: &mut String) -> Result<ReadStatus, LineError> {
        if self.editor.as_bytes().last() == Some(&NEWLINE) {
            self.editor.goto(self.editor.len() as isize);
            self.editor.apply(BACKSPACE)?;
        }
        out.push_str(&String::from_utf8_lossy(self.editor.as_bytes()));

        let mut hooks = std::mem::replace(&mut self.hooks, Box::new(NestedHooks));
        let status = hooks.exec(out, self);
        self.hooks = hooks;
        if status == ExecStatus::Exit {
            info!("exit requested");
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "shutdown before exit failed");
            }
            std::process::exit(0);
        }
        Ok(ReadStatus::Line(out.len()))
    }

    /// Common exit path of every read.
    fn leave(&mut self) {
        self.editor.reset();
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 && self.initialized {
            if let Err(e) = self.term.restore() {
                warn!(error = %e, "failed to restore terminal");
            }
        }
    }

    fn on_signal(&mut self, sig: SignalKind) -> Result<(), LineError> {
        debug!(?sig, depth = self.depth, "signal");
        match sig {
            SignalKind::Suspend => {
                self.term.restore().map_err(LineError::Terminal)?;
                self.term.suspend().map_err(LineError::Terminal)?;
            }
            SignalKind::Continue => {
                if self.depth > 0 {
                    self.term.enter_raw().map_err(LineError::Terminal)?;
                    self.redraw()?;
                }
            }
            SignalKind::Interrupt => {
                self.editor.reset();
                self.puts("^C\r\n")?;
                if self.depth > 0 {
                    self.redraw()?;
                }
            }
        }
        Ok(())
    }

    /// Writes all of `s` and flushes.
    pub fn puts(&mut self, s: &str) -> Result<(), LineError> {
        self.write_frame(s.as_bytes())
    }

    fn write_prompt(&mut self) -> Result<(), LineError> {
        let mut frame = Vec::new();
        self.queue_prompt(&mut frame).map_err(LineError::Write)?;
        self.write_frame(&frame)
    }

    fn queue_prompt(&self, frame: &mut Vec<u8>) -> io::Result<()> {
        let prompt = self.prompt.as_deref().unwrap_or_default();
        queue!(frame, Print("\r"), Clear(ClearType::UntilNewLine), Print(prompt))
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), LineError> {
        let out = self.term.output();
        out.write_all(frame).map_err(LineError::Write)?;
        out.flush().map_err(LineError::Write)
    }

    /// Clears the line and rewrites prompt and buffer, leaving the terminal
    /// cursor at the editor cursor.
    pub fn redraw(&mut self) -> Result<(), LineError> {
        let Some(prompt) = self.prompt.as_deref() else {
            return Ok(());
        };
        let column = self.editor.cursor() + prompt_width(prompt);
        let line = String::from_utf8_lossy(self.editor.as_bytes());

        let mut frame = Vec::with_capacity(self.editor.len() + 32);
        queue!(frame, Clear(ClearType::CurrentLine)).map_err(LineError::Write)?;
        self.queue_prompt(&mut frame).map_err(LineError::Write)?;
        queue!(frame, Print(line), MoveToColumn(clamp_u16(column))).map_err(LineError::Write)?;
        self.write_frame(&frame)
    }
}

impl<T: Terminal> LineReader for Session<T> {
    fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome, LineError> {
        Session::read_line(self, prompt)
    }

    fn history_mut(&mut self) -> &mut History { &mut self.history }

    fn puts(&mut self, s: &str) -> Result<(), LineError> {
        Session::puts(self, s)
    }

    fn depth(&self) -> usize { self.depth }
}

impl<T: Terminal> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "session shutdown on drop failed");
        }
    }
}

fn clamp_u16(value: usize) -> u16 {
    value.min(u16::MAX as usize) as u16
}

/// Columns taken by `prompt`, not counting CSI sequences.
fn prompt_width(prompt: &str) -> usize {
    let mut width = 0;
    let mut chars = prompt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for seq_char in chars.by_ref() {
                if matches!(seq_char as u32, 0x40..=0x7E) {
                    break;
                }
            }
            continue;
        }
        width += UnicodeWidthChar::width(c).unwrap_or(0);
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::history::LineCodec;
    use crate::line::term::scripted::ScriptedTerminal;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct NoExit;

    impl LineHooks for NoExit {
        fn exec(&mut self, line: &str, reader: &mut dyn LineReader) -> ExecStatus {
            if !line.is_empty() {
                reader.history_mut().append(line, None).unwrap();
            }
            ExecStatus::Continue
        }
    }

    fn session(term: ScriptedTerminal) -> Session<ScriptedTerminal> {
        let mut s = Session::new(term);
        s.set_hooks(NoExit);
        s.init(Options::default()).unwrap();
        s
    }

    #[test]
    fn test_reads_a_line() {
        let mut s = session(ScriptedTerminal::new().bytes(b"hello\r"));
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("hello".into()));
        assert_eq!(s.history().get(0).map(|e| e.text()), Some("hello"));
        assert_eq!(s.depth(), 0);
        assert!(s.editor().is_empty());
    }

    #[test]
    fn test_read_into_reports_length() {
        let mut s = session(ScriptedTerminal::new().bytes(b"abc\n"));
        let mut line = String::new();
        assert_eq!(s.read_into(Some("$ "), Some(&mut line)).unwrap(), ReadStatus::Line(3));
        assert_eq!(line, "abc");
    }

    #[test]
    fn test_preconditions_in_order() {
        let mut s = Session::new(ScriptedTerminal::new().not_tty());
        let mut line = String::new();
        let err = s.read_into(Some("> "), Some(&mut line)).unwrap_err();
        assert!(matches!(err, LineError::NotTty));
        assert_eq!(s.last_error(), ErrorKind::NotTty);

        let mut s = Session::new(ScriptedTerminal::new());
        let err = s.read_into(None, None).unwrap_err();
        assert!(matches!(err, LineError::NotInitialized));

        s.init(Options::default()).unwrap();
        let err = s.read_into(None, None).unwrap_err();
        assert!(matches!(err, LineError::MissingOutput));
        let err = s.read_into(None, Some(&mut line)).unwrap_err();
        assert!(matches!(err, LineError::MissingPrompt));
        assert_eq!(s.last_error(), ErrorKind::MissingPrompt);

        // nothing touched the terminal
        assert_eq!(s.terminal().raw_entries, 0);
        assert!(s.terminal().output.is_empty());
    }

    #[test]
    fn test_prompt_and_redraw_output() {
        let mut s = session(ScriptedTerminal::new().bytes(b"a\r"));
        s.read_line("> ").unwrap();
        let out = s.terminal().output_str();
        // prompt, first redraw, echo of 'a', redraw after 'a'
        let prompt = "\r\x1b[K> ";
        let expected = format!(
            "{prompt}\x1b[2K{prompt}\x1b[3Ga\x1b[2K{prompt}a\x1b[4G\r\n"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_raw_mode_toggles_once_per_read() {
        let mut s = session(ScriptedTerminal::new().bytes(b"x\ry\r"));
        s.read_line("> ").unwrap();
        assert!(!s.terminal().raw);
        s.read_line("> ").unwrap();
        assert_eq!(s.terminal().raw_entries, 2);
        assert_eq!(s.terminal().restores, 2);
    }

    #[test]
    fn test_unhandled_byte_does_not_redraw() {
        let mut s = session(ScriptedTerminal::new().bytes(b"\x01\x02\r"));
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line(String::new()));
        // one redraw on entry only
        assert_eq!(s.terminal().output_str().matches("\x1b[2K").count(), 1);
    }

    #[test]
    fn test_up_arrow_redraws_once() {
        let mut s = session(ScriptedTerminal::new().bytes(b"make\r\x1b[A\r"));
        s.read_line("> ").unwrap();
        let before = s.terminal().output.len();

        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("make".into()));
        let out = String::from_utf8_lossy(&s.terminal().output[before..]).into_owned();
        // entry redraw plus the one after the history splice
        assert_eq!(out.matches("\x1b[2K").count(), 2);
        assert!(out.contains("> make\x1b[7G"));
    }

    #[test]
    fn test_backspace_and_cursor_keys() {
        let mut s = session(ScriptedTerminal::new().bytes(b"abd\x7fc\x1b[D\x1b[DX\r"));
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("aXbc".into()));
    }

    #[test]
    fn test_eof() {
        let mut s = session(ScriptedTerminal::new().bytes(b"partial"));
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Eof);
        assert_eq!(s.depth(), 0);
        assert!(s.editor().is_empty());
        assert_eq!(s.terminal().restores, 1);
    }

    #[test]
    fn test_interrupted_read() {
        let term = ScriptedTerminal::new()
            .bytes(b"abc")
            .error(io::ErrorKind::Interrupted)
            .bytes(b"ok\r");
        let mut s = session(term);
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Interrupted);
        assert_eq!(s.last_error(), ErrorKind::Interrupted);
        assert!(s.terminal().output_str().ends_with("^C\r\n"));
        assert!(s.editor().is_empty());
        assert_eq!(s.depth(), 0);

        // retry succeeds
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("ok".into()));
    }

    #[test]
    fn test_interrupt_signal_event() {
        let term = ScriptedTerminal::new()
            .bytes(b"ab")
            .event(TermEvent::Signal(SignalKind::Interrupt));
        let mut s = session(term);
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Interrupted);
    }

    #[test]
    fn test_read_error() {
        let term = ScriptedTerminal::new().error(io::ErrorKind::BrokenPipe);
        let mut s = session(term);
        let err = s.read_line("> ").unwrap_err();
        assert!(matches!(err, LineError::Read(_)));
        assert_eq!(s.last_error(), ErrorKind::Read);
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn test_suspend_and_continue() {
        let term = ScriptedTerminal::new()
            .bytes(b"ab")
            .event(TermEvent::Signal(SignalKind::Suspend))
            .event(TermEvent::Signal(SignalKind::Continue))
            .bytes(b"c\r");
        let mut s = session(term);
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("abc".into()));
        let t = s.terminal();
        assert_eq!(t.suspends, 1);
        // entry, continue
        assert_eq!(t.raw_entries, 2);
        // suspend, exit
        assert_eq!(t.restores, 2);
    }

    #[test]
    fn test_pending_interrupt_is_handled_before_prompt() {
        let term = ScriptedTerminal::new().pending(SignalKind::Interrupt).bytes(b"x\r");
        let mut s = session(term);
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("x".into()));
        assert!(s.terminal().output_str().starts_with("^C\r\n\r\x1b[K> "));
    }

    #[test]
    fn test_idle_suspend_is_not_repeated() {
        let term = ScriptedTerminal::new().pending(SignalKind::Suspend).bytes(b"x\r");
        let mut s = session(term);
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("x".into()));
        assert_eq!(s.terminal().suspends, 0);
        assert_eq!(s.terminal().restores, 1);
    }

    #[test]
    fn test_loaded_history_is_browsable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"git status\n").unwrap();
        let mut history = History::with_codec(LineCodec);
        history.init(Some(file.path())).unwrap();

        let mut s = Session::new(ScriptedTerminal::new().bytes(b"\x1b[A\r"));
        s.set_history(history);
        s.set_hooks(NoExit);
        s.init(Options::default()).unwrap();
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("git status".into()));
    }

    #[test]
    fn test_history_browsable_after_interrupted_edit() {
        let term = ScriptedTerminal::new()
            .bytes(b"ls\rtyped")
            .event(TermEvent::Signal(SignalKind::Interrupt))
            .bytes(b"\x1b[A\r");
        let mut s = session(term);
        s.read_line("> ").unwrap();
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Interrupted);
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("ls".into()));
    }

    struct Confirm {
        answers: Rc<RefCell<Vec<(String, usize)>>>,
    }

    impl LineHooks for Confirm {
        fn exec(&mut self, line: &str, reader: &mut dyn LineReader) -> ExecStatus {
            if line == "rm" {
                let depth = reader.depth();
                if let Ok(ReadOutcome::Line(answer)) = reader.read_line("sure? ") {
                    self.answers.borrow_mut().push((answer, depth));
                }
            }
            ExecStatus::Continue
        }
    }

    #[test]
    fn test_nested_read_keeps_raw_mode() {
        let answers = Rc::new(RefCell::new(Vec::new()));
        let mut s = Session::new(ScriptedTerminal::new().bytes(b"rm\ryes\r"));
        s.set_hooks(Confirm { answers: Rc::clone(&answers) });
        s.init(Options::default()).unwrap();

        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("rm".into()));
        assert_eq!(*answers.borrow(), vec![("yes".to_string(), 1)]);
        assert_eq!(s.depth(), 0);
        let t = s.terminal();
        assert_eq!(t.raw_entries, 1);
        assert_eq!(t.restores, 1);
        assert!(!t.raw);
        assert!(t.output_str().contains("\r\x1b[Ksure? "));
    }

    #[test]
    fn test_write_failure_ends_read() {
        let mut s = session(ScriptedTerminal::new().failing_writes().bytes(b"x\r"));
        let err = s.read_line("> ").unwrap_err();
        assert!(matches!(err, LineError::Write(_)));
        assert_eq!(s.last_error(), ErrorKind::Write);
        assert_eq!(s.depth(), 0);
        assert!(s.editor().is_empty());
        let t = s.terminal();
        assert!(!t.raw);
        assert_eq!(t.raw_entries, 1);
        assert_eq!(t.restores, 1);

        assert!(matches!(s.puts("x"), Err(LineError::Write(_))));
    }

    #[test]
    fn test_continue_while_idle_does_nothing() {
        let term = ScriptedTerminal::new().pending(SignalKind::Continue).bytes(b"\r");
        let mut s = session(term);
        s.read_line("> ").unwrap();
        assert_eq!(s.terminal().raw_entries, 1);
    }

    #[test]
    fn test_empty_line_not_recorded() {
        let mut s = session(ScriptedTerminal::new().bytes(b"\r"));
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line(String::new()));
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_done_flag_from_custom_keys() {
        struct Semicolon(DefaultKeys);

        impl KeyHandler for Semicolon {
            fn handle(&mut self, byte: u8, ctx: &mut KeyContext<'_>) -> Result<KeyOutcome, LineError> {
                if byte == b';' {
                    *ctx.done = true;
                    return Ok(KeyOutcome::Consumed);
                }
                self.0.handle(byte, ctx)
            }
        }

        let mut s = session(ScriptedTerminal::new().bytes(b"ls;rest"));
        s.set_key_handler(Semicolon(DefaultKeys::new()));
        assert_eq!(s.read_line("> ").unwrap(), ReadOutcome::Line("ls".into()));
    }

    #[test]
    fn test_default_hooks() {
        let mut s = Session::new(ScriptedTerminal::new());
        s.init(Options::default()).unwrap();
        let mut hooks = DefaultHooks::default();
        assert_eq!(hooks.exec("", &mut s), ExecStatus::Continue);
        assert!(s.history().is_empty());
        assert_eq!(hooks.exec("ls", &mut s), ExecStatus::Continue);
        assert_eq!(hooks.exec("exit", &mut s), ExecStatus::Exit);
        assert_eq!(s.history().len(), 2);

        let mut editor = LineEditor::new();
        editor.reset();
        assert!(!hooks.is_done(false, &editor));
        assert!(hooks.is_done(true, &editor));
        editor.apply(NEWLINE).unwrap();
        assert!(hooks.is_done(false, &editor));
    }

    #[test]
    fn test_init_is_idempotent_and_shutdown_restores() {
        let mut s = session(ScriptedTerminal::new());
        s.init(Options { cbreak: true, ..Options::default() }).unwrap();
        assert!(!s.options().cbreak);
        s.shutdown().unwrap();
        assert!(!s.is_initialized());
        assert_eq!(s.terminal().restores, 1);
        s.shutdown().unwrap();
        assert_eq!(s.terminal().restores, 1);
    }

    #[test]
    fn test_set_error_stores_code() {
        let mut s = Session::new(ScriptedTerminal::new());
        s.set_error(ErrorKind::Write);
        assert_eq!(s.last_error(), ErrorKind::Write);
        assert_eq!(s.error_message(), "write failed");
    }

    #[test]
    fn test_prompt_width_skips_escapes() {
        assert_eq!(prompt_width("> "), 2);
        assert_eq!(prompt_width("\x1b[1;32m$\x1b[0m "), 2);
        assert_eq!(prompt_width("日本> "), 6);
    }
}

//! Terminal access for the session.
//!
//! [`Terminal`] is what [`Session`](super::Session) talks to; [`StdTerminal`]
//! drives the process's stdin/stdout.

use std::io::{self, Write};

use crossterm::tty::IsTty;
use tracing::{debug, trace};

use super::Options;
use crate::interrupt::{SignalKind, SignalWatch};

/// One unit of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermEvent {
    Byte(u8),
    /// Zero-byte read.
    Eof,
    Signal(SignalKind),
}

pub trait Terminal {
    fn is_tty(&self) -> bool;

    /// Captures the current attributes and derives the raw ones from them.
    fn configure(&mut self, options: &Options) -> io::Result<()>;

    fn enter_raw(&mut self) -> io::Result<()>;

    /// Puts back the attributes captured by [`configure`](Terminal::configure).
    fn restore(&mut self) -> io::Result<()>;

    /// Blocks until a byte, end of input or a signal arrives. A read cut
    /// short by a signal fails with [`io::ErrorKind::Interrupted`].
    fn read_event(&mut self) -> io::Result<TermEvent>;

    /// A signal that arrived while no read was waiting.
    fn pending_signal(&mut self) -> Option<SignalKind>;

    /// Stops the process until it is continued.
    fn suspend(&mut self) -> io::Result<()>;

    fn output(&mut self) -> &mut dyn Write;
}

#[cfg(unix)]
mod imp {
    use std::io::{self, Write};

    use rustix::event::{poll, PollFd, PollFlags};
    use rustix::io::Errno;
    use rustix::termios::{
        self, ControlModes, InputModes, LocalModes, OptionalActions, OutputModes,
        SpecialCodeIndex, Termios,
    };

    use super::*;

    pub struct StdTerminal {
        stdin: io::Stdin,
        stdout: io::Stdout,
        original: Option<Termios>,
        raw: Option<Termios>,
        signals: Option<SignalWatch>,
    }

    impl StdTerminal {
        pub fn new() -> Self {
            Self {
                stdin: io::stdin(),
                stdout: io::stdout(),
                original: None,
                raw: None,
                signals: None,
            }
        }

        /// Waits until stdin is readable or a signal was observed.
        fn wait_readable(&self, watch: &SignalWatch) -> io::Result<Option<SignalKind>> {
            loop {
                let mut fds = [
                    PollFd::new(&self.stdin, PollFlags::IN),
                    PollFd::new(watch.wake(), PollFlags::IN),
                ];
                match poll(&mut fds, None) {
                    Ok(_) | Err(Errno::INTR) => {}
                    Err(e) => return Err(e.into()),
                }
                let stdin_ready = !fds[0].revents().is_empty();
                if !fds[1].revents().is_empty() {
                    watch.drain();
                }
                if let Some(sig) = watch.take() {
                    return Ok(Some(sig));
                }
                if stdin_ready {
                    return Ok(None);
                }
            }
        }
    }

    impl Default for StdTerminal {
        fn default() -> Self { Self::new() }
    }

    /// Raw attributes derived from `t`. With `cbreak` the signal keys keep
    /// working.
    pub(crate) fn raw_attributes(t: &Termios, cbreak: bool) -> Termios {
        let mut raw = t.clone();
        raw.input_modes.remove(
            InputModes::BRKINT
                | InputModes::ICRNL
                | InputModes::INPCK
                | InputModes::ISTRIP
                | InputModes::IXON,
        );
        raw.output_modes.remove(OutputModes::OPOST);
        raw.control_modes.insert(ControlModes::CS8);
        raw.local_modes.remove(
            LocalModes::ECHO | LocalModes::ICANON | LocalModes::IEXTEN | LocalModes::ISIG,
        );
        if cbreak {
            raw.local_modes.insert(LocalModes::ISIG);
        }
        raw.special_codes[SpecialCodeIndex::VMIN] = 1;
        raw.special_codes[SpecialCodeIndex::VTIME] = 0;
        raw
    }

    impl Terminal for StdTerminal {
        fn is_tty(&self) -> bool {
            self.stdin.is_tty() && self.stdout.is_tty()
        }

        fn configure(&mut self, options: &Options) -> io::Result<()> {
            let original = termios::tcgetattr(&self.stdin)?;
            self.raw = Some(raw_attributes(&original, options.cbreak));
            self.original = Some(original);
            if options.install_signal_handlers && self.signals.is_none() {
                self.signals = Some(SignalWatch::install()?);
            }
            debug!(cbreak = options.cbreak, signals = self.signals.is_some(), "terminal configured");
            Ok(())
        }

        fn enter_raw(&mut self) -> io::Result<()> {
            if let Some(raw) = &self.raw {
                termios::tcsetattr(&self.stdin, OptionalActions::Flush, raw)?;
                trace!("raw mode on");
            }
            if let Some(watch) = &self.signals {
                watch.arm_suspend();
            }
            Ok(())
        }

        fn restore(&mut self) -> io::Result<()> {
            if let Some(watch) = &self.signals {
                watch.disarm_suspend();
            }
            if let Some(original) = &self.original {
                termios::tcsetattr(&self.stdin, OptionalActions::Flush, original)?;
                trace!("raw mode off");
            }
            Ok(())
        }

        fn read_event(&mut self) -> io::Result<TermEvent> {
            if let Some(watch) = &self.signals {
                if let Some(sig) = self.wait_readable(watch)? {
                    return Ok(TermEvent::Signal(sig));
                }
            }
            let mut byte = [0u8; 1];
            match rustix::io::read(&self.stdin, &mut byte[..]) {
                Ok(0) => Ok(TermEvent::Eof),
                Ok(_) => Ok(TermEvent::Byte(byte[0])),
                Err(e) => Err(e.into()),
            }
        }

        fn pending_signal(&mut self) -> Option<SignalKind> {
            self.signals.as_ref().and_then(SignalWatch::take)
        }

        fn suspend(&mut self) -> io::Result<()> {
            match &self.signals {
                Some(watch) => watch.stop_self(),
                None => Ok(()),
            }
        }

        fn output(&mut self) -> &mut dyn Write {
            &mut self.stdout
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::io::{self, Read, Write};

    use crossterm::terminal;

    use super::*;

    pub struct StdTerminal {
        stdin: io::Stdin,
        stdout: io::Stdout,
        configured: bool,
        signals: Option<SignalWatch>,
    }

    impl StdTerminal {
        pub fn new() -> Self {
            Self {
                stdin: io::stdin(),
                stdout: io::stdout(),
                configured: false,
                signals: None,
            }
        }
    }

    impl Default for StdTerminal {
        fn default() -> Self { Self::new() }
    }

    #[cfg(windows)]
    fn enable_vt() -> io::Result<()> {
        use windows_sys::Win32::System::Console::{
            GetConsoleMode, GetStdHandle, SetConsoleMode, CONSOLE_MODE,
            ENABLE_VIRTUAL_TERMINAL_PROCESSING, STD_OUTPUT_HANDLE,
        };

        unsafe {
            let handle = GetStdHandle(STD_OUTPUT_HANDLE);
            let mut mode: CONSOLE_MODE = 0;
            if GetConsoleMode(handle, &mut mode) == 0 {
                return Err(io::Error::last_os_error());
            }
            if SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING) == 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn enable_vt() -> io::Result<()> {
        Ok(())
    }

    impl Terminal for StdTerminal {
        fn is_tty(&self) -> bool {
            self.stdin.is_tty() && self.stdout.is_tty()
        }

        fn configure(&mut self, options: &Options) -> io::Result<()> {
            if options.enable_vt {
                enable_vt()?;
            }
            if options.install_signal_handlers && self.signals.is_none() {
                self.signals = Some(SignalWatch::install()?);
            }
            self.configured = true;
            debug!(enable_vt = options.enable_vt, "terminal configured");
            Ok(())
        }

        fn enter_raw(&mut self) -> io::Result<()> {
            if self.configured {
                terminal::enable_raw_mode()?;
                trace!("raw mode on");
            }
            Ok(())
        }

        fn restore(&mut self) -> io::Result<()> {
            if self.configured {
                terminal::disable_raw_mode()?;
                trace!("raw mode off");
            }
            Ok(())
        }

        fn read_event(&mut self) -> io::Result<TermEvent> {
            let mut byte = [0u8; 1];
            match self.stdin.read(&mut byte)? {
                0 => Ok(TermEvent::Eof),
                _ => Ok(TermEvent::Byte(byte[0])),
            }
        }

        fn pending_signal(&mut self) -> Option<SignalKind> {
            self.signals.as_ref().and_then(SignalWatch::take)
        }

        fn suspend(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn output(&mut self) -> &mut dyn Write {
            &mut self.stdout
        }
    }
}

pub use imp::StdTerminal;

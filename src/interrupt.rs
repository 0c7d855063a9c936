//! Signal cooperation for the line reader.
//!
//! Handlers never touch the terminal. They only raise a flag and write one
//! byte to a wake pipe so a blocked read returns; the read loop then restores
//! or reapplies terminal attributes itself.

/// Signals the read loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Suspend,
    Continue,
}

#[cfg(unix)]
mod imp {
    use std::io::{self, Read};
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use signal_hook::consts::{SIGCONT, SIGINT, SIGTSTP};
    use signal_hook::{flag, low_level, SigId};
    use tracing::{debug, warn};

    use super::SignalKind;

    pub struct SignalWatch {
        interrupt: Arc<AtomicBool>,
        suspend: Arc<AtomicBool>,
        resume: Arc<AtomicBool>,
        // true while no read is active: SIGTSTP then stops immediately
        idle: Arc<AtomicBool>,
        wake_rx: UnixStream,
        ids: Vec<SigId>,
    }

    impl SignalWatch {
        pub fn install() -> io::Result<Self> {
            let (wake_rx, wake_tx) = UnixStream::pair()?;
            wake_rx.set_nonblocking(true)?;
            wake_tx.set_nonblocking(true)?;

            let interrupt = Arc::new(AtomicBool::new(false));
            let suspend = Arc::new(AtomicBool::new(false));
            let resume = Arc::new(AtomicBool::new(false));
            let idle = Arc::new(AtomicBool::new(true));

            let mut ids = Vec::with_capacity(7);
            // Unregister whatever got registered if a later step fails.
            let mut register = || -> io::Result<()> {
                ids.push(flag::register_conditional_default(SIGTSTP, Arc::clone(&idle))?);
                ids.push(flag::register(SIGTSTP, Arc::clone(&suspend))?);
                ids.push(flag::register(SIGINT, Arc::clone(&interrupt))?);
                ids.push(flag::register(SIGCONT, Arc::clone(&resume))?);
                for sig in [SIGTSTP, SIGINT, SIGCONT] {
                    ids.push(low_level::pipe::register(sig, wake_tx.try_clone()?)?);
                }
                Ok(())
            };
            if let Err(e) = register() {
                warn!(error = %e, "signal registration failed");
                for id in ids {
                    low_level::unregister(id);
                }
                return Err(e);
            }
            debug!("signal handlers installed");

            Ok(Self {
                interrupt,
                suspend,
                resume,
                idle,
                wake_rx,
                ids,
            })
        }

        /// Called when a read starts; SIGTSTP is then left to the read loop.
        pub fn arm_suspend(&self) {
            self.suspend.store(false, Ordering::SeqCst);
            self.idle.store(false, Ordering::SeqCst);
        }

        pub fn disarm_suspend(&self) {
            self.idle.store(true, Ordering::SeqCst);
            self.suspend.store(false, Ordering::SeqCst);
        }

        /// Next pending signal, suspend first.
        ///
        /// A SIGTSTP that arrived while idle has already stopped the process
        /// through the default action and is dropped here.
        pub fn take(&self) -> Option<SignalKind> {
            let suspended = self.suspend.swap(false, Ordering::SeqCst);
            if suspended && !self.idle.load(Ordering::SeqCst) {
                Some(SignalKind::Suspend)
            } else if self.resume.swap(false, Ordering::SeqCst) {
                Some(SignalKind::Continue)
            } else if self.interrupt.swap(false, Ordering::SeqCst) {
                Some(SignalKind::Interrupt)
            } else {
                None
            }
        }

        /// Readable end of the wake pipe, for polling alongside stdin.
        pub fn wake(&self) -> &UnixStream {
            &self.wake_rx
        }

        /// Empties the wake pipe.
        pub fn drain(&self) {
            let mut buf = [0u8; 64];
            while let Ok(n) = (&self.wake_rx).read(&mut buf) {
                if n == 0 {
                    break;
                }
            }
        }

        /// Stops the process the way an unhandled SIGTSTP would.
        pub fn stop_self(&self) -> io::Result<()> {
            low_level::emulate_default_handler(SIGTSTP)
        }
    }

    impl Drop for SignalWatch {
        fn drop(&mut self) {
            for id in self.ids.drain(..) {
                low_level::unregister(id);
            }
        }
    }

    impl std::fmt::Debug for SignalWatch {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SignalWatch")
                .field("idle", &self.idle.load(Ordering::Relaxed))
                .field("handlers", &self.ids.len())
                .finish()
        }
    }

}

#[cfg(not(unix))]
mod imp {
    use std::io;

    use super::SignalKind;

    #[derive(Debug)]
    pub struct SignalWatch;

    impl SignalWatch {
        pub fn install() -> io::Result<Self> {
            Ok(SignalWatch)
        }
        pub fn arm_suspend(&self) {}
        pub fn disarm_suspend(&self) {}
        pub fn take(&self) -> Option<SignalKind> {
            None
        }
        pub fn drain(&self) {}
        pub fn stop_self(&self) -> io::Result<()> {
            Ok(())
        }
    }
}

pub use imp::SignalWatch;

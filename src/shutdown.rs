//! Cooperative, process-wide cancellation.
//!
//! The coordinator is a two-state machine (`Running → Quitting`) backed by a
//! shared atomic flag. The job loop polls it between jobs and the frame
//! listener polls it between reads, so shutdown lands within one read
//! timeout.
//!
//! OS signals never touch the flag directly. `signal-hook`'s iterator keeps
//! the real handler down to a self-pipe write; a dedicated thread receives
//! the signal number and performs the transition through
//! [`ShutdownCoordinator::request_quit`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

/// Shared cancellation flag. Cheap to clone; all clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    quitting: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to the quitting state. Idempotent.
    ///
    /// Only enqueues a log line and flips the flag, so it is safe to call
    /// from the signal thread or from inside a read loop.
    pub fn request_quit(&self, reason: &str) {
        if self.quitting.swap(true, Ordering::SeqCst) {
            log::debug!("Shutdown already requested ({})", reason);
        } else {
            log::info!("Shutdown requested: {}", reason);
        }
    }

    /// Returns true once a quit was requested. Never blocks.
    pub fn should_quit(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }

    /// Starts translating SIGINT, SIGTERM and SIGHUP into quit requests.
    ///
    /// The returned listener stops the translation thread when closed or
    /// dropped.
    pub fn install_signal_handlers(&self) -> Result<SignalListener> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM, SIGHUP]).context("Failed to register signal handlers")?;
        let handle = signals.handle();
        let coordinator = self.clone();

        let thread = std::thread::Builder::new()
            .name("signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    let name = signal_hook::low_level::signal_name(signal).unwrap_or("signal");
                    coordinator.request_quit(&format!("received {}", name));
                }
            })
            .context("Failed to spawn signal thread")?;

        Ok(SignalListener {
            handle,
            thread: Some(thread),
        })
    }
}

/// Running signal translation thread.
#[derive(Debug)]
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Stops listening for signals and joins the translation thread.
    pub fn close(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Signal thread panicked");
            }
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.stop();
    }
}

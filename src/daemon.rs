//! The outer job loop.
//!
//! One cooperative loop alternates strictly between listening for a frame
//! and running the job it describes: listen → parse → plan → execute. No
//! frame is accepted while a job runs, and jobs run in arrival order.
//!
//! Failure policy:
//! - a failed job is logged and the loop goes back to listening;
//! - a stream error ends the loop;
//! - a malformed frame is logged with its raw text and ends the loop
//!   unless `abort_on_malformed_frame` is off, in which case it is skipped.

use anyhow::{Context, Result};

use crate::backend::Backend;
use crate::executor::{CaptureId, PipelineExecutor};
use crate::listener::{ByteSource, Frame, FrameListener};
use crate::plan::plan;
use crate::settings::Settings;
use crate::shutdown::ShutdownCoordinator;

/// Counters kept across the lifetime of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonStats {
    /// Frames received.
    pub frames: usize,
    /// Jobs that ran to completion.
    pub completed: usize,
    /// Jobs abandoned after a backend failure.
    pub failed: usize,
    /// Frames that could not be parsed.
    pub malformed: usize,
}

/// Owns the listener and the executor and drives them in turn.
#[derive(Debug)]
pub struct Daemon<S, B> {
    listener: FrameListener<S>,
    executor: PipelineExecutor<B>,
    shutdown: ShutdownCoordinator,
    abort_on_malformed_frame: bool,
    stats: DaemonStats,
}

impl<S: ByteSource, B: Backend> Daemon<S, B> {
    /// Assembles a daemon from its parts.
    pub fn new(
        listener: FrameListener<S>,
        executor: PipelineExecutor<B>,
        shutdown: ShutdownCoordinator,
        abort_on_malformed_frame: bool,
    ) -> Self {
        Self {
            listener,
            executor,
            shutdown,
            abort_on_malformed_frame,
            stats: DaemonStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> DaemonStats {
        self.stats
    }

    /// The executor, for inspection.
    pub fn executor(&self) -> &PipelineExecutor<B> {
        &self.executor
    }

    /// Runs until shutdown is requested or a fatal error occurs.
    pub fn run(&mut self) -> Result<DaemonStats> {
        log::info!("Listening for button presses");

        while !self.shutdown.should_quit() {
            let Some(frame) = self
                .listener
                .next_frame()
                .context("Listener stopped")?
            else {
                break;
            };
            self.handle_frame(&frame)?;
        }

        log::info!(
            "Stopped after {} frame(s): {} completed, {} failed, {} malformed",
            self.stats.frames,
            self.stats.completed,
            self.stats.failed,
            self.stats.malformed
        );
        Ok(self.stats)
    }

    /// Parses, plans and executes one frame.
    ///
    /// Only a malformed frame (with aborting enabled) is an error here; job
    /// failures are logged and swallowed.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<()> {
        self.stats.frames += 1;
        let text = frame.text();
        log::info!("Received frame: {:?}", text);

        let settings = match Settings::parse(&text) {
            Ok(settings) => settings,
            Err(e) => {
                self.stats.malformed += 1;
                log::error!("Malformed frame {:?}: {}", text, e);
                if self.abort_on_malformed_frame {
                    return Err(anyhow::Error::new(e)
                        .context(format!("Malformed frame {:?}", text)));
                }
                return Ok(());
            }
        };
        log::info!("Settings: {}", settings);

        let plan = plan(&settings);
        for (i, stage) in plan.stages().iter().enumerate() {
            log::info!("Stage {}: {}", i + 1, stage);
        }

        let capture = CaptureId::now();
        match self.executor.execute(plan, &capture) {
            Ok(outcome) => {
                self.stats.completed += 1;
                log::info!(
                    "Job {} done: {} page(s), {} output file(s)",
                    capture,
                    outcome.pages,
                    outcome.outputs.len()
                );
                for path in &outcome.outputs {
                    log::info!("Wrote {}", path.display());
                }
            }
            Err(e) => {
                self.stats.failed += 1;
                log::error!("Job {} abandoned at {} stage: {}", capture, e.stage(), e);
            }
        }

        Ok(())
    }
}

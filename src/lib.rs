//! Scanbutton - turns scanner button presses into scan jobs.
//!
//! A button controller on a serial link sends one small literal record per
//! press. This crate listens for those records, decodes them into typed
//! settings, compiles the settings into an ordered plan of processing
//! stages and runs the plan against an image backend.
//!
//! # Architecture
//!
//! - **FrameListener** ([`listener`]) - bytes → frames, timeout-bounded
//! - **Settings** ([`settings`]) - frame text → typed job description
//! - **Planner** ([`plan`]) - settings → plan, pure
//! - **Executor** ([`executor`]) - plan → backend calls, one job at a time
//! - **Daemon** ([`daemon`]) - the loop tying them together
//! - **Shutdown** ([`shutdown`]) - cooperative cancellation fed by signals
//! - **LogSink** ([`log_sink`]) - queue-backed log writer

pub mod backend;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod desktop;
pub mod error;
pub mod executor;
pub mod listener;
pub mod log_sink;
pub mod plan;
pub mod settings;
pub mod shutdown;

pub use config::{Config, RunOptions};
pub use daemon::{Daemon, DaemonStats};
pub use error::{BackendError, ExecutionError, ListenerError, ParseError};
pub use executor::{CaptureId, JobOutcome, PipelineExecutor};
pub use listener::{ByteSource, Frame, FrameListener};
pub use plan::{plan, Plan, Stage, StageKind};
pub use settings::Settings;
pub use shutdown::ShutdownCoordinator;

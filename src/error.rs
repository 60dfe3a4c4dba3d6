//! Error taxonomy for the listen → parse → plan → execute pipeline.
//!
//! Each stage of a job fails with its own type so callers (and tests) can
//! tell a malformed frame apart from a dead serial link or a failed scan.
//! Planning has no error type: every well-formed `Settings` value plans.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A frame could not be decoded into `Settings`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The frame held nothing but whitespace.
    #[error("empty frame")]
    Empty,
    /// The record is not wrapped in exactly one `(` ... `)` pair.
    #[error("frame is not delimited by a matching pair of parentheses")]
    Unbalanced,
    /// An entry has no `=>` separator.
    #[error("entry {entry:?} has no key/value separator")]
    MissingSeparator {
        /// The offending entry text.
        entry: String,
    },
    /// An entry split into something other than one key and one value.
    #[error("entry {entry:?} split into {parts} parts, expected 2")]
    PairCount {
        /// The offending entry text.
        entry: String,
        /// Number of parts the entry split into.
        parts: usize,
    },
    /// Key or value is blank.
    #[error("entry {entry:?} is missing its key or value")]
    BlankField {
        /// The offending entry text.
        entry: String,
    },
}

/// The byte stream feeding the listener failed.
///
/// Fatal to the listening loop; never retried.
#[derive(Error, Debug)]
pub enum ListenerError {
    /// The serial device could not be opened or configured.
    #[error("failed to open serial device {device}: {source}")]
    Open {
        /// Device path.
        device: PathBuf,
        /// Underlying serial error.
        #[source]
        source: serialport::Error,
    },
    /// A read on the stream failed with something other than a timeout.
    #[error("stream read failed: {0}")]
    Read(#[from] io::Error),
}

/// A single backend operation failed.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The external tool could not be started.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        /// Program name.
        tool: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// The external tool ran and exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        /// Program name.
        tool: String,
        /// Exit status description.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },
    /// A filesystem operation around the tool failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl BackendError {
    /// Wraps an I/O error with a short description of the attempted action.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// A job was abandoned part way through.
///
/// Logged by the job loop; never fatal to the process.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The private staging directory could not be created.
    #[error("failed to prepare job workspace: {0}")]
    Workspace(#[source] io::Error),
    /// The acquisition stage failed.
    #[error("acquisition failed: {0}")]
    Acquire(#[source] BackendError),
    /// Adjusting one captured page failed.
    #[error("adjusting page {page} of {total} failed: {source}")]
    Adjust {
        /// 1-based page number.
        page: usize,
        /// Pages captured in the job.
        total: usize,
        /// Underlying backend error.
        #[source]
        source: BackendError,
    },
    /// Moving an adjusted page into the output directory failed.
    #[error("routing page {page} to the output directory failed: {source}")]
    Route {
        /// 1-based page number.
        page: usize,
        /// Underlying backend error.
        #[source]
        source: BackendError,
    },
    /// Combining staged pages into one document failed.
    #[error("aggregation failed: {0}")]
    Aggregate(#[source] BackendError),
}

impl ExecutionError {
    /// Short name of the stage that failed, for log lines and assertions.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "workspace",
            Self::Acquire(_) => "acquire",
            Self::Adjust { .. } | Self::Route { .. } => "per-image-adjust",
            Self::Aggregate(_) => "aggregate",
        }
    }
}

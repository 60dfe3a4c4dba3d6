//! Runs a [`Plan`] against a [`Backend`], one job at a time.
//!
//! Stages run strictly in plan order. Acquisition fills a working set of
//! raw pages; the adjustment stage is applied to each page with the same
//! parameters; aggregation, when planned, combines the staged pages. The
//! first failure anywhere abandons the rest of the job. Nothing is
//! retried, and the private staging directory is removed either way.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::backend::{AdjustedImage, Backend, RawImage};
use crate::config::RunOptions;
use crate::constants::{CAPTURE_ID_FORMAT, DOCUMENT_EXTENSION, PAGE_EXTENSION};
use crate::desktop::DesktopFocus;
use crate::error::ExecutionError;
use crate::plan::{OutputRoute, Plan, Stage};

/// Timestamp naming everything one job produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureId(String);

impl CaptureId {
    /// Capture id for the current local time.
    pub fn now() -> Self {
        Self(chrono::Local::now().format(CAPTURE_ID_FORMAT).to_string())
    }

    /// The id as a file-name-safe string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CaptureId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a completed job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Pages captured by the device.
    pub pages: usize,
    /// Files written to the output directory.
    pub outputs: Vec<PathBuf>,
}

/// Executes plans against a backend and surfaces the results.
pub struct PipelineExecutor<B> {
    backend: B,
    focus: Box<dyn DesktopFocus>,
    output_dir: PathBuf,
    staging_root: PathBuf,
    options: RunOptions,
}

impl<B: fmt::Debug> fmt::Debug for PipelineExecutor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("backend", &self.backend)
            .field("output_dir", &self.output_dir)
            .field("staging_root", &self.staging_root)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> PipelineExecutor<B> {
    /// Creates an executor writing to `output_dir` and staging under
    /// `staging_root`.
    pub fn new(
        backend: B,
        focus: Box<dyn DesktopFocus>,
        output_dir: PathBuf,
        staging_root: PathBuf,
    ) -> Self {
        Self {
            backend,
            focus,
            output_dir,
            staging_root,
            options: RunOptions::default(),
        }
    }

    /// Applies per-run switches. In dry-run mode no directory is created.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Runs one job to completion or to its first failure.
    pub fn execute(
        &mut self,
        plan: Plan,
        capture: &CaptureId,
    ) -> Result<JobOutcome, ExecutionError> {
        let workspace = if self.options.dry_run {
            None
        } else {
            Some(self.create_workspace(capture)?)
        };
        let workdir = match &workspace {
            Some(dir) => dir.path().to_path_buf(),
            None => self.staging_root.join(format!("scanbutton-{}", capture)),
        };

        let mut raw: Vec<RawImage> = Vec::new();
        let mut staged: Vec<AdjustedImage> = Vec::new();
        let mut outputs = Vec::new();

        for stage in plan {
            match stage {
                Stage::Acquire(params) => {
                    raw = self
                        .backend
                        .acquire(&params, &workdir)
                        .map_err(ExecutionError::Acquire)?;
                }
                Stage::PerImageAdjust(params) => {
                    let total = raw.len();
                    for (i, image) in raw.iter().enumerate() {
                        let page = i + 1;
                        let dest = workdir.join(format!("page-{:03}.{}", page, PAGE_EXTENSION));
                        let adjusted = self
                            .backend
                            .adjust(image, &params, &dest)
                            .map_err(|source| ExecutionError::Adjust {
                                page,
                                total,
                                source,
                            })?;

                        match params.route {
                            OutputRoute::Staging => staged.push(adjusted),
                            OutputRoute::OutputDirectory => {
                                let target = unused_path(
                                    &self.output_dir,
                                    &format!("{}_{:02}", capture, page),
                                    PAGE_EXTENSION,
                                );
                                self.backend
                                    .route_output(&adjusted, &target)
                                    .map_err(|source| ExecutionError::Route { page, source })?;
                                outputs.push(target);
                            }
                        }
                    }
                }
                Stage::Aggregate(params) => {
                    if staged.is_empty() {
                        log::info!("No pages staged, skipping aggregation");
                        continue;
                    }
                    let dir = match params.route {
                        OutputRoute::OutputDirectory => self.output_dir.as_path(),
                        OutputRoute::Staging => workdir.as_path(),
                    };
                    let target = unused_path(dir, capture.as_str(), DOCUMENT_EXTENSION);
                    self.backend
                        .aggregate(&staged, &target)
                        .map_err(ExecutionError::Aggregate)?;
                    outputs.push(target);
                }
            }
        }

        if let Some(workspace) = workspace {
            if let Err(e) = workspace.close() {
                log::warn!("Failed to remove staging directory: {}", e);
            }
        }

        if let Err(e) = self.focus.surface(&self.output_dir) {
            log::warn!("Could not surface {}: {}", self.output_dir.display(), e);
        }

        Ok(JobOutcome {
            pages: raw.len(),
            outputs,
        })
    }

    fn create_workspace(&self, capture: &CaptureId) -> Result<TempDir, ExecutionError> {
        fs::create_dir_all(&self.output_dir).map_err(ExecutionError::Workspace)?;
        fs::create_dir_all(&self.staging_root).map_err(ExecutionError::Workspace)?;
        tempfile::Builder::new()
            .prefix(&format!("scanbutton-{}-", capture))
            .tempdir_in(&self.staging_root)
            .map_err(ExecutionError::Workspace)
    }
}

/// `<dir>/<stem>.<ext>`, or `<stem>-2.<ext>`, `<stem>-3.<ext>`... when
/// taken. Capture ids only have one-second resolution.
fn unused_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let mut path = dir.join(format!("{}.{}", stem, ext));
    let mut n = 2;
    while path.exists() {
        path = dir.join(format!("{}-{}.{}", stem, n, ext));
        n += 1;
    }
    path
}

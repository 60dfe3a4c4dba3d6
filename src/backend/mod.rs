//! Image acquisition and processing backend.
//!
//! The executor only sees the [`Backend`] trait. Handles are plain paths;
//! what lives behind them is up to the implementation.
//! [`CommandBackend`] drives `scanimage` and ImageMagick.

pub mod command;

use std::path::{Path, PathBuf};

use crate::error::BackendError;
use crate::plan::{AcquireParams, AdjustParams};

pub use command::{CommandBackend, ToolConfig};

/// One page as captured by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    /// Location of the captured page.
    pub path: PathBuf,
}

/// One page after adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustedImage {
    /// Location of the adjusted page.
    pub path: PathBuf,
}

/// Operations the pipeline executor drives.
pub trait Backend {
    /// Feeds pages through the device, writing captures under `workdir`.
    ///
    /// Returns one handle per page, in feed order. An empty feeder yields
    /// an empty list.
    fn acquire(
        &mut self,
        params: &AcquireParams,
        workdir: &Path,
    ) -> Result<Vec<RawImage>, BackendError>;

    /// Adjusts one page, writing the result to `dest`.
    fn adjust(
        &mut self,
        raw: &RawImage,
        params: &AdjustParams,
        dest: &Path,
    ) -> Result<AdjustedImage, BackendError>;

    /// Combines adjusted pages, in order, into one document at `dest`.
    fn aggregate(&mut self, pages: &[AdjustedImage], dest: &Path) -> Result<(), BackendError>;

    /// Moves an adjusted page to its final location.
    fn route_output(&mut self, page: &AdjustedImage, dest: &Path) -> Result<(), BackendError>;
}

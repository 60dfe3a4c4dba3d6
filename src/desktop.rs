//! Bringing finished scans in front of the user.
//!
//! After a job completes, the output directory is surfaced: if a window
//! showing it already exists it gets focus, otherwise the desktop switches
//! to the configured workspace and a file browser is opened there.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::BackendError;

/// Collaborator invoked once per successfully completed job.
pub trait DesktopFocus {
    /// Surfaces `output_dir` to the user.
    fn surface(&mut self, output_dir: &Path) -> Result<(), BackendError>;
}

/// Does nothing. Used headless and when focus handling is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFocus;

impl DesktopFocus for NoFocus {
    fn surface(&mut self, _output_dir: &Path) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Focus handling through `wmctrl` and a file browser.
#[derive(Debug, Clone)]
pub struct WmctrlFocus {
    file_browser: String,
    workspace: u32,
    dry_run: bool,
}

impl WmctrlFocus {
    /// Creates the adapter. With `dry_run` set nothing is executed.
    pub fn new(file_browser: String, workspace: u32, dry_run: bool) -> Self {
        Self {
            file_browser,
            workspace,
            dry_run,
        }
    }

    fn wmctrl(args: &[&str]) -> Result<String, BackendError> {
        let output = Command::new("wmctrl")
            .args(args)
            .output()
            .map_err(|source| BackendError::Spawn {
                tool: "wmctrl".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(BackendError::Failed {
                tool: "wmctrl".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DesktopFocus for WmctrlFocus {
    fn surface(&mut self, output_dir: &Path) -> Result<(), BackendError> {
        let name = output_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| output_dir.display().to_string());

        if self.dry_run {
            log::info!("[dry-run] surface {}", output_dir.display());
            return Ok(());
        }

        let windows = Self::wmctrl(&["-l"])?;
        if has_window(&windows, &name) {
            log::debug!("Focusing existing window for {}", name);
            Self::wmctrl(&["-a", &name])?;
            return Ok(());
        }

        Self::wmctrl(&["-s", &self.workspace.to_string()])?;
        Command::new(&self.file_browser)
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                tool: self.file_browser.clone(),
                source,
            })?;
        log::debug!(
            "Opened {} on workspace {}",
            output_dir.display(),
            self.workspace
        );
        Ok(())
    }
}

/// True when a `wmctrl -l` listing has a window titled after `name`.
///
/// Listing lines are `<id> <desktop> <host> <title...>`.
fn has_window(listing: &str, name: &str) -> bool {
    listing.lines().any(|line| {
        let mut fields = line.split_whitespace();
        fields.nth(2).is_some() && fields.collect::<Vec<_>>().join(" ").contains(name)
    })
}

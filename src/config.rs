//! Configuration loading and persistence.
//!
//! Settings are read from `config.json` in the configuration directory,
//! then overridden by `SCANBUTTON_*` environment variables, then by
//! command-line flags. Run-time switches that are not persisted travel
//! separately in [`RunOptions`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::backend::ToolConfig;
use crate::constants::{DEFAULT_DEVICE, DEFAULT_READ_TIMEOUT, MIN_READ_TIMEOUT};

/// Configuration for the scanbutton daemon.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Serial device the button controller is attached to.
    pub device: PathBuf,
    /// Bound on a single serial read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Where finished pages and documents are written.
    pub output_dir: PathBuf,
    /// Parent of the per-job private staging directories.
    pub staging_dir: PathBuf,
    /// Log file; `None` means `<config_dir>/scanbutton.log`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// External tools used by the backend.
    pub tools: ToolConfig,
    /// Surface the output directory after each job.
    pub desktop_focus: bool,
    /// Program used to open the output directory.
    pub file_browser: String,
    /// Workspace to switch to before opening the file browser.
    pub workspace: u32,
    /// Stop listening when a frame cannot be parsed.
    pub abort_on_malformed_frame: bool,
}

impl Default for Config {
    fn default() -> Self {
        let output_dir = dirs::home_dir()
            .map(|h| h.join("scans"))
            .unwrap_or_else(|| PathBuf::from("scans"));

        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            output_dir,
            staging_dir: std::env::temp_dir(),
            log_file: None,
            tools: ToolConfig::default(),
            desktop_focus: true,
            file_browser: "xdg-open".to_string(),
            workspace: 0,
            abort_on_malformed_frame: true,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `SCANBUTTON_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("SCANBUTTON_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("scanbutton")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from `dir` (or the default directory), with
    /// environment overrides applied.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::config_dir()?,
        };
        let mut config = Self::load_from_file(&dir.join("config.json"))?;
        config.apply_env_overrides();
        config.validate()?;
        if config.log_file.is_none() {
            config.log_file = Some(dir.join("scanbutton.log"));
        }
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(device) = std::env::var("SCANBUTTON_DEVICE") {
            self.device = PathBuf::from(device);
        }

        if let Ok(output_dir) = std::env::var("SCANBUTTON_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(output_dir);
        }

        if let Ok(staging_dir) = std::env::var("SCANBUTTON_STAGING_DIR") {
            self.staging_dir = PathBuf::from(staging_dir);
        }

        if let Ok(log_file) = std::env::var("SCANBUTTON_LOG_FILE") {
            self.log_file = Some(PathBuf::from(log_file));
        }

        if let Ok(scanner) = std::env::var("SCANBUTTON_SCANNER") {
            self.tools.scanner = Some(scanner);
        }

        if let Ok(timeout) = std::env::var("SCANBUTTON_READ_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.read_timeout_ms = ms,
                Err(_) => log::warn!("Ignoring invalid SCANBUTTON_READ_TIMEOUT_MS={}", timeout),
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.read_timeout() < MIN_READ_TIMEOUT {
            anyhow::bail!(
                "read_timeout_ms is {}, must be at least {}",
                self.read_timeout_ms,
                MIN_READ_TIMEOUT.as_millis()
            );
        }
        Ok(())
    }

    /// Persists the configuration as pretty JSON in `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join("config.json");
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Per-run switches threaded explicitly into the executor and its adapters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Log backend and desktop commands instead of running them, and
    /// leave the filesystem untouched.
    pub dry_run: bool,
}

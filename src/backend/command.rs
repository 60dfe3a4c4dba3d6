//! Backend that shells out to `scanimage` and ImageMagick `convert`.
//!
//! Typed stage parameters are translated into argument vectors and passed
//! to `std::process::Command` directly, never through a shell. In dry-run
//! mode each command line is logged instead of run and acquisition
//! captures nothing.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::{AdjustedImage, Backend, RawImage};
use crate::constants::{CROP_FUZZ, DESKEW_THRESHOLD, SCANIMAGE_FEEDER_EMPTY};
use crate::error::BackendError;
use crate::plan::{AcquireParams, AdjustParams, ProfileId};

/// Prefix of raw capture files inside the job workspace.
const RAW_PREFIX: &str = "raw-";
const RAW_EXTENSION: &str = "pnm";

/// External programs and files the command backend depends on.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ToolConfig {
    /// Acquisition program.
    pub scan_tool: String,
    /// Image conversion program.
    pub convert_tool: String,
    /// SANE device name; `None` lets the scan tool pick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scanner: Option<String>,
    /// ICC profile of the scanner.
    pub source_profile: PathBuf,
    /// ICC profile output is converted into.
    pub target_profile: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            scan_tool: "scanimage".to_string(),
            convert_tool: "convert".to_string(),
            scanner: None,
            source_profile: PathBuf::from("/usr/share/color/icc/scanner.icc"),
            target_profile: PathBuf::from("/usr/share/color/icc/sRGB.icc"),
        }
    }
}

impl ToolConfig {
    fn profile_path(&self, id: ProfileId) -> &Path {
        match id {
            ProfileId::SourceDevice => &self.source_profile,
            ProfileId::TargetReference => &self.target_profile,
        }
    }
}

/// [`Backend`] backed by external command-line tools.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    tools: ToolConfig,
    dry_run: bool,
}

impl CommandBackend {
    /// Creates a backend. With `dry_run` set nothing is executed.
    pub fn new(tools: ToolConfig, dry_run: bool) -> Self {
        Self { tools, dry_run }
    }

    /// Arguments for the acquisition tool.
    pub fn acquire_args(&self, params: &AcquireParams, workdir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(scanner) = &self.tools.scanner {
            args.push("-d".into());
            args.push(scanner.into());
        }
        args.push("--source".into());
        args.push(params.source.into());
        args.push("--mode".into());
        args.push(params.color_mode.into());
        args.push("--resolution".into());
        args.push(params.resolution.to_string().into());

        if let Some(g) = params.geometry {
            for (flag, value) in [
                ("--page-width", g.page_width),
                ("--page-height", g.page_height),
                ("-x", g.scan_width),
                ("-y", g.scan_height),
            ] {
                args.push(flag.into());
                args.push(value.to_string().into());
            }
        }

        args.push("--format=pnm".into());
        let mut batch = OsString::from("--batch=");
        batch.push(workdir.join(format!("{}%03d.{}", RAW_PREFIX, RAW_EXTENSION)));
        args.push(batch);
        args
    }

    /// Arguments for adjusting one page.
    pub fn adjust_args(&self, raw: &RawImage, params: &AdjustParams, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![raw.path.clone().into()];
        if params.crop {
            args.extend(
                ["-fuzz", CROP_FUZZ, "-trim", "+repage"]
                    .iter()
                    .map(OsString::from),
            );
        }
        if params.deskew {
            args.extend(["-deskew", DESKEW_THRESHOLD].iter().map(OsString::from));
        }
        for id in params.profiles {
            args.push("-profile".into());
            args.push(self.tools.profile_path(id).into());
        }
        if params.normalize {
            args.push("-normalize".into());
        }
        args.push(dest.into());
        args
    }

    /// Arguments for combining pages into one document.
    pub fn aggregate_args(&self, pages: &[AdjustedImage], dest: &Path) -> Vec<OsString> {
        pages
            .iter()
            .map(|p| p.path.clone().into_os_string())
            .chain(std::iter::once(dest.as_os_str().to_owned()))
            .collect()
    }

    /// Runs `tool`, treating the listed exit codes as success.
    ///
    /// Returns `false` when nothing ran because of dry-run.
    fn run(&self, tool: &str, args: &[OsString], ok_codes: &[i32]) -> Result<bool, BackendError> {
        let line = command_line(tool, args);
        if self.dry_run {
            log::info!("[dry-run] {}", line);
            return Ok(false);
        }

        log::debug!("Running: {}", line);
        let output = Command::new(tool)
            .args(args)
            .output()
            .map_err(|source| BackendError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        let accepted = output.status.success()
            || output
                .status
                .code()
                .is_some_and(|code| ok_codes.contains(&code));
        if !accepted {
            return Err(BackendError::Failed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(true)
    }
}

impl Backend for CommandBackend {
    fn acquire(
        &mut self,
        params: &AcquireParams,
        workdir: &Path,
    ) -> Result<Vec<RawImage>, BackendError> {
        let args = self.acquire_args(params, workdir);
        if !self.run(&self.tools.scan_tool, &args, &[SCANIMAGE_FEEDER_EMPTY])? {
            return Ok(Vec::new());
        }
        list_captures(workdir)
    }

    fn adjust(
        &mut self,
        raw: &RawImage,
        params: &AdjustParams,
        dest: &Path,
    ) -> Result<AdjustedImage, BackendError> {
        let args = self.adjust_args(raw, params, dest);
        self.run(&self.tools.convert_tool, &args, &[])?;
        Ok(AdjustedImage {
            path: dest.to_path_buf(),
        })
    }

    fn aggregate(&mut self, pages: &[AdjustedImage], dest: &Path) -> Result<(), BackendError> {
        let args = self.aggregate_args(pages, dest);
        self.run(&self.tools.convert_tool, &args, &[])?;
        Ok(())
    }

    fn route_output(&mut self, page: &AdjustedImage, dest: &Path) -> Result<(), BackendError> {
        if self.dry_run {
            log::info!("[dry-run] move {} -> {}", page.path.display(), dest.display());
            return Ok(());
        }
        move_file(&page.path, dest)
    }
}

/// Captured pages in `workdir`, in feed order.
fn list_captures(workdir: &Path) -> Result<Vec<RawImage>, BackendError> {
    let entries = fs::read_dir(workdir)
        .map_err(|e| BackendError::io(format!("Failed to list {}", workdir.display()), e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| BackendError::io(format!("Failed to list {}", workdir.display()), e))?
            .path();
        let is_capture = path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.starts_with(RAW_PREFIX))
            && path.extension() == Some(OsStr::new(RAW_EXTENSION));
        if is_capture {
            paths.push(path);
        }
    }
    paths.sort();

    log::info!("Captured {} page(s)", paths.len());
    Ok(paths.into_iter().map(|path| RawImage { path }).collect())
}

/// Renames `from` to `to`, copying when they sit on different filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), BackendError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| {
        BackendError::io(
            format!("Failed to copy {} to {}", from.display(), to.display()),
            e,
        )
    })?;
    fs::remove_file(from)
        .map_err(|e| BackendError::io(format!("Failed to remove {}", from.display()), e))
}

fn command_line(tool: &str, args: &[OsString]) -> String {
    std::iter::once(tool.to_string())
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan, OutputRoute};
    use crate::settings::Settings;
    use tempfile::TempDir;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn adjust_params(crop: bool, deskew: bool, normalize: bool) -> AdjustParams {
        AdjustParams {
            crop,
            deskew,
            profiles: [ProfileId::SourceDevice, ProfileId::TargetReference],
            normalize,
            route: OutputRoute::Staging,
        }
    }

    #[test]
    fn test_acquire_args_with_geometry() {
        let backend = CommandBackend::new(
            ToolConfig {
                scanner: Some("fujitsu:fi-6130".to_string()),
                ..ToolConfig::default()
            },
            false,
        );
        let p = plan(&Settings::parse("('size' => 'a4', 'mode' => 'jpg')").unwrap());
        let args = strings(&backend.acquire_args(p.acquire().unwrap(), Path::new("/work")));

        assert_eq!(
            args,
            vec![
                "-d",
                "fujitsu:fi-6130",
                "--source",
                "ADF Duplex",
                "--mode",
                "Color",
                "--resolution",
                "300",
                "--page-width",
                "210",
                "--page-height",
                "297",
                "-x",
                "210",
                "-y",
                "297",
                "--format=pnm",
                "--batch=/work/raw-%03d.pnm",
            ]
        );
    }

    #[test]
    fn test_acquire_args_default_geometry() {
        let backend = CommandBackend::new(ToolConfig::default(), false);
        let p = plan(&Settings::default());
        let args = strings(&backend.acquire_args(p.acquire().unwrap(), Path::new("/work")));
        assert!(!args.iter().any(|a| a == "--page-width" || a == "-x"));
        assert!(args.contains(&"200".to_string()));
    }

    #[test]
    fn test_adjust_args_follow_flags() {
        let backend = CommandBackend::new(ToolConfig::default(), false);
        let raw = RawImage {
            path: PathBuf::from("/work/raw-001.pnm"),
        };

        let all = strings(&backend.adjust_args(
            &raw,
            &adjust_params(true, true, true),
            Path::new("/work/page-001.jpg"),
        ));
        assert_eq!(
            all,
            vec![
                "/work/raw-001.pnm",
                "-fuzz",
                "10%",
                "-trim",
                "+repage",
                "-deskew",
                "40%",
                "-profile",
                "/usr/share/color/icc/scanner.icc",
                "-profile",
                "/usr/share/color/icc/sRGB.icc",
                "-normalize",
                "/work/page-001.jpg",
            ]
        );

        let bare = strings(&backend.adjust_args(
            &raw,
            &adjust_params(false, false, false),
            Path::new("/work/page-001.jpg"),
        ));
        assert_eq!(bare.len(), 6);
        assert!(!bare.iter().any(|a| a == "-trim" || a == "-deskew" || a == "-normalize"));
    }

    #[test]
    fn test_aggregate_args_keep_page_order() {
        let backend = CommandBackend::new(ToolConfig::default(), false);
        let pages = vec![
            AdjustedImage {
                path: PathBuf::from("/s/page-001.jpg"),
            },
            AdjustedImage {
                path: PathBuf::from("/s/page-002.jpg"),
            },
        ];
        let args = strings(&backend.aggregate_args(&pages, Path::new("/out/doc.pdf")));
        assert_eq!(args, vec!["/s/page-001.jpg", "/s/page-002.jpg", "/out/doc.pdf"]);
    }

    #[test]
    fn test_dry_run_captures_nothing() {
        let dir = TempDir::new().unwrap();
        let mut backend = CommandBackend::new(
            ToolConfig {
                scan_tool: "/nonexistent/scanimage".to_string(),
                ..ToolConfig::default()
            },
            true,
        );
        let p = plan(&Settings::default());
        let pages = backend.acquire(p.acquire().unwrap(), dir.path()).unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn test_missing_tool_is_spawn_error() {
        let mut backend = CommandBackend::new(
            ToolConfig {
                convert_tool: "/nonexistent/convert".to_string(),
                ..ToolConfig::default()
            },
            false,
        );
        let raw = RawImage {
            path: PathBuf::from("raw.pnm"),
        };
        let err = backend
            .adjust(&raw, &adjust_params(false, false, false), Path::new("out.jpg"))
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_is_failed_error() {
        let mut backend = CommandBackend::new(
            ToolConfig {
                convert_tool: "false".to_string(),
                ..ToolConfig::default()
            },
            false,
        );
        let err = backend.aggregate(&[], Path::new("out.pdf")).unwrap_err();
        assert!(matches!(err, BackendError::Failed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_acquire_lists_captures_in_order() {
        let dir = TempDir::new().unwrap();
        for name in ["raw-002.pnm", "raw-001.pnm", "notes.txt", "raw-003.pnm"] {
            fs::write(dir.path().join(name), b"P6").unwrap();
        }
        let mut backend = CommandBackend::new(
            ToolConfig {
                scan_tool: "true".to_string(),
                ..ToolConfig::default()
            },
            false,
        );
        let p = plan(&Settings::default());
        let pages = backend.acquire(p.acquire().unwrap(), dir.path()).unwrap();
        let names: Vec<_> = pages
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["raw-001.pnm", "raw-002.pnm", "raw-003.pnm"]);
    }

    #[test]
    fn test_route_output_moves_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("page-001.jpg");
        let to = dir.path().join("out.jpg");
        fs::write(&from, b"jpeg").unwrap();

        let mut backend = CommandBackend::new(ToolConfig::default(), false);
        backend
            .route_output(&AdjustedImage { path: from.clone() }, &to)
            .unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"jpeg");
    }
}

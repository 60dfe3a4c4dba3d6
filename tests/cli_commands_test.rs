// Integration tests for CLI commands
// Run with: cargo test --test cli_commands_test

use std::process::{Command, Output};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn scanbutton(config_dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scanbutton"))
        .arg("--config-dir")
        .arg(config_dir.path())
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("SCANBUTTON_DEVICE")
        .env_remove("SCANBUTTON_LOG_FILE")
        .output()
        .expect("Failed to run scanbutton")
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = scanbutton(&dir, &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("plan"));
    assert!(stdout.contains("config"));
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    let output = scanbutton(&dir, &["--version"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("scanbutton"));
}

#[test]
fn test_plan_jpg_frame() {
    let dir = TempDir::new().unwrap();
    let output = scanbutton(
        &dir,
        &["plan", "('size' => 'a4', 'mode' => 'jpg', 'crop' => 1, 'deskew' => 0)"],
    );

    assert!(output.status.success(), "plan failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "settings: size=a4 mode=jpg crop=true deskew=false");
    assert!(lines[1].starts_with("1. Acquire{"));
    assert!(lines[1].contains("resolution=300"));
    assert!(lines[1].contains("page_width=210"));
    assert!(lines[2].starts_with("2. PerImageAdjust{"));
    assert!(lines[2].contains("crop=true"));
    assert!(lines[2].contains("normalize=false"));
    assert!(lines[2].contains("output=output-directory"));
    assert_eq!(lines.len(), 3, "no aggregate stage expected");
}

#[test]
fn test_plan_pdf_frame_has_aggregate() {
    let dir = TempDir::new().unwrap();
    let output = scanbutton(
        &dir,
        &["plan", "('size' => 'letter', 'mode' => 'pdf', 'crop' => 0, 'deskew' => 1)"],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("geometry=default"));
    assert!(stdout.contains("normalize=true"));
    assert!(stdout.contains("output=staging"));
    assert!(stdout.contains("3. Aggregate{output=output-directory}"));
}

#[test]
fn test_plan_malformed_frame_fails() {
    let dir = TempDir::new().unwrap();
    let output = scanbutton(&dir, &["plan", "('size' => )"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Malformed frame"), "stderr: {}", stderr);
}

#[test]
fn test_config_prints_json() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        r#"{"device": "/dev/ttyS7", "workspace": 2}"#,
    )
    .unwrap();

    let output = scanbutton(&dir, &["config"]);
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["device"], "/dev/ttyS7");
    assert_eq!(config["workspace"], 2);
    assert_eq!(config["read_timeout_ms"], 1000);
}

#[test]
fn test_run_with_missing_device_fails_fast() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("run.log");
    let start = Instant::now();

    let output = scanbutton(
        &dir,
        &[
            "--log-file",
            log.to_str().unwrap(),
            "run",
            "--dry-run",
            "--device",
            "/dev/scanbutton-missing",
        ],
    );

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!output.status.success());
    let logged = std::fs::read_to_string(&log).unwrap();
    assert!(logged.contains("dry run"), "log: {}", logged);
    assert!(logged.contains("/dev/scanbutton-missing"), "log: {}", logged);
}

#[test]
fn test_config_save_writes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    assert!(!path.exists());

    let output = scanbutton(&dir, &["config", "--save"]);
    assert!(output.status.success(), "config --save failed: {:?}", output);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let printed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(saved, printed);
    assert_eq!(saved["device"], "/dev/ttyUSB0");
}

#[test]
fn test_zero_read_timeout_is_refused() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.json"), r#"{"read_timeout_ms": 0}"#).unwrap();

    let output = scanbutton(&dir, &["config"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("read_timeout_ms"));
}

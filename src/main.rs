//! Scanbutton CLI - listens for scanner button presses and runs scan jobs.
//!
//! This is the main binary entry point. See the `scanbutton` library for
//! the core functionality.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scanbutton::backend::CommandBackend;
use scanbutton::constants::FRAME_TERMINATOR;
use scanbutton::desktop::{DesktopFocus, NoFocus, WmctrlFocus};
use scanbutton::listener::SerialSource;
use scanbutton::log_sink::{self, LogDestination};
use scanbutton::{
    plan, Config, Daemon, FrameListener, PipelineExecutor, RunOptions, Settings,
    ShutdownCoordinator,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Opens the serial link and runs the job loop until shutdown.
fn run_daemon(config: &Config, options: RunOptions) -> Result<()> {
    log::info!(
        "Scanbutton v{} starting on {}{}",
        VERSION,
        config.device.display(),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let shutdown = ShutdownCoordinator::new();
    let signals = shutdown.install_signal_handlers()?;

    let source = SerialSource::open(&config.device, config.read_timeout())?;
    let listener = FrameListener::new(
        source,
        FRAME_TERMINATOR,
        config.read_timeout(),
        shutdown.clone(),
    )?;

    let backend = CommandBackend::new(config.tools.clone(), options.dry_run);
    let focus: Box<dyn DesktopFocus> = if config.desktop_focus {
        Box::new(WmctrlFocus::new(
            config.file_browser.clone(),
            config.workspace,
            options.dry_run,
        ))
    } else {
        Box::new(NoFocus)
    };
    let executor = PipelineExecutor::new(
        backend,
        focus,
        config.output_dir.clone(),
        config.staging_dir.clone(),
    )
    .with_options(options);

    let mut daemon = Daemon::new(
        listener,
        executor,
        shutdown,
        config.abort_on_malformed_frame,
    );
    let result = daemon.run();
    signals.close();

    if let Err(e) = &result {
        log::error!("Stopping: {:#}", e);
    }
    result.map(|_| ())
}

/// Parses and plans one frame, printing the result.
fn print_plan(frame: &str) -> Result<()> {
    let settings = Settings::parse(frame).with_context(|| format!("Malformed frame {:?}", frame))?;
    println!("settings: {}", settings);
    for (i, stage) in plan(&settings).stages().iter().enumerate() {
        println!("{}. {}", i + 1, stage);
    }
    Ok(())
}

// CLI
#[derive(Parser)]
#[command(name = "scanbutton")]
#[command(version = VERSION)]
#[command(about = "Turns scanner button presses into scan jobs")]
struct Cli {
    /// Configuration directory (default: platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Append log output to this file
    #[arg(long, global = true, conflicts_with = "log_stderr")]
    log_file: Option<PathBuf>,

    /// Write log output to standard error
    #[arg(long, global = true)]
    log_stderr: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for button presses and run scan jobs
    Run {
        /// Serial device of the button controller
        #[arg(long)]
        device: Option<PathBuf>,
        /// Log backend commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Parse one frame and print the plan it compiles to
    Plan {
        /// Frame text, e.g. "('size' => 'a4', 'mode' => 'pdf')"
        frame: String,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to config.json in the configuration directory
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.config_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let mut config = Config::load(cli.config_dir.as_deref())?;

    let destination = if cli.log_stderr {
        LogDestination::Stderr
    } else if let Some(path) = cli.log_file.clone().or_else(|| config.log_file.clone()) {
        LogDestination::File(path)
    } else {
        LogDestination::Stderr
    };
    let _log_guard = log_sink::init(&destination, cli.verbose)?;

    // Route panics through the log before the default handler runs
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {}", panic_info);
        default_hook(panic_info);
    }));

    match cli.command {
        Commands::Run { device, dry_run } => {
            if let Some(device) = device {
                config.device = device;
            }
            run_daemon(&config, RunOptions { dry_run })?;
        }
        Commands::Plan { frame } => {
            print_plan(&frame)?;
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let dir = match &cli.config_dir {
                    Some(dir) => dir.clone(),
                    None => Config::config_dir()?,
                };
                config.save(&dir)?;
                log::info!("Saved configuration to {}", dir.join("config.json").display());
            }
        }
    }

    Ok(())
}

//! Queue-backed log output.
//!
//! `env_logger` formats records as usual, but its target is a [`LogSink`]:
//! a `Write` implementation that only pushes the formatted bytes onto an
//! unbounded channel. A dedicated `log-sink` thread pops them and does the
//! blocking write. Producers (the job loop, the signal thread, the read
//! loop) therefore never wait on the log file.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};

/// Where log lines end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    /// Append to a file, creating it if needed.
    File(PathBuf),
    /// Standard error.
    Stderr,
}

enum Message {
    Chunk(Vec<u8>),
    Close,
}

/// Producer side of the log queue.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::Sender<Message>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chunk(bytes) => write!(f, "Chunk({} bytes)", bytes.len()),
            Self::Close => f.write_str("Close"),
        }
    }
}

impl LogSink {
    /// Opens `destination` and starts the consumer thread.
    pub fn spawn(destination: &LogDestination) -> Result<(Self, LogSinkGuard)> {
        let writer: Box<dyn Write + Send> = match destination {
            LogDestination::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create log directory {}", parent.display())
                    })?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?;
                Box::new(file)
            }
            LogDestination::Stderr => Box::new(io::stderr()),
        };
        Self::spawn_with_writer(writer)
    }

    /// Starts the consumer thread over an arbitrary writer.
    pub fn spawn_with_writer(mut writer: Box<dyn Write + Send>) -> Result<(Self, LogSinkGuard)> {
        let (tx, rx) = mpsc::channel::<Message>();

        let thread = std::thread::Builder::new()
            .name("log-sink".to_string())
            .spawn(move || {
                for message in rx {
                    match message {
                        Message::Chunk(bytes) => {
                            if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
                                eprintln!("log sink write failed: {e}");
                            }
                        }
                        Message::Close => break,
                    }
                }
                let _ = writer.flush();
            })
            .context("Failed to spawn log sink thread")?;

        let guard = LogSinkGuard {
            tx: tx.clone(),
            thread: Some(thread),
        };
        Ok((Self { tx }, guard))
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(Message::Chunk(buf.to_vec()))
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Owner of the consumer thread. Dropping it drains the queue and joins.
#[derive(Debug)]
pub struct LogSinkGuard {
    tx: mpsc::Sender<Message>,
    thread: Option<JoinHandle<()>>,
}

impl LogSinkGuard {
    /// Writes out everything queued so far, then stops the consumer.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        let _ = self.tx.send(Message::Close);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LogSinkGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Installs `env_logger` with its output routed through a [`LogSink`].
///
/// `RUST_LOG` wins over the default filter, which is `info` or `debug`
/// when `verbose` is set.
pub fn init(destination: &LogDestination, verbose: bool) -> Result<LogSinkGuard> {
    let (sink, guard) = LogSink::spawn(destination)?;
    let default_filter = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Pipe(Box::new(sink)))
        .format_timestamp_secs()
        .try_init()
        .context("Logger already initialized")?;

    Ok(guard)
}

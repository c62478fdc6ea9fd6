//! Tracing setup for streamsim.
//!
//! Console output at a user-chosen level plus a full trace of the run on disk.
//! Simulation runs are replayable, so the on-disk trace of the last run is
//! usually enough to diagnose a misbehaving session without re-running it.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the full trace of the most recent run.
pub const TRACE_FILE_NAME: &str = "streamsim-last-run.log";

/// Errors installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Cannot prepare trace file {path}: {source}")]
    TraceFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Global tracing subscriber already installed")]
    AlreadyInitialized,
}

/// Initializes tracing with console output at `console_level` and a trace-level file.
///
/// `RUST_LOG` overrides the console filter when set. The file at
/// `<traces_dir>/streamsim-last-run.log` is overwritten on every run.
///
/// # Errors
///
/// - `TracingError::TraceFile` - Directory or file cannot be created
/// - `TracingError::AlreadyInitialized` - Another subscriber is installed
pub fn init_tracing(console_level: Level, traces_dir: &Path) -> Result<PathBuf, TracingError> {
    let trace_path = traces_dir.join(TRACE_FILE_NAME);
    let trace_file = create_dir_all(traces_dir)
        .and_then(|()| File::create(&trace_path))
        .map_err(|source| TracingError::TraceFile {
            path: trace_path.clone(),
            source,
        })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(trace_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)?;

    tracing::info!(
        console = %console_level,
        trace_file = %trace_path.display(),
        "Tracing initialized"
    );

    Ok(trace_path)
}

/// CLI log levels for user control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warnings, including failed connections and ignored events
    Warn,
    /// Session milestones
    Info,
    /// Per-event controller flow
    Debug,
    /// Every scheduler step
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use streamsim_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.as_tracing_level(), f)
    }
}

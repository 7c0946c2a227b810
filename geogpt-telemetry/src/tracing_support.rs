//! Structured tracing bootstrap.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use geogpt_config::{LogFormat, LogRotation, LoggingConfig};
use thiserror::Error;
use tracing::{Span, debug, info_span};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Result alias for logging bootstrap.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directive could not be parsed.
    #[error("invalid log filter `{directive}`: {source}")]
    InvalidFilter {
        /// Offending directive.
        directive: String,
        /// Parser error.
        #[source]
        source: ParseError,
    },

    /// The log directory could not be created.
    #[error("cannot create log directory {}: {source}", path.display())]
    LogDirectory {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The rolling file appender failed to start.
    #[error("cannot open log file: {0}")]
    Appender(#[from] InitError),
}

/// Keeps the background file writer alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LoggingGuard {
    worker: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Returns `true` if this guard owns a file sink.
    #[must_use]
    pub fn has_file_sink(&self) -> bool {
        self.worker.is_some()
    }
}

/// Installs the process-wide subscriber described by `config`.
///
/// Only the first call has an effect; later calls return an inert guard. If
/// another subscriber was installed by someone else, that one is kept.
/// `RUST_LOG`, when set and valid, takes precedence over `config.level`.
///
/// # Errors
///
/// Returns [`TelemetryError`] if the filter is invalid or the log file cannot
/// be opened. A failed call leaves logging uninitialised so it can be retried.
pub fn initialize(config: &LoggingConfig) -> TelemetryResult<LoggingGuard> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(LoggingGuard::default());
    }

    install(config).inspect_err(|_| INITIALIZED.store(false, Ordering::SeqCst))
}

fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

/// Returns a span identifying `name` as the emitting component.
///
/// Initialises logging with default settings if nothing has been installed yet.
#[must_use]
pub fn get_logger(name: &str) -> Span {
    if !is_initialized() {
        if let Err(err) = initialize(&LoggingConfig::default()) {
            eprintln!("geogpt: failed to initialise logging: {err}");
        }
    }
    info_span!("component", component = %name)
}

fn install(config: &LoggingConfig) -> TelemetryResult<LoggingGuard> {
    let env_filter = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(env_filter.as_deref(), &config.level)?;

    let mut layers: Vec<BoxedLayer> = vec![formatted(config.format, io::stdout, config.ansi)];
    let mut worker = None;
    if let Some(path) = &config.file {
        let (writer, guard) = file_writer(path, config)?;
        layers.push(formatted(config.format, writer, false));
        worker = Some(guard);
    }

    if tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_err()
    {
        debug!("global subscriber already installed; keeping it");
        return Ok(LoggingGuard::default());
    }

    debug!(level = %config.level, format = ?config.format, "logging initialised");
    Ok(LoggingGuard { worker })
}

fn build_filter(env_value: Option<&str>, level: &str) -> TelemetryResult<EnvFilter> {
    if let Some(filter) = env_value
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
    {
        return Ok(filter);
    }

    EnvFilter::try_new(level).map_err(|source| TelemetryError::InvalidFilter {
        directive: level.to_owned(),
        source,
    })
}

fn formatted<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match format {
        LogFormat::Full => layer.with_target(true).with_line_number(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

fn file_writer(
    path: &Path,
    config: &LoggingConfig,
) -> TelemetryResult<(NonBlocking, WorkerGuard)> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(directory).map_err(|source| TelemetryError::LogDirectory {
        path: directory.to_path_buf(),
        source,
    })?;

    let prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("geogpt.log");

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation(config.rotation))
        .filename_prefix(prefix);
    if config.max_files > 0 {
        builder = builder.max_log_files(config.max_files);
    }
    let appender = builder.build(directory)?;

    Ok(tracing_appender::non_blocking(appender))
}

//! Tiered file logging.
//!
//! A [`Logger`] owns a `tracing` dispatcher with one layer per sink. Each
//! sink writes every record at or above its minimum severity to its own
//! rolling file, so the DEBUG file is a superset of the INFO file which is a
//! superset of the ERROR file.

pub mod compression;
pub mod format;
pub mod retention;
pub mod rolling;

pub use compression::Compression;
pub use rolling::{Clock, FilePolicy, ManualClock, RollingFile, Rotation, SystemClock};

use crate::error::{Error, Result};
use chrono::Local;
use format::PipeFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, Dispatch};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable holding an `EnvFilter` directive for the console sink
pub const CONSOLE_FILTER_ENV: &str = "RESLOG_CONSOLE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self {
            Severity::Trace => LevelFilter::TRACE,
            Severity::Debug => LevelFilter::DEBUG,
            Severity::Info => LevelFilter::INFO,
            Severity::Warn => LevelFilter::WARN,
            Severity::Error => LevelFilter::ERROR,
        }
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            _ => Err(Error::InvalidSeverity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// File suffix: records land in `{timestamp}_{name}.log`
    pub name: String,

    /// Minimum severity written to this sink
    pub level: Severity,

    #[serde(default = "default_rotation")]
    pub rotation: Rotation,

    /// Days a rotated file is kept (0 = forever)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub compression: Compression,
}

fn default_rotation() -> Rotation {
    Rotation::Daily
}

fn default_retention_days() -> u32 {
    7
}

impl SinkConfig {
    /// Daily rotation, 7 day retention, zip compression.
    pub fn new(name: impl Into<String>, level: Severity) -> Self {
        Self {
            name: name.into(),
            level,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
            compression: Compression::Zip,
        }
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn policy(&self) -> FilePolicy {
        FilePolicy {
            rotation: self.rotation,
            retention_days: self.retention_days,
            compression: self.compression,
        }
    }

    pub fn file_name(&self, timestamp: &str) -> String {
        format!("{}_{}.log", timestamp, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub sinks: Vec<SinkConfig>,

    /// Also write to stderr at this level (None = files only)
    #[serde(default)]
    pub console: Option<Severity>,
}

impl LoggerConfig {
    /// The info/debug/error file sinks without a console.
    pub fn tiered() -> Self {
        Self {
            sinks: vec![
                SinkConfig::new("info", Severity::Info),
                SinkConfig::new("debug", Severity::Debug),
                SinkConfig::new("error", Severity::Error).retention_days(30),
            ],
            console: None,
        }
    }

    pub fn with_console(mut self, level: Option<Severity>) -> Self {
        self.console = level;
        self
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::tiered().with_console(Some(Severity::Debug))
    }
}

/// An explicitly constructed logger.
///
/// Nothing is global until [`Logger::install_global`] is called; until then
/// records only reach the sinks from inside [`Logger::in_scope`].
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    files: Vec<PathBuf>,
}

impl Logger {
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Paths of the active sink files, in sink order
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Runs `f` with this logger as the current dispatcher.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Makes this logger the process-wide default. Can only succeed once.
    pub fn install_global(&self) -> Result<()> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
            .map_err(|e| Error::Subscriber(e.to_string()))
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("files", &self.files).finish()
    }
}

/// Local-time label grouping one run's log files
pub fn run_timestamp() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Tiered logger with the default sink table: INFO/DEBUG/ERROR files,
/// daily rotation, 7/7/30 days retention, zip compression, DEBUG console.
pub fn setup_logger(log_dir: impl AsRef<Path>, timestamp: &str) -> Result<Logger> {
    configure(log_dir, timestamp, &LoggerConfig::default())
}

pub fn configure(log_dir: impl AsRef<Path>, timestamp: &str, config: &LoggerConfig) -> Result<Logger> {
    configure_with_clock(log_dir, timestamp, config, Arc::new(SystemClock))
}

/// Opens every sink eagerly so an unusable directory fails here rather than
/// on the first record.
pub fn configure_with_clock(
    log_dir: impl AsRef<Path>,
    timestamp: &str,
    config: &LoggerConfig,
    clock: Arc<dyn Clock>,
) -> Result<Logger> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir).map_err(|e| Error::io(log_dir, e))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut files = Vec::with_capacity(config.sinks.len());

    for sink in &config.sinks {
        let path = log_dir.join(sink.file_name(timestamp));
        let file = RollingFile::open(&path, sink.policy(), clock.clone())?;

        layers.push(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .event_format(PipeFormat::new(clock.clone()))
                .with_writer(file)
                .with_filter(sink.level.level_filter())
                .boxed(),
        );
        files.push(path);
    }

    if let Some(level) = config.console {
        let filter = EnvFilter::try_from_env(CONSOLE_FILTER_ENV)
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
        layers.push(
            tracing_subscriber::fmt::layer()
                .event_format(PipeFormat::new(clock.clone()))
                .with_writer(io::stderr)
                .with_filter(filter)
                .boxed(),
        );
    }

    let logger = Logger {
        dispatch: Dispatch::new(Registry::default().with(layers)),
        files,
    };

    debug!(
        "Configured {} log sinks in {}",
        logger.files.len(),
        log_dir.display()
    );
    Ok(logger)
}

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Opening, rotating, compressing or removing a log file failed
    #[error("log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The OS refused to report a resource counter
    #[error("reading metrics for {path}: {source}")]
    Metrics {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown unit '{0}', expected one of B, KB, MB, GB")]
    InvalidUnit(String),

    #[error("invalid rotation '{0}'")]
    InvalidRotation(String),

    #[error("unknown severity '{0}'")]
    InvalidSeverity(String),

    #[error("failed to install logger: {0}")]
    Subscriber(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Tiered rotating file logging and host resource sampling.
//!
//! [`logging::setup_logger`] builds a [`Logger`] writing INFO, DEBUG and
//! ERROR records to separate daily-rotated, zip-compressed files.
//! [`ResourceLogger`] samples CPU, memory, disk and network usage and writes
//! it as one pipe-delimited INFO line.

pub mod error;
pub mod logging;
pub mod resources;
pub mod utils;

pub use error::{Error, Result};
pub use logging::{configure, setup_logger, Logger, LoggerConfig, Severity, SinkConfig};
pub use resources::{
    ResourceLogger, ResourceSampler, ResourceSnapshot, Rounding, SampleOptions, SysinfoSource, Unit,
};

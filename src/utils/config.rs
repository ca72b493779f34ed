use crate::logging::LoggerConfig;
use crate::resources::{Rounding, SampleOptions, Unit};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Variable naming the log directory, kept for existing deployments
pub const LOG_DIR_ENV: &str = "PATH_LOG_VIRTUAL";

/// Prefix for every other environment override (`RESLOG_UNIT=GB`, ...)
pub const ENV_PREFIX: &str = "RESLOG";

pub const DEFAULT_CONFIG_FILE: &str = "resource-log.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the tiered log files are written to
    pub log_dir: PathBuf,

    /// Unit for memory, disk and network figures
    pub unit: Unit,

    /// Decimal places kept after conversion
    pub round: u32,

    pub rounding: Rounding,

    /// Filesystem whose usage is reported as disk
    pub disk_path: PathBuf,

    /// Seconds between resource lines (0 = log one line and exit)
    pub sample_interval_secs: u64,

    pub logging: LoggerConfig,
}

impl Default for Config {
    fn default() -> Self {
        let log_dir = dirs::data_local_dir()
            .map(|p| p.join("resource-log").join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));

        Self {
            log_dir,
            unit: Unit::MB,
            round: 2,
            rounding: Rounding::Truncate,
            disk_path: PathBuf::from("/"),
            sample_interval_secs: 0,
            logging: LoggerConfig::default(),
        }
    }
}

impl Config {
    /// Load config from defaults, an optional TOML file and the environment.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        if let Ok(dir) = std::env::var(LOG_DIR_ENV) {
            builder = builder.set_override("log_dir", dir)?;
        }

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("invalid configuration (file: {})", path.display()))?;

        Ok(config)
    }

    pub fn sample_options(&self) -> SampleOptions {
        SampleOptions::new(self.unit, self.round).rounding(self.rounding)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Compression, Rotation, Severity};
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.unit, Unit::MB);
        assert_eq!(config.round, 2);
        assert_eq!(config.disk_path, PathBuf::from("/"));
        assert_eq!(config.sample_options(), SampleOptions::default());
        assert_eq!(config.logging, LoggerConfig::default());
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resource-log.toml");
        fs::write(
            &path,
            r#"
unit = "gb"
round = 3
rounding = "nearest"
sample_interval_secs = 60

[logging]
console = "warn"

[[logging.sinks]]
name = "all"
level = "TRACE"
rotation = "6h"
retention_days = 2
compression = "none"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.unit, Unit::GB);
        assert_eq!(config.round, 3);
        assert_eq!(config.rounding, Rounding::Nearest);
        assert_eq!(config.sample_interval_secs, 60);
        assert_eq!(config.logging.console, Some(Severity::Warn));

        let sink = &config.logging.sinks[0];
        assert_eq!(sink.name, "all");
        assert_eq!(sink.level, Severity::Trace);
        assert_eq!(sink.rotation, Rotation::Every(std::time::Duration::from_secs(6 * 3600)));
        assert_eq!(sink.retention_days, 2);
        assert_eq!(sink.compression, Compression::None);
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.unit, Unit::MB);
        assert_eq!(config.logging.sinks.len(), 3);
    }

    #[test]
    #[serial]
    fn test_bad_unit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "unit = \"TB\"\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_log_dir_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resource-log.toml");
        fs::write(&path, "log_dir = \"/from/file\"\n").unwrap();

        std::env::set_var(LOG_DIR_ENV, dir.path());
        let config = Config::load(Some(&path));
        std::env::remove_var(LOG_DIR_ENV);

        assert_eq!(config.unwrap().log_dir, dir.path());
    }
}

//! Logging bootstrap shared by RBS binaries.
//!
//! Everything in this workspace logs through `tracing`; this crate only
//! wires the subscriber. Console output is always available, file output is
//! enabled by setting [`LogConfig::log_dir`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter (trace, debug, info, warn, error). Overridden by
    /// `RUST_LOG` when that is set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files. `None` disables file logging.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Prefix for rotated log file names.
    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    /// Log rotation: "hourly", "daily", "never".
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Whether to also log to stdout.
    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "rbs".into()
}

fn default_rotation() -> String {
    "daily".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: default_rotation(),
            console_output: true,
        }
    }
}

/// Initialize the logging system. Call once at program startup.
///
/// When file logging is enabled the returned guard must be kept alive for
/// the lifetime of the process; dropping it stops the non-blocking writer.
pub fn init_logging(config: &LogConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = config.console_output.then(fmt::layer);

    let (file_layer, guard) = match &config.log_dir {
        Some(log_dir) => {
            let rotation = match config.rotation.as_str() {
                "hourly" => rolling::Rotation::HOURLY,
                "never" => rolling::Rotation::NEVER,
                _ => rolling::Rotation::DAILY,
            };

            let file_appender = rolling::RollingFileAppender::builder()
                .rotation(rotation)
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log")
                .build(log_dir)
                .expect("failed to create rolling file appender");

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (Some(fmt::layer().with_ansi(false).with_writer(non_blocking)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.log_dir.is_none());
        assert_eq!(config.file_prefix, "rbs");
        assert_eq!(config.rotation, "daily");
        assert!(config.console_output);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = LogConfig {
            level: "debug".into(),
            log_dir: Some(PathBuf::from("/var/log/rbs")),
            file_prefix: "chunkserver".into(),
            rotation: "hourly".into(),
            console_output: false,
        };
        let doc = toml::to_string(&config).unwrap();
        let parsed: LogConfig = toml::from_str(&doc).unwrap();
        assert_eq!(parsed.level, "debug");
        assert_eq!(parsed.log_dir, config.log_dir);
        assert_eq!(parsed.rotation, "hourly");
        assert!(!parsed.console_output);
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let parsed: LogConfig = toml::from_str("level = \"warn\"").unwrap();
        assert_eq!(parsed.level, "warn");
        assert_eq!(parsed.rotation, "daily");
        assert!(parsed.console_output);
    }
}

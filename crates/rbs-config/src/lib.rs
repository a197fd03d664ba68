//! Configuration plumbing shared by RBS services.
//!
//! A config section implements [`Config`]; [`ConfigManager`] then provides
//! lock-free snapshots and TOML hot reload where only the fields a section
//! declares hot-updatable change at runtime.

pub mod manager;

pub use manager::ConfigManager;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A validated, hot-reloadable configuration section.
pub trait Config: Sized + Send + Sync + 'static {
    /// Build the section from a parsed TOML document.
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError>;

    /// Check cross-field constraints. Called on every load and update.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Copy the hot-updatable fields of `newer` into `self`.
    fn hot_update(&mut self, newer: &Self);
}

/// Default `from_toml` body for serde-deserializable sections.
pub fn from_toml_value<T: DeserializeOwned>(value: &toml::Value) -> Result<T, ConfigError> {
    value.clone().try_into().map_err(ConfigError::Parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_value() {
        #[derive(serde::Deserialize)]
        struct Sample {
            name: String,
            count: u32,
        }

        let value: toml::Value = "name = \"pool\"\ncount = 3".parse().unwrap();
        let sample: Sample = from_toml_value(&value).unwrap();
        assert_eq!(sample.name, "pool");
        assert_eq!(sample.count, 3);
    }

    #[test]
    fn test_from_toml_value_missing_field() {
        #[derive(serde::Deserialize, Debug)]
        struct Sample {
            #[allow(dead_code)]
            name: String,
        }

        let value: toml::Value = "count = 3".parse().unwrap();
        let err = from_toml_value::<Sample>(&value).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

//! Error types for configuration loading.

use std::io;
use std::path::PathBuf;

use filegate_batch::RegistryError;
use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Environment variable or document field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Reading a configuration file failed.
    #[error("failed to read configuration file")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A YAML document could not be decoded.
    #[error("failed to parse configuration document")]
    Yaml {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
    /// The registry described by configuration is inconsistent.
    #[error("invalid file type registry")]
    Registry {
        /// Underlying registry error.
        source: RegistryError,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: &str) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: Some(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_helper_captures_value() {
        let err = ConfigError::invalid("FILEGATE_HTTP_PORT", "out_of_range", "0");
        assert_eq!(err.to_string(), "invalid configuration field");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "FILEGATE_HTTP_PORT",
                reason: "out_of_range",
                value: Some(ref v),
            } if v == "0"
        ));
    }
}

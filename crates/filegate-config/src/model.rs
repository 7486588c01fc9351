//! Typed pipeline configuration passed to each component at construction.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use filegate_batch::FileTypeRegistry;
use url::Url;

use crate::defaults::{
    DEFAULT_COPY_POLL_ATTEMPTS, DEFAULT_COPY_POLL_INTERVAL, DEFAULT_HTTP_BIND, DEFAULT_HTTP_PORT,
    DEFAULT_INVALID_FOLDER, DEFAULT_LEASE, DEFAULT_LOG_LEVEL, DEFAULT_STORAGE_ROOT,
    DEFAULT_VALID_FOLDER,
};

/// Complete configuration for one pipeline process.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory of the local object store.
    pub storage_root: PathBuf,
    /// Database connection string; `None` keeps lock and tracker state in memory.
    pub database_url: Option<String>,
    /// HTTP listener settings.
    pub http: HttpConfig,
    /// Relocation timing.
    pub relocation: RelocationConfig,
    /// Destination folder names.
    pub destinations: DestinationConfig,
    /// How claimed batches reach validation.
    pub activation: ActivationMode,
    /// Expected file types and schemas.
    pub registry: FileTypeRegistry,
    /// Logging settings.
    pub logging: LogSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            database_url: None,
            http: HttpConfig::default(),
            relocation: RelocationConfig::default(),
            destinations: DestinationConfig::default(),
            activation: ActivationMode::InProcess,
            registry: FileTypeRegistry::default(),
            logging: LogSettings::default(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Bind address.
    pub bind: IpAddr,
    /// Listener port (non-zero).
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HTTP_BIND
                .parse()
                .unwrap_or(IpAddr::from([127, 0, 0, 1])),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Lease and copy polling settings for the relocation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationConfig {
    /// Exclusive lease held on each source object.
    pub lease: Duration,
    /// Delay between copy status polls.
    pub copy_poll_interval: Duration,
    /// Polls allowed per copy attempt before it counts as failed.
    pub copy_poll_attempts: u32,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            lease: DEFAULT_LEASE,
            copy_poll_interval: DEFAULT_COPY_POLL_INTERVAL,
            copy_poll_attempts: DEFAULT_COPY_POLL_ATTEMPTS,
        }
    }
}

/// Folder names batches are relocated to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    /// Folder for batches without validation errors.
    pub valid: String,
    /// Folder for batches with validation errors.
    pub invalid: String,
}

impl DestinationConfig {
    /// Folder for a batch given whether it validated.
    #[must_use]
    pub fn for_outcome(&self, valid: bool) -> &str {
        if valid { &self.valid } else { &self.invalid }
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            valid: DEFAULT_VALID_FOLDER.to_string(),
            invalid: DEFAULT_INVALID_FOLDER.to_string(),
        }
    }
}

/// How claimed batches reach the validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationMode {
    /// Call the validation service in-process.
    InProcess,
    /// POST `{prefix, fileTypes}` to a remote validation endpoint.
    Http {
        /// Endpoint URL.
        url: Url,
    },
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Level directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format name; `None` lets telemetry infer one.
    pub format: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_conventions() {
        let config = PipelineConfig::default();
        assert_eq!(config.destinations.for_outcome(true), "valid-set");
        assert_eq!(config.destinations.for_outcome(false), "invalid-set");
        assert_eq!(config.relocation.lease, Duration::from_secs(60));
        assert_eq!(config.http.port, 7071);
        assert!(config.database_url.is_none());
        assert_eq!(config.activation, ActivationMode::InProcess);
    }
}

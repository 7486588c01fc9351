//! Environment and registry file loading.
//!
//! # Design
//! - `from_lookup` takes an injected variable source so tests never touch the
//!   process environment.
//! - The registry file is optional; without it the built-in registry applies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use filegate_batch::FileTypeRegistry;
use serde::Deserialize;

use crate::defaults::{
    ACTIVATION_URL_ENV, COPY_POLL_ATTEMPTS_ENV, COPY_POLL_MS_ENV, DATABASE_URL_ENV,
    HTTP_BIND_ENV, HTTP_PORT_ENV, INVALID_FOLDER_ENV, LEASE_SECS_ENV, LOG_FORMAT_ENV,
    LOG_LEVEL_ENV, REGISTRY_FILE_ENV, STORAGE_ROOT_ENV, VALID_FOLDER_ENV,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{ActivationMode, PipelineConfig};
use crate::validate::{
    column_count, parse_attempts, parse_bind_addr, parse_folder, parse_millis, parse_port,
    parse_seconds, parse_url,
};

/// Registry file layout.
#[derive(Debug, Deserialize)]
struct RegistryDocument {
    expected: Vec<String>,
    columns: BTreeMap<String, usize>,
}

impl PipelineConfig {
    /// Load configuration from `FILEGATE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable holds an invalid value or the
    /// registry file cannot be read or parsed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(root) = get(STORAGE_ROOT_ENV) {
            config.storage_root = PathBuf::from(root.trim());
        }
        config.database_url = get(DATABASE_URL_ENV).map(|url| url.trim().to_string());
        if let Some(bind) = get(HTTP_BIND_ENV) {
            config.http.bind = parse_bind_addr(HTTP_BIND_ENV, &bind)?;
        }
        if let Some(port) = get(HTTP_PORT_ENV) {
            config.http.port = parse_port(HTTP_PORT_ENV, &port)?;
        }
        if let Some(lease) = get(LEASE_SECS_ENV) {
            config.relocation.lease = parse_seconds(LEASE_SECS_ENV, &lease)?;
        }
        if let Some(interval) = get(COPY_POLL_MS_ENV) {
            config.relocation.copy_poll_interval = parse_millis(COPY_POLL_MS_ENV, &interval)?;
        }
        if let Some(attempts) = get(COPY_POLL_ATTEMPTS_ENV) {
            config.relocation.copy_poll_attempts =
                parse_attempts(COPY_POLL_ATTEMPTS_ENV, &attempts)?;
        }
        if let Some(valid) = get(VALID_FOLDER_ENV) {
            config.destinations.valid = parse_folder(VALID_FOLDER_ENV, &valid)?;
        }
        if let Some(invalid) = get(INVALID_FOLDER_ENV) {
            config.destinations.invalid = parse_folder(INVALID_FOLDER_ENV, &invalid)?;
        }
        if config.destinations.valid == config.destinations.invalid {
            return Err(ConfigError::invalid(
                INVALID_FOLDER_ENV,
                "same_as_valid_folder",
                &config.destinations.invalid,
            ));
        }
        if let Some(url) = get(ACTIVATION_URL_ENV) {
            config.activation = ActivationMode::Http {
                url: parse_url(ACTIVATION_URL_ENV, &url)?,
            };
        }
        if let Some(path) = get(REGISTRY_FILE_ENV) {
            config.registry = load_registry_file(Path::new(path.trim()))?;
        }
        if let Some(level) = get(LOG_LEVEL_ENV) {
            config.logging.level = level.trim().to_string();
        }
        config.logging.format = get(LOG_FORMAT_ENV).map(|format| format.trim().to_string());

        Ok(config)
    }
}

/// Read a YAML registry document.
///
/// ```yaml
/// expected: [type1, type2]
/// columns:
///   type1: 4
///   type2: 4
/// ```
///
/// # Errors
///
/// Returns an error when the file cannot be read, is not valid YAML, holds a
/// zero column count, or leaves an expected type without a schema.
pub fn load_registry_file(path: &Path) -> ConfigResult<FileTypeRegistry> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_registry(&raw).map_err(|err| match err {
        RegistryParseError::Yaml(source) => ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        },
        RegistryParseError::Config(err) => err,
    })
}

enum RegistryParseError {
    Yaml(serde_yaml::Error),
    Config(ConfigError),
}

fn parse_registry(raw: &str) -> Result<FileTypeRegistry, RegistryParseError> {
    let document: RegistryDocument = serde_yaml::from_str(raw).map_err(RegistryParseError::Yaml)?;
    let columns = document
        .columns
        .into_iter()
        .map(|(file_type, count)| column_count(&file_type, count).map(|n| (file_type, n)))
        .collect::<ConfigResult<Vec<_>>>()
        .map_err(RegistryParseError::Config)?;
    FileTypeRegistry::new(document.expected, columns)
        .map_err(|source| RegistryParseError::Config(ConfigError::Registry { source }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() -> ConfigResult<()> {
        let config = PipelineConfig::from_lookup(lookup(&[]))?;
        assert_eq!(config.destinations.valid, "valid-set");
        assert_eq!(config.registry, FileTypeRegistry::default());
        assert!(config.logging.format.is_none());
        Ok(())
    }

    #[test]
    fn environment_overrides_are_applied() -> ConfigResult<()> {
        let config = PipelineConfig::from_lookup(lookup(&[
            (STORAGE_ROOT_ENV, "/data/blobs"),
            (DATABASE_URL_ENV, "postgres://localhost/filegate"),
            (HTTP_BIND_ENV, "0.0.0.0"),
            (HTTP_PORT_ENV, "8080"),
            (LEASE_SECS_ENV, "15"),
            (COPY_POLL_MS_ENV, "50"),
            (COPY_POLL_ATTEMPTS_ENV, "3"),
            (VALID_FOLDER_ENV, "accepted"),
            (INVALID_FOLDER_ENV, "rejected"),
            (ACTIVATION_URL_ENV, "http://validator:7072/api/validate"),
            (LOG_FORMAT_ENV, "json"),
        ]))?;
        assert_eq!(config.storage_root, PathBuf::from("/data/blobs"));
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/filegate")
        );
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.relocation.lease, Duration::from_secs(15));
        assert_eq!(config.relocation.copy_poll_interval, Duration::from_millis(50));
        assert_eq!(config.relocation.copy_poll_attempts, 3);
        assert_eq!(config.destinations.invalid, "rejected");
        assert!(matches!(config.activation, ActivationMode::Http { .. }));
        assert_eq!(config.logging.format.as_deref(), Some("json"));
        Ok(())
    }

    #[test]
    fn identical_destinations_are_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[
            (VALID_FOLDER_ENV, "sets"),
            (INVALID_FOLDER_ENV, "sets"),
        ]))
        .expect_err("same folders");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                reason: "same_as_valid_folder",
                ..
            }
        ));
    }

    #[test]
    fn registry_file_replaces_default_registry() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "expected: [type1, type9]\ncolumns:\n  type1: 4\n  type9: 14\n"
        )?;
        let path = file.path().to_string_lossy().into_owned();
        let config = PipelineConfig::from_lookup(lookup(&[(REGISTRY_FILE_ENV, path.as_str())]))?;
        assert_eq!(config.registry.expected().len(), 2);
        assert_eq!(config.registry.column_count("type9")?.get(), 14);
        Ok(())
    }

    #[test]
    fn registry_errors_are_classified() {
        assert!(matches!(
            parse_registry("expected: [a]\ncolumns:\n  a: 0\n"),
            Err(RegistryParseError::Config(ConfigError::InvalidField { .. }))
        ));
        assert!(matches!(
            parse_registry("expected: [a, b]\ncolumns:\n  a: 1\n"),
            Err(RegistryParseError::Config(ConfigError::Registry { .. }))
        ));
        assert!(matches!(
            parse_registry("expected: {"),
            Err(RegistryParseError::Yaml(_))
        ));
        let missing = load_registry_file(Path::new("/definitely/missing/registry.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}

//! Default values and environment variable names.

use std::time::Duration;

/// Root directory for the local object store.
pub const STORAGE_ROOT_ENV: &str = "FILEGATE_STORAGE_ROOT";
/// `PostgreSQL` connection string; absent selects in-memory stores.
pub const DATABASE_URL_ENV: &str = "FILEGATE_DATABASE_URL";
/// HTTP bind address.
pub const HTTP_BIND_ENV: &str = "FILEGATE_HTTP_BIND";
/// HTTP port.
pub const HTTP_PORT_ENV: &str = "FILEGATE_HTTP_PORT";
/// Lease duration in seconds.
pub const LEASE_SECS_ENV: &str = "FILEGATE_LEASE_SECS";
/// Copy status poll interval in milliseconds.
pub const COPY_POLL_MS_ENV: &str = "FILEGATE_COPY_POLL_MS";
/// Maximum copy status polls per attempt.
pub const COPY_POLL_ATTEMPTS_ENV: &str = "FILEGATE_COPY_POLL_ATTEMPTS";
/// Folder receiving valid batches.
pub const VALID_FOLDER_ENV: &str = "FILEGATE_VALID_FOLDER";
/// Folder receiving invalid batches.
pub const INVALID_FOLDER_ENV: &str = "FILEGATE_INVALID_FOLDER";
/// Remote validation endpoint; absent selects in-process validation.
pub const ACTIVATION_URL_ENV: &str = "FILEGATE_ACTIVATION_URL";
/// YAML file describing expected types and column counts.
pub const REGISTRY_FILE_ENV: &str = "FILEGATE_REGISTRY_FILE";
/// Log level.
pub const LOG_LEVEL_ENV: &str = "FILEGATE_LOG_LEVEL";
/// Log format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "FILEGATE_LOG_FORMAT";

pub(crate) const DEFAULT_STORAGE_ROOT: &str = ".server_root/storage";
pub(crate) const DEFAULT_HTTP_BIND: &str = "127.0.0.1";
pub(crate) const DEFAULT_HTTP_PORT: u16 = 7071;
pub(crate) const DEFAULT_LEASE: Duration = Duration::from_secs(60);
pub(crate) const DEFAULT_COPY_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const DEFAULT_COPY_POLL_ATTEMPTS: u32 = 10;
pub(crate) const DEFAULT_VALID_FOLDER: &str = "valid-set";
pub(crate) const DEFAULT_INVALID_FOLDER: &str = "invalid-set";
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";

//! # Design
//!
//! - Constant messages; keys, paths, and identifiers travel as fields.
//! - `NotFound` is its own variant so callers can swallow vanished objects.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

/// Result type for object storage operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by object storage, CSV checks, and relocation.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// The object does not exist.
    #[error("object not found")]
    NotFound {
        /// Object key that was requested.
        path: String,
    },
    /// IO failures while interacting with the backing filesystem.
    #[error("object storage io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The object key cannot be mapped onto the store.
    #[error("object key is invalid")]
    InvalidKey {
        /// Key as received.
        path: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// Another holder owns an active lease on the object.
    #[error("object is leased")]
    LeaseHeld {
        /// Leased object key.
        path: String,
    },
    /// The supplied lease does not match the active lease.
    #[error("lease does not match")]
    LeaseMismatch {
        /// Object key the lease was presented for.
        path: String,
    },
    /// A copy identifier was not issued by this store.
    #[error("copy operation unknown")]
    CopyUnknown {
        /// Identifier that was queried.
        copy_id: Uuid,
    },
}

impl FsOpsError {
    /// Map an IO error, classifying a missing file as [`FsOpsError::NotFound`].
    pub(crate) fn io(
        operation: &'static str,
        key: &str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound {
                path: key.to_string(),
            };
        }
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether the error reports a missing object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

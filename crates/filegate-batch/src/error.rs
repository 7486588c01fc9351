//! # Design
//!
//! - Separate parse failures from policy violations so ingress can treat them differently.
//! - Keep error messages constant; carry the offending values as fields.
//! - Storage backends box their source so the core stays backend-agnostic.

use std::error::Error;

use thiserror::Error;

/// Failures raised while deriving batch attributes from an upload path.
#[derive(Debug, Error)]
pub enum AttributeError {
    /// The file name pattern could not be compiled.
    #[error("batch key pattern failed to compile")]
    Pattern {
        /// Underlying regex error.
        source: regex::Error,
    },
    /// Path segments did not follow `container/inbound/[subfolder/]file.csv`.
    #[error("upload path is malformed")]
    MalformedPath {
        /// Path as received.
        path: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// File name did not follow `customer_date_time_type.csv`.
    #[error("upload file name is malformed")]
    MalformedName {
        /// File name as received.
        file_name: String,
    },
    /// The `date_time` portion was not a `YYYYMMDD_HHMM` timestamp.
    #[error("batch timestamp is invalid")]
    InvalidTimestamp {
        /// Timestamp text as received.
        value: String,
    },
    /// The customer named in the file does not own the container.
    #[error("customer does not match container")]
    ContainerMismatch {
        /// Container the file was uploaded to.
        container: String,
        /// Customer derived from the file name.
        customer: String,
    },
}

impl AttributeError {
    /// Whether this error is a policy violation rather than a parse failure.
    #[must_use]
    pub const fn is_policy_violation(&self) -> bool {
        matches!(self, Self::ContainerMismatch { .. })
    }
}

/// Failures raised by the expected-set registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A file type without a configured schema was looked up.
    #[error("unhandled file type")]
    UnknownFileType {
        /// File type that was requested.
        file_type: String,
    },
    /// An expected file type has no column count.
    #[error("expected file type has no schema")]
    MissingSchema {
        /// File type missing a column count.
        file_type: String,
    },
    /// The expected set was empty.
    #[error("expected file type set is empty")]
    EmptyExpectedSet,
}

/// Result alias for lock and tracker store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by lock and tracker stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lock record expected to exist was not found.
    #[error("lock record missing")]
    RecordMissing {
        /// Batch identity that was looked up.
        batch_prefix: String,
    },
    /// A tracker expected to exist was not found.
    #[error("tracker missing")]
    TrackerMissing {
        /// Batch identity that was looked up.
        batch_prefix: String,
    },
    /// A tracker was saved over a newer version.
    #[error("tracker version conflict")]
    VersionConflict {
        /// Batch identity being saved.
        batch_prefix: String,
        /// Version the writer expected to replace.
        expected: u64,
    },
    /// Persisted data could not be decoded.
    #[error("stored value is invalid")]
    InvalidValue {
        /// Field that failed to decode.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// The storage backend failed.
    #[error("store backend failure")]
    Backend {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StoreError {
    /// Wrap a backend error with the failing operation.
    pub fn backend(operation: &'static str, source: impl Error + Send + Sync + 'static) -> Self {
        Self::Backend {
            operation,
            source: Box::new(source),
        }
    }
}

/// Result alias for coordination and validation operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures surfaced by the coordinator and validation run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upload violated ingestion policy.
    #[error("upload violates ingestion policy")]
    Policy {
        /// Underlying attribute error.
        source: AttributeError,
    },
    /// The registry rejected a lookup; indicates a deployment defect.
    #[error("pipeline configuration defect")]
    Configuration {
        /// Underlying registry error.
        source: RegistryError,
    },
    /// Lock or tracker persistence failed.
    #[error("pipeline store failure")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying store error.
        source: StoreError,
    },
    /// Object storage failed in a way that aborts the current run.
    #[error("object storage failure")]
    Storage {
        /// Operation identifier.
        operation: &'static str,
        /// Object key involved.
        path: String,
        /// Underlying storage error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Downstream activation failed.
    #[error("downstream activation failed")]
    Activation {
        /// Operation identifier.
        operation: &'static str,
        /// Diagnostic detail.
        detail: String,
    },
    /// Tracker updates kept conflicting with concurrent writers.
    #[error("tracker contention limit reached")]
    Contention {
        /// Batch identity being coordinated.
        batch_prefix: String,
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl PipelineError {
    /// Wrap a store error with the failing operation.
    #[must_use]
    pub const fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }

    /// Wrap an object storage error with the failing operation and key.
    pub fn storage(
        operation: &'static str,
        path: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            operation,
            path: path.into(),
            source: Box::new(source),
        }
    }
}

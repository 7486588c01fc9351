#![forbid(unsafe_code)]
#![warn(
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Storage-agnostic batch coordination primitives.
//!
//! Layout: `attributes.rs` (batch key parser), `registry.rs` (expected set and
//! schemas), `tracker.rs` (per-batch state machine), `host.rs` (tracker
//! persistence and durable host interface), `lock.rs` (dedup lock store),
//! `pipeline.rs` (validation and coordination contracts), `error.rs`.

pub mod attributes;
pub mod error;
pub mod host;
pub mod lock;
pub mod pipeline;
pub mod registry;
pub mod tracker;

pub use attributes::{BatchAttributes, BatchKeyParser, UploadNotification};
pub use error::{
    AttributeError, PipelineError, PipelineResult, RegistryError, StoreError, StoreResult,
};
pub use host::{MemoryTrackerStore, StartOutcome, TrackerHost, TrackerSeed, TrackerStore};
pub use lock::{LockRecord, LockState, LockStore, MemoryLockStore};
pub use pipeline::{
    ActivationOutcome, BatchValidator, NotificationOutcome, RelocationSummary, UploadCoordinator,
    ValidationOutcome, ValidationReport, ValidationRequest, ValidationResult,
};
pub use registry::FileTypeRegistry;
pub use tracker::{BatchTrackerState, TrackerEvent, TrackerStatus, TrackerTransition};

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

//! Object storage, CSV structure checks, and batch relocation.
//!
//! Layout: `store.rs` (object store contract), `local.rs` (filesystem-backed
//! store), `csv.rs` (structural validator), `relocate.rs` (lease, copy,
//! delete), `error.rs`.

pub mod csv;
pub mod error;
pub mod local;
pub mod relocate;
pub mod store;

pub use csv::{CsvTarget, validate_csv};
pub use error::{FsOpsError, FsOpsResult};
pub use local::LocalObjectStore;
pub use relocate::{RelocationReport, Relocator};
pub use store::{CopyId, CopyStatus, LeaseId, ObjectReader, ObjectStore};

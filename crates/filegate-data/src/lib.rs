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

//! PostgreSQL persistence for dedup locks and batch trackers.
//!
//! Layout: `pool.rs` (connection and migrations), `locks.rs`, `trackers.rs`, `error.rs`.

pub mod error;
pub mod locks;
pub mod pool;
pub mod trackers;

pub use error::{DataError, Result as DataResult};
pub use locks::PgLockStore;
pub use pool::FilegateDatabase;
pub use trackers::PgTrackerStore;

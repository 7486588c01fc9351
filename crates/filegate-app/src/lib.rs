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

//! Filegate application wiring.
//!
//! Layout: `coordinator.rs` (upload notifications to trackers), `tracker_host.rs`
//! (durable tracker host), `validation.rs` (validation run), `activation.rs`
//! (downstream hand-off), `bootstrap.rs` (service wiring), `error.rs`.

pub mod activation;
/// Application bootstrap and environment loading.
pub mod bootstrap;
pub mod coordinator;
pub mod error;
pub mod tracker_host;
pub mod validation;

pub use activation::{Activator, HttpActivator, InProcessActivator};
pub use bootstrap::{Backends, PipelineServices, run_app};
pub use coordinator::Coordinator;
pub use error::{AppError, AppResult};
pub use tracker_host::DurableTrackerHost;
pub use validation::ValidationService;

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

//! HTTP ingress for upload notifications and validation triggers.
//!
//! Layout: `http/router.rs` (server host), `http/ingest.rs` (notification and
//! validation handlers), `http/events.rs` (event stream),
//! `http/health.rs` (health and metrics),
//! `http/errors.rs` (problem responses), `models.rs` (wire types),
//! `state.rs`, `error.rs`.

pub mod error;
pub mod http;
pub mod models;
pub(crate) mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;

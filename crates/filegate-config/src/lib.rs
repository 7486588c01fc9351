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

//! Pipeline configuration for the Filegate services.
//!
//! Layout: `model.rs` (typed configuration), `loader.rs` (environment and
//! registry file loading), `validate.rs` (field parsing), `error.rs`.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    ActivationMode, DestinationConfig, HttpConfig, LogSettings, PipelineConfig, RelocationConfig,
};

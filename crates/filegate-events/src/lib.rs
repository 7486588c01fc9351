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

//! Pipeline event bus for the Filegate ingestion services.
//!
//! The bus provides a typed event enum, sequential identifiers, and replay of
//! recent events for subscribers that reconnect with a known last id.
//! Layout: `payloads.rs` (event types), `routing.rs` (bus).

pub mod payloads;
pub mod routing;

pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use routing::{EventBus, EventStream};

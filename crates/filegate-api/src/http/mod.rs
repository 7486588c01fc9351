//! HTTP surface modules (router, handlers, middleware).

/// Shared constants and header names.
pub mod constants;
/// Problem response helpers.
pub mod errors;
/// Server-sent pipeline events.
pub mod events;
/// Health and metrics endpoints.
pub mod health;
/// Notification and validation handlers.
pub mod ingest;
/// Router construction and server host.
pub mod router;
/// Metrics middleware for HTTP requests.
pub mod telemetry;

//! Object store contract used by validation and relocation.
//!
//! # Design
//! - Mirrors blob-store primitives: prefix listing, streaming reads,
//!   exclusive leases, asynchronous server-side copies, and leased deletes.
//! - Copies are fire-and-poll; callers own the polling policy.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufRead;
use uuid::Uuid;

use crate::error::FsOpsResult;

/// Streaming reader over one object's contents.
pub type ObjectReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Identifier of an exclusive lease on an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseId(pub Uuid);

impl LeaseId {
    /// Generate a fresh lease identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LeaseId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}

/// Identifier of an in-flight copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyId(pub Uuid);

impl CopyId {
    /// Generate a fresh copy identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CopyId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CopyId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}

/// Progress of an asynchronous copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    /// Still running.
    Pending,
    /// Destination fully written.
    Success,
    /// Copy aborted; destination contents are undefined.
    Failed,
}

/// Blob-style object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys starting with `prefix`, in lexical order.
    async fn list(&self, prefix: &str) -> FsOpsResult<Vec<String>>;

    /// Open an object for streaming reads.
    async fn open(&self, path: &str) -> FsOpsResult<ObjectReader>;

    /// Take an exclusive lease on an existing object.
    async fn acquire_lease(&self, path: &str, duration: Duration) -> FsOpsResult<LeaseId>;

    /// Give up a lease.
    async fn release_lease(&self, path: &str, lease: &LeaseId) -> FsOpsResult<()>;

    /// Begin copying `source` to `destination`, overwriting the destination.
    async fn start_copy(&self, source: &str, destination: &str) -> FsOpsResult<CopyId>;

    /// Current status of a copy started by this store.
    async fn copy_status(&self, copy: &CopyId) -> FsOpsResult<CopyStatus>;

    /// Delete an object; a leased object requires its lease.
    async fn delete(&self, path: &str, lease: Option<&LeaseId>) -> FsOpsResult<()>;
}

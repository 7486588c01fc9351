//! Moves a validated batch into its destination folder.
//!
//! # Design
//! - Per file: lease the source, copy, poll, retry the copy once, delete the
//!   source under the lease.
//! - A file whose copy fails twice stays where it was; it is reported, never
//!   deleted.
//! - Files move concurrently and fail independently.

use std::sync::Arc;

use filegate_batch::{BatchAttributes, RelocationSummary};
use filegate_config::RelocationConfig;
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::store::{CopyStatus, LeaseId, ObjectStore};

const COPY_ATTEMPTS: u32 = 2;

/// Keys moved and left behind by one relocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationReport {
    /// Destination keys written.
    pub moved: Vec<String>,
    /// Source keys left in place.
    pub failed: Vec<String>,
}

impl RelocationReport {
    /// Whether every file reached its destination.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl From<RelocationReport> for RelocationSummary {
    fn from(report: RelocationReport) -> Self {
        Self {
            moved: report.moved,
            failed: report.failed,
        }
    }
}

enum FileOutcome {
    Moved(String),
    Failed(String),
}

/// Lease-guarded copy-then-delete mover.
#[derive(Clone)]
pub struct Relocator {
    store: Arc<dyn ObjectStore>,
    settings: RelocationConfig,
}

impl Relocator {
    /// Construct a relocator over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, settings: RelocationConfig) -> Self {
        Self { store, settings }
    }

    /// Destination key for a file: `container/<destination>/<file_name>`.
    #[must_use]
    pub fn destination_key(file: &BatchAttributes, destination: &str) -> String {
        format!("{}/{destination}/{}", file.container_name, file.file_name)
    }

    /// Move every file into `destination`.
    pub async fn relocate<'a, I>(&self, files: I, destination: &str) -> RelocationReport
    where
        I: IntoIterator<Item = &'a BatchAttributes>,
    {
        let outcomes = join_all(
            files
                .into_iter()
                .map(|file| self.relocate_file(file, destination)),
        )
        .await;

        let mut report = RelocationReport::default();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Moved(key) => report.moved.push(key),
                FileOutcome::Failed(key) => report.failed.push(key),
            }
        }
        report
    }

    async fn relocate_file(&self, file: &BatchAttributes, destination: &str) -> FileOutcome {
        let source = file.full_path.as_str();
        let target = Self::destination_key(file, destination);

        let lease = match self.store.acquire_lease(source, self.settings.lease).await {
            Ok(lease) => lease,
            Err(err) => {
                error!(source, error = %err, "file not moved: lease unavailable");
                return FileOutcome::Failed(source.to_string());
            }
        };

        if !self.copy_with_retry(source, &target).await {
            error!(source, destination = %target, "file not moved");
            self.release(source, &lease).await;
            return FileOutcome::Failed(source.to_string());
        }

        match self.store.delete(source, Some(&lease)).await {
            Ok(()) => {
                info!(source, destination = %target, "file relocated");
                FileOutcome::Moved(target)
            }
            Err(err) if err.is_not_found() => {
                info!(source, destination = %target, "file relocated; source already gone");
                self.release(source, &lease).await;
                FileOutcome::Moved(target)
            }
            Err(err) => {
                warn!(
                    source,
                    destination = %target,
                    error = %err,
                    "copied file but could not delete source"
                );
                self.release(source, &lease).await;
                FileOutcome::Failed(source.to_string())
            }
        }
    }

    async fn copy_with_retry(&self, source: &str, target: &str) -> bool {
        for attempt in 1..=COPY_ATTEMPTS {
            let status = self.copy_once(source, target).await;
            if status == CopyStatus::Success {
                return true;
            }
            if attempt < COPY_ATTEMPTS {
                warn!(source, destination = target, ?status, "copy failed; retrying once");
            }
        }
        false
    }

    async fn copy_once(&self, source: &str, target: &str) -> CopyStatus {
        let copy = match self.store.start_copy(source, target).await {
            Ok(copy) => copy,
            Err(err) => {
                warn!(source, destination = target, error = %err, "copy could not start");
                return CopyStatus::Failed;
            }
        };
        for _ in 0..self.settings.copy_poll_attempts {
            match self.store.copy_status(&copy).await {
                Ok(CopyStatus::Pending) => tokio::time::sleep(self.settings.copy_poll_interval).await,
                Ok(status) => return status,
                Err(err) => {
                    warn!(source, copy = %copy, error = %err, "copy status unavailable");
                    return CopyStatus::Failed;
                }
            }
        }
        warn!(source, copy = %copy, "copy still pending after polling limit");
        CopyStatus::Pending
    }

    async fn release(&self, source: &str, lease: &LeaseId) {
        if let Err(err) = self.store.release_lease(source, lease).await {
            debug!(source, error = %err, "lease release failed");
        }
    }
}

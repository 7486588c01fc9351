//! Tracker persistence and the durable host interface.
//!
//! # Design
//! - `TrackerStore` is the persistence seam: insert-if-absent, load, and
//!   version-checked save, so a crash never loses recorded arrivals.
//! - `TrackerHost` exposes the primitives a durable execution substrate offers:
//!   start a named instance, raise a named event, query status, terminate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::tracker::{BatchTrackerState, TrackerEvent, TrackerStatus, TrackerTransition};

/// Seed used to create a tracker for a previously unseen batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSeed {
    /// Batch identity; names the tracker instance.
    pub batch_prefix: String,
    /// Object-store prefix enumerating the batch.
    pub listing_prefix: String,
    /// File that triggered the tracker.
    pub file_name: String,
    /// File type of the triggering file.
    pub file_type: String,
}

/// Outcome of asking the host to start a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new tracker was created and the seed applied.
    Started(TrackerTransition),
    /// Another caller created the tracker first.
    AlreadyExists,
}

/// Durable persistence for tracker state.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Persist a new tracker; `false` when one already exists.
    async fn insert(&self, state: &BatchTrackerState) -> StoreResult<bool>;

    /// Load a tracker by batch identity.
    async fn load(&self, batch_prefix: &str) -> StoreResult<Option<BatchTrackerState>>;

    /// Replace a tracker if its stored version equals `state.version`.
    ///
    /// Returns the stored state with its bumped version, or
    /// [`StoreError::VersionConflict`] / [`StoreError::TrackerMissing`].
    async fn save(&self, state: &BatchTrackerState) -> StoreResult<BatchTrackerState>;

    /// Delete a terminated tracker whose stored version equals `version`.
    ///
    /// Returns `false` when the tracker is gone, has moved on to a newer
    /// version, or is not terminated.
    async fn remove_terminated(&self, batch_prefix: &str, version: u64) -> StoreResult<bool>;
}

/// Named-instance primitives the coordinator drives trackers through.
#[async_trait]
pub trait TrackerHost: Send + Sync {
    /// Create the tracker named by the seed and apply its first file.
    async fn start(&self, seed: TrackerSeed) -> StoreResult<StartOutcome>;

    /// Deliver an external event to a running tracker.
    async fn raise_event(
        &self,
        batch_prefix: &str,
        event: TrackerEvent,
    ) -> StoreResult<TrackerTransition>;

    /// Current status, or `None` when no tracker exists.
    async fn status(&self, batch_prefix: &str) -> StoreResult<Option<TrackerStatus>>;

    /// Forcefully terminate a tracker.
    async fn terminate(&self, batch_prefix: &str, reason: &str) -> StoreResult<()>;

    /// Move a completing tracker to `Terminated` once validation was dispatched.
    async fn complete(&self, batch_prefix: &str) -> StoreResult<()>;

    /// Drop a terminated tracker so a fresh one can take its name.
    async fn discard(&self, batch_prefix: &str) -> StoreResult<()>;
}

/// In-memory tracker store for single-process deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryTrackerStore {
    trackers: Arc<Mutex<HashMap<String, BatchTrackerState>>>,
}

impl MemoryTrackerStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackerStore for MemoryTrackerStore {
    async fn insert(&self, state: &BatchTrackerState) -> StoreResult<bool> {
        let mut trackers = self.trackers.lock().await;
        if trackers.contains_key(&state.batch_prefix) {
            return Ok(false);
        }
        let mut stored = state.clone();
        stored.version = 1;
        trackers.insert(stored.batch_prefix.clone(), stored);
        Ok(true)
    }

    async fn load(&self, batch_prefix: &str) -> StoreResult<Option<BatchTrackerState>> {
        Ok(self.trackers.lock().await.get(batch_prefix).cloned())
    }

    async fn save(&self, state: &BatchTrackerState) -> StoreResult<BatchTrackerState> {
        let mut trackers = self.trackers.lock().await;
        let current =
            trackers
                .get_mut(&state.batch_prefix)
                .ok_or_else(|| StoreError::TrackerMissing {
                    batch_prefix: state.batch_prefix.clone(),
                })?;
        if current.version != state.version {
            return Err(StoreError::VersionConflict {
                batch_prefix: state.batch_prefix.clone(),
                expected: state.version,
            });
        }
        let mut stored = state.clone();
        stored.version = state.version + 1;
        *current = stored.clone();
        Ok(stored)
    }

    async fn remove_terminated(&self, batch_prefix: &str, version: u64) -> StoreResult<bool> {
        let mut trackers = self.trackers.lock().await;
        let removable = trackers.get(batch_prefix).is_some_and(|current| {
            current.version == version && current.status == TrackerStatus::Terminated
        });
        if removable {
            trackers.remove(batch_prefix);
        }
        Ok(removable)
    }
}

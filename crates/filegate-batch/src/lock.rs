//! Dedup lock store: the per-batch record that admits at most one validation.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};

/// State of a dedup lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Claimed by the completeness side; validation not yet admitted.
    Waiting,
    /// A validation run holds the batch.
    InProgress,
    /// Validation finished (valid or not).
    Done,
}

impl LockState {
    /// Stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Parse a storage label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(Self::Waiting),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

impl Display for LockState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One dedup lock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Batch identity (unique key).
    pub batch_prefix: String,
    /// Current state.
    pub state: LockState,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Store guaranteeing at-most-once validation per batch.
///
/// Implementations must make `try_claim` and `try_admit_for_validation`
/// linearizable per key.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Insert a `Waiting` record; `false` when one already exists.
    async fn try_claim(&self, batch_prefix: &str) -> StoreResult<bool>;

    /// Swap `Waiting` to `InProgress`; `false` for any other state or no record.
    async fn try_admit_for_validation(&self, batch_prefix: &str) -> StoreResult<bool>;

    /// Set the record to `Done`.
    ///
    /// Returns [`StoreError::RecordMissing`] when no record exists.
    async fn mark_done(&self, batch_prefix: &str) -> StoreResult<()>;

    /// Return an `InProgress` record to `Waiting` so a later run can retry.
    ///
    /// Returns `false` when the record was not in progress.
    async fn release(&self, batch_prefix: &str) -> StoreResult<bool>;

    /// Read the record for a batch.
    async fn get(&self, batch_prefix: &str) -> StoreResult<Option<LockRecord>>;
}

/// In-memory lock store for single-process deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryLockStore {
    records: Arc<Mutex<HashMap<String, LockRecord>>>,
}

impl MemoryLockStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn transition(&self, batch_prefix: &str, from: LockState, to: LockState) -> bool {
        let mut records = self.records.lock().await;
        match records.get_mut(batch_prefix) {
            Some(record) if record.state == from => {
                record.state = to;
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_claim(&self, batch_prefix: &str) -> StoreResult<bool> {
        let mut records = self.records.lock().await;
        if records.contains_key(batch_prefix) {
            return Ok(false);
        }
        records.insert(
            batch_prefix.to_string(),
            LockRecord {
                batch_prefix: batch_prefix.to_string(),
                state: LockState::Waiting,
                updated_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn try_admit_for_validation(&self, batch_prefix: &str) -> StoreResult<bool> {
        Ok(self
            .transition(batch_prefix, LockState::Waiting, LockState::InProgress)
            .await)
    }

    async fn mark_done(&self, batch_prefix: &str) -> StoreResult<()> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(batch_prefix)
            .ok_or_else(|| StoreError::RecordMissing {
                batch_prefix: batch_prefix.to_string(),
            })?;
        record.state = LockState::Done;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn release(&self, batch_prefix: &str) -> StoreResult<bool> {
        Ok(self
            .transition(batch_prefix, LockState::InProgress, LockState::Waiting)
            .await)
    }

    async fn get(&self, batch_prefix: &str) -> StoreResult<Option<LockRecord>> {
        Ok(self.records.lock().await.get(batch_prefix).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;

    const PREFIX: &str = "acme_20230601_0930";

    #[tokio::test]
    async fn claim_is_insert_if_absent() -> StoreResult<()> {
        let store = MemoryLockStore::new();
        assert!(store.try_claim(PREFIX).await?);
        assert!(!store.try_claim(PREFIX).await?);
        let record = store.get(PREFIX).await?.expect("record");
        assert_eq!(record.state, LockState::Waiting);
        Ok(())
    }

    #[tokio::test]
    async fn admission_requires_waiting_record() -> StoreResult<()> {
        let store = MemoryLockStore::new();
        assert!(!store.try_admit_for_validation(PREFIX).await?);
        store.try_claim(PREFIX).await?;
        assert!(store.try_admit_for_validation(PREFIX).await?);
        assert!(!store.try_admit_for_validation(PREFIX).await?);

        assert!(store.release(PREFIX).await?);
        assert!(!store.release(PREFIX).await?);
        assert!(store.try_admit_for_validation(PREFIX).await?);

        store.mark_done(PREFIX).await?;
        assert!(!store.try_admit_for_validation(PREFIX).await?);
        assert_eq!(
            store.get(PREFIX).await?.map(|r| r.state),
            Some(LockState::Done)
        );
        Ok(())
    }

    #[tokio::test]
    async fn mark_done_reports_missing_record() {
        let store = MemoryLockStore::new();
        let err = store.mark_done(PREFIX).await.expect_err("missing record");
        assert!(matches!(err, StoreError::RecordMissing { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_see_one_winner_per_gate() -> StoreResult<()> {
        let store = MemoryLockStore::new();
        let claims = join_all((0..16).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.try_claim(PREFIX).await })
        }))
        .await;
        let claimed = claims
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(true))))
            .count();
        assert_eq!(claimed, 1);

        let admissions = join_all((0..16).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.try_admit_for_validation(PREFIX).await })
        }))
        .await;
        let admitted = admissions
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(true))))
            .count();
        assert_eq!(admitted, 1);
        Ok(())
    }

    #[test]
    fn state_labels_round_trip() {
        for state in [LockState::Waiting, LockState::InProgress, LockState::Done] {
            assert_eq!(LockState::parse(state.as_str()), Some(state));
        }
        assert_eq!(LockState::parse("locked"), None);
    }
}

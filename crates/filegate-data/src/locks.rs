//! Dedup lock records in `filegate_locks`.
//!
//! Each gate is a single statement, so Postgres row locking gives the
//! per-key linearizability the lock store contract requires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filegate_batch::{LockRecord, LockState, LockStore, StoreError, StoreResult};
use sqlx::{PgPool, Row};

const CLAIM_SQL: &str = r"
    INSERT INTO filegate_locks (batch_prefix, state, updated_at)
    VALUES ($1, 'waiting', now())
    ON CONFLICT (batch_prefix) DO NOTHING
";

const TRANSITION_SQL: &str = r"
    UPDATE filegate_locks
    SET state = $3, updated_at = now()
    WHERE batch_prefix = $1 AND state = $2
";

const MARK_DONE_SQL: &str = r"
    UPDATE filegate_locks
    SET state = 'done', updated_at = now()
    WHERE batch_prefix = $1
";

const SELECT_SQL: &str = r"
    SELECT state, updated_at FROM filegate_locks WHERE batch_prefix = $1
";

/// Lock store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgLockStore {
    pool: PgPool,
}

impl PgLockStore {
    /// Construct a store over an already migrated pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition(
        &self,
        operation: &'static str,
        batch_prefix: &str,
        from: LockState,
        to: LockState,
    ) -> StoreResult<bool> {
        let result = sqlx::query(TRANSITION_SQL)
            .bind(batch_prefix)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend(operation, err))?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn try_claim(&self, batch_prefix: &str) -> StoreResult<bool> {
        let result = sqlx::query(CLAIM_SQL)
            .bind(batch_prefix)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("lock.claim", err))?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_admit_for_validation(&self, batch_prefix: &str) -> StoreResult<bool> {
        self.transition(
            "lock.admit",
            batch_prefix,
            LockState::Waiting,
            LockState::InProgress,
        )
        .await
    }

    async fn mark_done(&self, batch_prefix: &str) -> StoreResult<()> {
        let result = sqlx::query(MARK_DONE_SQL)
            .bind(batch_prefix)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("lock.mark_done", err))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RecordMissing {
                batch_prefix: batch_prefix.to_string(),
            });
        }
        Ok(())
    }

    async fn release(&self, batch_prefix: &str) -> StoreResult<bool> {
        self.transition(
            "lock.release",
            batch_prefix,
            LockState::InProgress,
            LockState::Waiting,
        )
        .await
    }

    async fn get(&self, batch_prefix: &str) -> StoreResult<Option<LockRecord>> {
        let row = sqlx::query(SELECT_SQL)
            .bind(batch_prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::backend("lock.get", err))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let state: String = row
            .try_get("state")
            .map_err(|err| StoreError::backend("lock.get.state", err))?;
        let updated_at: DateTime<Utc> = row
            .try_get("updated_at")
            .map_err(|err| StoreError::backend("lock.get.updated_at", err))?;
        let state = LockState::parse(&state).ok_or(StoreError::InvalidValue {
            field: "state",
            value: state,
        })?;
        Ok(Some(LockRecord {
            batch_prefix: batch_prefix.to_string(),
            state,
            updated_at,
        }))
    }
}

//! Batch tracker state in `filegate_trackers`.
//!
//! # Design
//! - `insert` is insert-if-absent; the primary key arbitrates concurrent starts.
//! - `save` is a compare-and-swap on `version`; a zero-row update is resolved
//!   into a conflict or a missing tracker with one follow-up read.
//! - `remove_terminated` deletes only the exact terminated version it was given.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filegate_batch::{BatchTrackerState, StoreError, StoreResult, TrackerStatus, TrackerStore};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const INSERT_SQL: &str = r"
    INSERT INTO filegate_trackers (
        batch_prefix, listing_prefix, received_file_types, status, version, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, 1, $5, $6)
    ON CONFLICT (batch_prefix) DO NOTHING
";

const SELECT_SQL: &str = r"
    SELECT batch_prefix, listing_prefix, received_file_types, status, version, created_at, updated_at
    FROM filegate_trackers
    WHERE batch_prefix = $1
";

const SAVE_SQL: &str = r"
    UPDATE filegate_trackers
    SET listing_prefix = $2,
        received_file_types = $3,
        status = $4,
        updated_at = $5,
        version = version + 1
    WHERE batch_prefix = $1 AND version = $6
    RETURNING version
";

const EXISTS_SQL: &str = r"SELECT 1 FROM filegate_trackers WHERE batch_prefix = $1";

const DELETE_TERMINATED_SQL: &str = r"
    DELETE FROM filegate_trackers
    WHERE batch_prefix = $1 AND version = $2 AND status = $3
";

/// Tracker store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgTrackerStore {
    pool: PgPool,
}

impl PgTrackerStore {
    /// Construct a store over an already migrated pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn received(state: &BatchTrackerState) -> Vec<String> {
    state.received_file_types.iter().cloned().collect()
}

fn to_db_version(batch_prefix: &str, version: u64) -> StoreResult<i64> {
    i64::try_from(version).map_err(|_| StoreError::InvalidValue {
        field: "version",
        value: format!("{batch_prefix}:{version}"),
    })
}

fn from_db_version(version: i64) -> StoreResult<u64> {
    u64::try_from(version).map_err(|_| StoreError::InvalidValue {
        field: "version",
        value: version.to_string(),
    })
}

fn decode(row: &PgRow) -> StoreResult<BatchTrackerState> {
    let get_err = |err: sqlx::Error| StoreError::backend("tracker.decode", err);
    let status: String = row.try_get("status").map_err(get_err)?;
    let types: Vec<String> = row.try_get("received_file_types").map_err(get_err)?;
    let version: i64 = row.try_get("version").map_err(get_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(get_err)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(get_err)?;
    Ok(BatchTrackerState {
        batch_prefix: row.try_get("batch_prefix").map_err(get_err)?,
        listing_prefix: row.try_get("listing_prefix").map_err(get_err)?,
        received_file_types: types.into_iter().collect::<BTreeSet<_>>(),
        status: TrackerStatus::parse(&status).ok_or(StoreError::InvalidValue {
            field: "status",
            value: status,
        })?,
        version: from_db_version(version)?,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl TrackerStore for PgTrackerStore {
    async fn insert(&self, state: &BatchTrackerState) -> StoreResult<bool> {
        let result = sqlx::query(INSERT_SQL)
            .bind(&state.batch_prefix)
            .bind(&state.listing_prefix)
            .bind(received(state))
            .bind(state.status.as_str())
            .bind(state.created_at)
            .bind(state.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("tracker.insert", err))?;
        Ok(result.rows_affected() == 1)
    }

    async fn load(&self, batch_prefix: &str) -> StoreResult<Option<BatchTrackerState>> {
        let row = sqlx::query(SELECT_SQL)
            .bind(batch_prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::backend("tracker.load", err))?;
        row.as_ref().map(decode).transpose()
    }

    async fn save(&self, state: &BatchTrackerState) -> StoreResult<BatchTrackerState> {
        let expected = to_db_version(&state.batch_prefix, state.version)?;
        let row = sqlx::query(SAVE_SQL)
            .bind(&state.batch_prefix)
            .bind(&state.listing_prefix)
            .bind(received(state))
            .bind(state.status.as_str())
            .bind(state.updated_at)
            .bind(expected)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::backend("tracker.save", err))?;

        if let Some(row) = row {
            let version: i64 = row
                .try_get("version")
                .map_err(|err| StoreError::backend("tracker.save.version", err))?;
            let mut stored = state.clone();
            stored.version = from_db_version(version)?;
            return Ok(stored);
        }

        let exists = sqlx::query(EXISTS_SQL)
            .bind(&state.batch_prefix)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StoreError::backend("tracker.save.exists", err))?
            .is_some();
        if exists {
            Err(StoreError::VersionConflict {
                batch_prefix: state.batch_prefix.clone(),
                expected: state.version,
            })
        } else {
            Err(StoreError::TrackerMissing {
                batch_prefix: state.batch_prefix.clone(),
            })
        }
    }

    async fn remove_terminated(&self, batch_prefix: &str, version: u64) -> StoreResult<bool> {
        let expected = to_db_version(batch_prefix, version)?;
        let result = sqlx::query(DELETE_TERMINATED_SQL)
            .bind(batch_prefix)
            .bind(expected)
            .bind(TrackerStatus::Terminated.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| StoreError::backend("tracker.remove", err))?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_outside_bigint_are_rejected() {
        assert!(to_db_version("acme_20230601_0930", u64::MAX).is_err());
        assert_eq!(to_db_version("acme_20230601_0930", 7).ok(), Some(7));
        assert!(from_db_version(-1).is_err());
    }
}

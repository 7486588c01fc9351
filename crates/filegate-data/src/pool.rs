//! Connection pool and schema migrations.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::error::{DataError, Result};
use crate::locks::PgLockStore;
use crate::trackers::PgTrackerStore;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Migrated database handing out the lock and tracker stores.
#[derive(Clone)]
pub struct FilegateDatabase {
    pool: PgPool,
}

impl FilegateDatabase {
    /// Connect to `url` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await
            .map_err(|source| DataError::ConnectFailed { source })?;
        Self::new(pool).await
    }

    /// Wrap an existing pool, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        info!("filegate migrations applied");
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Dedup lock store over this database.
    #[must_use]
    pub fn locks(&self) -> PgLockStore {
        PgLockStore::new(self.pool.clone())
    }

    /// Tracker store over this database.
    #[must_use]
    pub fn trackers(&self) -> PgTrackerStore {
        PgTrackerStore::new(self.pool.clone())
    }
}

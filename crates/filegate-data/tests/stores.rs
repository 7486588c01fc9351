use std::future::Future;

use anyhow::{Context, Result};
use filegate_batch::{
    BatchTrackerState, FileTypeRegistry, LockState, LockStore, StoreError, TrackerStatus,
    TrackerStore,
};
use filegate_data::FilegateDatabase;
use filegate_test_support::postgres;
use futures_util::future::join_all;

const PREFIX: &str = "acme_20230601_0930";

async fn with_database<F, Fut>(test: F) -> Result<()>
where
    F: FnOnce(FilegateDatabase) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let Some(database) = postgres::provision()? else {
        eprintln!(
            "skipping postgres store tests: {} not set",
            postgres::TEST_DATABASE_URL_ENV
        );
        return Ok(());
    };
    let db = FilegateDatabase::connect(database.connection_string())
        .await
        .context("failed to open test database")?;
    let result = test(db.clone()).await;
    db.pool().close().await;
    drop(database);
    result
}

#[tokio::test]
async fn lock_gates_admit_exactly_once() -> Result<()> {
    with_database(|db| async move {
        let locks = db.locks();
        assert!(!locks.try_admit_for_validation(PREFIX).await?);

        let claims = join_all((0..8).map(|_| {
            let locks = locks.clone();
            async move { locks.try_claim(PREFIX).await }
        }))
        .await;
        let winners = claims.into_iter().filter(|r| matches!(r, Ok(true))).count();
        assert_eq!(winners, 1);

        let admissions = join_all((0..8).map(|_| {
            let locks = locks.clone();
            async move { locks.try_admit_for_validation(PREFIX).await }
        }))
        .await;
        let admitted = admissions
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();
        assert_eq!(admitted, 1);

        assert!(locks.release(PREFIX).await?);
        assert!(locks.try_admit_for_validation(PREFIX).await?);
        locks.mark_done(PREFIX).await?;
        let record = locks.get(PREFIX).await?.context("lock record")?;
        assert_eq!(record.state, LockState::Done);

        let missing = locks.mark_done("globex_20230601_0930").await;
        assert!(matches!(missing, Err(StoreError::RecordMissing { .. })));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn tracker_saves_are_version_checked() -> Result<()> {
    with_database(|db| async move {
        let trackers = db.trackers();
        let registry = FileTypeRegistry::default();
        let (state, _) = BatchTrackerState::start(
            PREFIX,
            "acme/inbound/acme_20230601_0930",
            "type1",
            &registry,
        );
        assert!(trackers.insert(&state).await?);
        assert!(!trackers.insert(&state).await?);

        let mut loaded = trackers.load(PREFIX).await?.context("tracker")?;
        assert_eq!(loaded.version, 1);
        assert!(loaded.received_file_types.contains("type1"));

        let stale = loaded.clone();
        loaded.observe("type2", &registry);
        let saved = trackers.save(&loaded).await?;
        assert_eq!(saved.version, 2);

        let conflict = trackers.save(&stale).await;
        assert!(matches!(
            conflict,
            Err(StoreError::VersionConflict { expected: 1, .. })
        ));

        let mut terminal = saved;
        terminal.terminate();
        let terminal = trackers.save(&terminal).await?;
        let reloaded = trackers.load(PREFIX).await?.context("tracker")?;
        assert_eq!(reloaded.status, TrackerStatus::Terminated);
        assert_eq!(reloaded.version, terminal.version);
        assert_eq!(reloaded.received_file_types.len(), 2);

        assert!(
            !trackers
                .remove_terminated(PREFIX, terminal.version - 1)
                .await?
        );
        assert!(trackers.remove_terminated(PREFIX, terminal.version).await?);
        assert!(matches!(
            trackers.save(&terminal).await,
            Err(StoreError::TrackerMissing { .. })
        ));
        assert!(trackers.load(PREFIX).await?.is_none());
        Ok(())
    })
    .await
}

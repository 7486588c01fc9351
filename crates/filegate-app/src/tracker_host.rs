//! Durable tracker host over a [`TrackerStore`].
//!
//! # Design
//! - Every mutation is load, apply, version-checked save; conflicts reload and
//!   retry up to [`MAX_SAVE_ATTEMPTS`] times.
//! - Arrivals that change nothing (duplicates, unexpected types, closed
//!   trackers) are answered without a write.
//! - Discard deletes only the terminated version it observed, so a tracker
//!   started under the same name in the meantime survives.

use std::sync::Arc;

use async_trait::async_trait;
use filegate_batch::{
    BatchTrackerState, FileTypeRegistry, StartOutcome, StoreError, StoreResult, TrackerEvent,
    TrackerHost, TrackerSeed, TrackerStatus, TrackerStore, TrackerTransition,
};
use tracing::{debug, info, warn};

/// Attempts made before a contended save is reported.
pub const MAX_SAVE_ATTEMPTS: u32 = 16;

/// Tracker host persisting every state change through a [`TrackerStore`].
#[derive(Clone)]
pub struct DurableTrackerHost {
    store: Arc<dyn TrackerStore>,
    registry: Arc<FileTypeRegistry>,
}

impl DurableTrackerHost {
    /// Construct a host over `store`, judging completeness with `registry`.
    #[must_use]
    pub fn new(store: Arc<dyn TrackerStore>, registry: Arc<FileTypeRegistry>) -> Self {
        Self { store, registry }
    }

    async fn load_required(&self, batch_prefix: &str) -> StoreResult<BatchTrackerState> {
        self.store
            .load(batch_prefix)
            .await?
            .ok_or_else(|| StoreError::TrackerMissing {
                batch_prefix: batch_prefix.to_string(),
            })
    }

    /// Apply `mutate` under optimistic concurrency.
    ///
    /// `mutate` returns its result and whether the state changed.
    async fn update<T, F>(&self, batch_prefix: &str, mut mutate: F) -> StoreResult<T>
    where
        F: FnMut(&mut BatchTrackerState) -> (T, bool) + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut state = self.load_required(batch_prefix).await?;
            let (result, changed) = mutate(&mut state);
            if !changed {
                return Ok(result);
            }
            match self.store.save(&state).await {
                Ok(_) => return Ok(result),
                Err(StoreError::VersionConflict { .. }) if attempt < MAX_SAVE_ATTEMPTS => {
                    debug!(batch_prefix, attempt, "tracker save conflicted; reloading");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl TrackerHost for DurableTrackerHost {
    async fn start(&self, seed: TrackerSeed) -> StoreResult<StartOutcome> {
        let (state, transition) = BatchTrackerState::start(
            seed.batch_prefix.as_str(),
            seed.listing_prefix.as_str(),
            &seed.file_type,
            &self.registry,
        );
        if !self.store.insert(&state).await? {
            return Ok(StartOutcome::AlreadyExists);
        }
        info!(
            batch_prefix = %seed.batch_prefix,
            file_name = %seed.file_name,
            "tracker started"
        );
        Ok(StartOutcome::Started(transition))
    }

    async fn raise_event(
        &self,
        batch_prefix: &str,
        event: TrackerEvent,
    ) -> StoreResult<TrackerTransition> {
        let TrackerEvent::NewFile {
            file_name,
            file_type,
        } = &event;
        debug!(batch_prefix, event = event.name(), file_name = %file_name, "raising tracker event");
        let registry = Arc::clone(&self.registry);
        self.update(batch_prefix, move |state| {
            let transition = state.observe(file_type, &registry);
            let changed = matches!(
                transition,
                TrackerTransition::Waiting { .. } | TrackerTransition::Completed
            );
            (transition, changed)
        })
        .await
    }

    async fn status(&self, batch_prefix: &str) -> StoreResult<Option<TrackerStatus>> {
        Ok(self
            .store
            .load(batch_prefix)
            .await?
            .map(|state| state.status))
    }

    async fn terminate(&self, batch_prefix: &str, reason: &str) -> StoreResult<()> {
        let result = self
            .update(batch_prefix, |state| {
                let changed = state.status != TrackerStatus::Terminated;
                state.terminate();
                ((), changed)
            })
            .await;
        match result {
            Ok(()) => {
                warn!(batch_prefix, reason, "tracker terminated");
                Ok(())
            }
            Err(StoreError::TrackerMissing { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn complete(&self, batch_prefix: &str) -> StoreResult<()> {
        self.update(batch_prefix, |state| ((), state.finish()))
            .await
    }

    async fn discard(&self, batch_prefix: &str) -> StoreResult<()> {
        match self.store.load(batch_prefix).await? {
            Some(state) if state.status == TrackerStatus::Terminated => {
                if self
                    .store
                    .remove_terminated(batch_prefix, state.version)
                    .await?
                {
                    debug!(batch_prefix, "terminated tracker discarded");
                } else {
                    debug!(batch_prefix, "tracker replaced before discard; kept");
                }
                Ok(())
            }
            Some(state) => {
                debug!(batch_prefix, status = %state.status, "tracker still live; not discarded");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filegate_batch::MemoryTrackerStore;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    const PREFIX: &str = "acme_20230601_0930";
    const TYPES: [&str; 9] = [
        "type1", "type2", "type3", "type4", "type5", "type7", "type8", "type9", "type10",
    ];

    fn host() -> DurableTrackerHost {
        DurableTrackerHost::new(
            Arc::new(MemoryTrackerStore::new()),
            Arc::new(FileTypeRegistry::default()),
        )
    }

    fn seed(file_type: &str) -> TrackerSeed {
        TrackerSeed {
            batch_prefix: PREFIX.into(),
            listing_prefix: format!("acme/inbound/{PREFIX}"),
            file_name: format!("{PREFIX}_{file_type}.csv"),
            file_type: file_type.into(),
        }
    }

    fn new_file(file_type: &str) -> TrackerEvent {
        TrackerEvent::NewFile {
            file_name: format!("{PREFIX}_{file_type}.csv"),
            file_type: file_type.into(),
        }
    }

    #[tokio::test]
    async fn start_is_exclusive() -> StoreResult<()> {
        let host = host();
        assert!(matches!(
            host.start(seed("type1")).await?,
            StartOutcome::Started(TrackerTransition::Waiting { .. })
        ));
        assert_eq!(host.start(seed("type2")).await?, StartOutcome::AlreadyExists);
        assert_eq!(host.status(PREFIX).await?, Some(TrackerStatus::Waiting));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_arrivals_complete_exactly_once() -> StoreResult<()> {
        let host = host();
        host.start(seed(TYPES[0])).await?;
        let results = join_all(TYPES[1..].iter().flat_map(|t| [*t, *t]).map(|file_type| {
            let host = host.clone();
            tokio::spawn(async move { host.raise_event(PREFIX, new_file(file_type)).await })
        }))
        .await;
        let completions = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(TrackerTransition::Completed))))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(host.status(PREFIX).await?, Some(TrackerStatus::Completing));

        host.complete(PREFIX).await?;
        assert_eq!(host.status(PREFIX).await?, Some(TrackerStatus::Terminated));
        Ok(())
    }

    #[tokio::test]
    async fn terminate_and_discard_free_the_name() -> StoreResult<()> {
        let host = host();
        host.start(seed("type1")).await?;
        host.discard(PREFIX).await?;
        assert_eq!(host.status(PREFIX).await?, Some(TrackerStatus::Waiting));

        host.terminate(PREFIX, "bounce").await?;
        host.terminate(PREFIX, "bounce").await?;
        host.discard(PREFIX).await?;
        assert_eq!(host.status(PREFIX).await?, None);
        host.terminate(PREFIX, "bounce").await?;

        let err = host
            .raise_event(PREFIX, new_file("type2"))
            .await
            .expect_err("no tracker");
        assert!(matches!(err, StoreError::TrackerMissing { .. }));
        Ok(())
    }

    /// Parks the first removal until released.
    #[derive(Default)]
    struct GatedRemovals {
        inner: MemoryTrackerStore,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TrackerStore for GatedRemovals {
        async fn insert(&self, state: &BatchTrackerState) -> StoreResult<bool> {
            self.inner.insert(state).await
        }

        async fn load(&self, batch_prefix: &str) -> StoreResult<Option<BatchTrackerState>> {
            self.inner.load(batch_prefix).await
        }

        async fn save(&self, state: &BatchTrackerState) -> StoreResult<BatchTrackerState> {
            self.inner.save(state).await
        }

        async fn remove_terminated(&self, batch_prefix: &str, version: u64) -> StoreResult<bool> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.remove_terminated(batch_prefix, version).await
        }
    }

    #[tokio::test]
    async fn stale_discard_keeps_a_restarted_tracker() -> StoreResult<()> {
        let store = Arc::new(GatedRemovals::default());
        let host = DurableTrackerHost::new(store.clone(), Arc::new(FileTypeRegistry::default()));
        host.start(seed("type1")).await?;
        host.terminate(PREFIX, "bounce").await?;

        store.armed.store(true, Ordering::SeqCst);
        let stale = tokio::spawn({
            let host = host.clone();
            async move { host.discard(PREFIX).await }
        });
        store.entered.notified().await;

        host.discard(PREFIX).await?;
        assert_eq!(host.status(PREFIX).await?, None);
        assert!(matches!(
            host.start(seed("type2")).await?,
            StartOutcome::Started(_)
        ));

        store.release.notify_one();
        stale.await.expect("discard task")?;

        assert_eq!(host.status(PREFIX).await?, Some(TrackerStatus::Waiting));
        let state = store.inner.load(PREFIX).await?.expect("restarted tracker");
        assert!(state.received_file_types.contains("type2"));
        assert!(!state.received_file_types.contains("type1"));
        Ok(())
    }
}

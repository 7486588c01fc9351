//! Routes upload notifications to per-batch trackers and dispatches complete
//! batches exactly once.
//!
//! # Design
//! - The tracker host decides completeness; the lock store's claim decides who
//!   dispatches. A denied claim ends the notification quietly.
//! - A tracker found in a non-waiting state is bounced: terminated, discarded,
//!   and restarted with the triggering file as its seed.
//! - Lost start races loop back to the status query, bounded by
//!   [`MAX_ROUTE_ATTEMPTS`].

use std::sync::Arc;

use async_trait::async_trait;
use filegate_batch::{
    AttributeError, BatchAttributes, BatchKeyParser, FileTypeRegistry, LockStore,
    NotificationOutcome, PipelineError, PipelineResult, StartOutcome, StoreError, TrackerEvent,
    TrackerHost, TrackerSeed, TrackerStatus, TrackerTransition, UploadCoordinator,
    UploadNotification, ValidationRequest,
};
use filegate_events::{Event, EventBus};
use filegate_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::activation::Activator;

/// Status/start/raise cycles attempted before giving up on a contended batch.
pub const MAX_ROUTE_ATTEMPTS: u32 = 4;

const BOUNCE_REASON: &str = "bounce";

/// Coordinates upload notifications.
#[derive(Clone)]
pub struct Coordinator {
    parser: BatchKeyParser,
    registry: Arc<FileTypeRegistry>,
    host: Arc<dyn TrackerHost>,
    locks: Arc<dyn LockStore>,
    activator: Arc<dyn Activator>,
    events: EventBus,
    metrics: Metrics,
}

impl Coordinator {
    /// Construct a coordinator.
    #[must_use]
    pub fn new(
        parser: BatchKeyParser,
        registry: Arc<FileTypeRegistry>,
        host: Arc<dyn TrackerHost>,
        locks: Arc<dyn LockStore>,
        activator: Arc<dyn Activator>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            parser,
            registry,
            host,
            locks,
            activator,
            events,
            metrics,
        }
    }

    async fn route(&self, file: &BatchAttributes) -> PipelineResult<NotificationOutcome> {
        let transition = self.record_arrival(file).await?;
        let batch_prefix = file.batch_prefix.clone();
        match transition {
            TrackerTransition::Waiting { missing } => {
                self.events.publish(Event::FileArrived {
                    batch_prefix: batch_prefix.clone(),
                    file_type: file.file_type.clone(),
                    missing: missing.clone(),
                });
                info!(
                    batch_prefix = %batch_prefix,
                    file_type = %file.file_type,
                    missing = missing.len(),
                    "file recorded; batch incomplete"
                );
                Ok(NotificationOutcome::Waiting {
                    batch_prefix,
                    missing,
                })
            }
            TrackerTransition::Completed => self.dispatch(file).await,
            TrackerTransition::Duplicate
            | TrackerTransition::Unexpected { .. }
            | TrackerTransition::Rejected { .. } => {
                debug!(
                    batch_prefix = %batch_prefix,
                    file_type = %file.file_type,
                    ?transition,
                    "arrival changed nothing"
                );
                Ok(NotificationOutcome::Duplicate { batch_prefix })
            }
        }
    }

    async fn record_arrival(&self, file: &BatchAttributes) -> PipelineResult<TrackerTransition> {
        let batch_prefix = file.batch_prefix.as_str();
        for _ in 0..MAX_ROUTE_ATTEMPTS {
            let status = self
                .host
                .status(batch_prefix)
                .await
                .map_err(|err| PipelineError::store("tracker.status", err))?;
            match status {
                None => {
                    let seed = TrackerSeed {
                        batch_prefix: batch_prefix.to_string(),
                        listing_prefix: file.listing_prefix(),
                        file_name: file.file_name.clone(),
                        file_type: file.file_type.clone(),
                    };
                    match self
                        .host
                        .start(seed)
                        .await
                        .map_err(|err| PipelineError::store("tracker.start", err))?
                    {
                        StartOutcome::Started(transition) => {
                            self.events.publish(Event::TrackerStarted {
                                batch_prefix: batch_prefix.to_string(),
                                file_type: file.file_type.clone(),
                            });
                            return Ok(transition);
                        }
                        StartOutcome::AlreadyExists => {
                            debug!(batch_prefix, "lost tracker start race; retrying");
                        }
                    }
                }
                Some(TrackerStatus::Waiting) => {
                    let event = TrackerEvent::NewFile {
                        file_name: file.file_name.clone(),
                        file_type: file.file_type.clone(),
                    };
                    match self.host.raise_event(batch_prefix, event).await {
                        Ok(transition) => return Ok(transition),
                        Err(StoreError::TrackerMissing { .. }) => {
                            debug!(batch_prefix, "tracker vanished before event; retrying");
                        }
                        Err(err) => return Err(PipelineError::store("tracker.raise_event", err)),
                    }
                }
                Some(status) => self.bounce(batch_prefix, status).await?,
            }
        }
        Err(PipelineError::Contention {
            batch_prefix: batch_prefix.to_string(),
            attempts: MAX_ROUTE_ATTEMPTS,
        })
    }

    async fn bounce(&self, batch_prefix: &str, status: TrackerStatus) -> PipelineResult<()> {
        if status != TrackerStatus::Terminated {
            self.host
                .terminate(batch_prefix, BOUNCE_REASON)
                .await
                .map_err(|err| PipelineError::store("tracker.terminate", err))?;
        }
        self.host
            .discard(batch_prefix)
            .await
            .map_err(|err| PipelineError::store("tracker.discard", err))?;
        warn!(batch_prefix, previous_status = %status, "tracker bounced; restarting");
        self.events.publish(Event::TrackerBounced {
            batch_prefix: batch_prefix.to_string(),
            previous_status: status.to_string(),
        });
        Ok(())
    }

    async fn dispatch(&self, file: &BatchAttributes) -> PipelineResult<NotificationOutcome> {
        let batch_prefix = file.batch_prefix.clone();
        self.metrics.inc_batch_completed();
        self.events.publish(Event::BatchCompleted {
            batch_prefix: batch_prefix.clone(),
        });

        let claimed = self
            .locks
            .try_claim(&batch_prefix)
            .await
            .map_err(|err| PipelineError::store("lock.claim", err))?;
        if !claimed {
            info!(batch_prefix = %batch_prefix, "batch already claimed; not dispatching");
            self.metrics.inc_claim_denied();
            self.events.publish(Event::ClaimDenied {
                batch_prefix: batch_prefix.clone(),
            });
            return Ok(NotificationOutcome::ClaimDenied { batch_prefix });
        }

        info!(batch_prefix = %batch_prefix, "batch complete; dispatching validation");
        let request = ValidationRequest {
            prefix: file.listing_prefix(),
            file_types: self.registry.expected().clone(),
        };
        let activation = self.activator.activate(request).await;

        if let Err(err) = self.host.complete(&batch_prefix).await {
            warn!(batch_prefix = %batch_prefix, error = %err, "tracker could not be closed");
        }
        Ok(NotificationOutcome::Activated(activation?))
    }
}

fn ignore_reason(err: &AttributeError) -> &'static str {
    match *err {
        AttributeError::MalformedPath { reason, .. } => reason,
        AttributeError::MalformedName { .. } => "malformed_name",
        AttributeError::InvalidTimestamp { .. } => "invalid_timestamp",
        AttributeError::Pattern { .. } => "pattern",
        AttributeError::ContainerMismatch { .. } => "container_mismatch",
    }
}

#[async_trait]
impl UploadCoordinator for Coordinator {
    async fn handle(&self, notification: UploadNotification) -> PipelineResult<NotificationOutcome> {
        let outcome = match self.parser.parse(&notification) {
            Ok(None) => {
                debug!(path = %notification.path, "notification not applicable");
                Ok(NotificationOutcome::NotApplicable)
            }
            Ok(Some(file)) => self.route(&file).await,
            Err(err) if err.is_policy_violation() => {
                warn!(path = %notification.path, error = %err, "upload violates ingestion policy");
                Err(PipelineError::Policy { source: err })
            }
            Err(err) => {
                warn!(path = %notification.path, error = %err, "malformed upload ignored");
                Ok(NotificationOutcome::Ignored {
                    reason: ignore_reason(&err).to_string(),
                })
            }
        };
        match &outcome {
            Ok(outcome) => self.metrics.inc_notification(outcome.label()),
            Err(_) => self.metrics.inc_notification("error"),
        }
        outcome
    }

    async fn tracker_status(&self, batch_prefix: &str) -> PipelineResult<Option<TrackerStatus>> {
        self.host
            .status(batch_prefix)
            .await
            .map_err(|err| PipelineError::store("tracker.status", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker_host::DurableTrackerHost;
    use anyhow::{Result, anyhow};
    use filegate_batch::{ActivationOutcome, MemoryLockStore, MemoryTrackerStore, ValidationOutcome};
    use std::sync::Mutex;

    const PREFIX: &str = "acme_20230601_0930";
    const ALL: [&str; 9] = [
        "type1", "type2", "type3", "type4", "type5", "type7", "type8", "type9", "type10",
    ];

    #[derive(Default)]
    struct RecordingActivator {
        requests: Mutex<Vec<ValidationRequest>>,
    }

    impl RecordingActivator {
        fn sent(&self) -> Result<Vec<ValidationRequest>> {
            self.requests
                .lock()
                .map(|requests| requests.clone())
                .map_err(|_| anyhow!("activator mutex poisoned"))
        }
    }

    #[async_trait]
    impl Activator for RecordingActivator {
        async fn activate(&self, request: ValidationRequest) -> PipelineResult<ActivationOutcome> {
            let batch_prefix = request.batch_prefix().to_string();
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            Ok(ActivationOutcome::Completed(ValidationOutcome::Skipped {
                batch_prefix,
            }))
        }
    }

    struct Harness {
        coordinator: Coordinator,
        activator: Arc<RecordingActivator>,
        host: Arc<DurableTrackerHost>,
        locks: MemoryLockStore,
        metrics: Metrics,
    }

    fn harness() -> Result<Harness> {
        let registry = Arc::new(FileTypeRegistry::default());
        let host = Arc::new(DurableTrackerHost::new(
            Arc::new(MemoryTrackerStore::new()),
            Arc::clone(&registry),
        ));
        let locks = MemoryLockStore::new();
        let activator = Arc::new(RecordingActivator::default());
        let metrics = Metrics::new()?;
        let coordinator = Coordinator::new(
            BatchKeyParser::new()?,
            registry,
            host.clone(),
            Arc::new(locks.clone()),
            activator.clone(),
            EventBus::new(),
            metrics.clone(),
        );
        Ok(Harness {
            coordinator,
            activator,
            host,
            locks,
            metrics,
        })
    }

    fn upload(file_type: &str) -> UploadNotification {
        UploadNotification::new(
            format!("https://store.example/acme/inbound/{PREFIX}_{file_type}.csv"),
            "text/csv",
        )
    }

    #[tokio::test]
    async fn complete_batch_dispatches_once() -> Result<()> {
        let harness = harness()?;
        for file_type in &ALL[..8] {
            let outcome = harness.coordinator.handle(upload(file_type)).await?;
            assert!(matches!(outcome, NotificationOutcome::Waiting { .. }));
        }
        let outcome = harness.coordinator.handle(upload("type9")).await?;
        assert!(matches!(
            outcome,
            NotificationOutcome::Activated(ActivationOutcome::Completed(_))
        ));

        let sent = harness.activator.sent()?;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].prefix, format!("acme/inbound/{PREFIX}"));
        assert_eq!(sent[0].file_types.len(), 9);
        assert_eq!(
            harness.coordinator.tracker_status(PREFIX).await?,
            Some(TrackerStatus::Terminated)
        );
        assert_eq!(harness.metrics.snapshot().batches_completed_total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_and_unexpected_files_change_nothing() -> Result<()> {
        let harness = harness()?;
        harness.coordinator.handle(upload("type1")).await?;
        let duplicate = harness.coordinator.handle(upload("type1")).await?;
        assert!(matches!(duplicate, NotificationOutcome::Duplicate { .. }));
        let unexpected = harness.coordinator.handle(upload("type6")).await?;
        assert!(matches!(unexpected, NotificationOutcome::Duplicate { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn redelivered_batch_is_claim_denied() -> Result<()> {
        let harness = harness()?;
        for file_type in ALL {
            harness.coordinator.handle(upload(file_type)).await?;
        }
        // The terminated tracker is bounced and the batch completes again, but
        // the claim is already taken.
        let mut last = NotificationOutcome::NotApplicable;
        for file_type in ALL {
            last = harness.coordinator.handle(upload(file_type)).await?;
        }
        assert_eq!(
            last,
            NotificationOutcome::ClaimDenied {
                batch_prefix: PREFIX.into()
            }
        );
        assert_eq!(harness.activator.sent()?.len(), 1);
        assert_eq!(harness.metrics.snapshot().claims_denied_total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn completing_tracker_is_bounced_and_reseeded() -> Result<()> {
        let harness = harness()?;
        harness
            .host
            .start(TrackerSeed {
                batch_prefix: PREFIX.into(),
                listing_prefix: format!("acme/inbound/{PREFIX}"),
                file_name: format!("{PREFIX}_type1.csv"),
                file_type: "type1".into(),
            })
            .await?;
        for file_type in &ALL[1..] {
            let event = TrackerEvent::NewFile {
                file_name: format!("{PREFIX}_{file_type}.csv"),
                file_type: (*file_type).to_string(),
            };
            harness.host.raise_event(PREFIX, event).await?;
        }
        assert_eq!(
            harness.coordinator.tracker_status(PREFIX).await?,
            Some(TrackerStatus::Completing)
        );

        let outcome = harness.coordinator.handle(upload("type3")).await?;
        let NotificationOutcome::Waiting { missing, .. } = outcome else {
            return Err(anyhow!("expected a reseeded tracker, got {outcome:?}"));
        };
        assert_eq!(missing.len(), 8);
        assert!(!missing.contains(&"type3".to_string()));
        assert!(harness.locks.get(PREFIX).await?.is_none());
        assert!(harness.activator.sent()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn parse_failures_are_classified() -> Result<()> {
        let harness = harness()?;
        let not_csv = UploadNotification::new(format!("acme/inbound/{PREFIX}_type1.csv"), "text/plain");
        assert_eq!(
            harness.coordinator.handle(not_csv).await?,
            NotificationOutcome::NotApplicable
        );

        let malformed = UploadNotification::new("acme/inbound/readme.csv", "text/csv");
        assert_eq!(
            harness.coordinator.handle(malformed).await?,
            NotificationOutcome::Ignored {
                reason: "malformed_name".into()
            }
        );

        let foreign =
            UploadNotification::new("acme/inbound/globex_20230601_0930_type1.csv", "text/csv");
        let err = harness
            .coordinator
            .handle(foreign)
            .await
            .expect_err("policy violation");
        assert!(matches!(err, PipelineError::Policy { .. }));
        assert!(harness.coordinator.tracker_status("globex_20230601_0930").await?.is_none());
        Ok(())
    }
}

//! Validation run for a claimed batch.
//!
//! # Design
//! - The lock store's admission gate guarantees at most one run per batch;
//!   a refused run is reported as skipped.
//! - Structural errors accumulate across files; configuration and storage
//!   failures abort the run and return the lock to `waiting`.
//! - The lock is marked done before relocation, so a relocation failure never
//!   re-opens a batch whose contents may already be partly moved.
//! - Only requested, expected types are validated, but every file of the batch
//!   still under the prefix moves with the outcome.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use filegate_batch::{
    BatchAttributes, BatchKeyParser, BatchValidator, FileTypeRegistry, LockStore, PipelineError,
    PipelineResult, StoreError, ValidationOutcome, ValidationReport, ValidationRequest,
    ValidationResult,
};
use filegate_config::DestinationConfig;
use filegate_events::{Event, EventBus};
use filegate_fsops::{CsvTarget, FsOpsError, ObjectStore, Relocator, validate_csv};
use filegate_telemetry::Metrics;
use tracing::{debug, error, info, warn};

/// Checked batch: the validation result plus every file that moves with it.
struct BatchScan {
    result: ValidationResult,
    relocatable: BTreeSet<BatchAttributes>,
}

/// Validates batches and relocates them by outcome.
#[derive(Clone)]
pub struct ValidationService {
    locks: Arc<dyn LockStore>,
    objects: Arc<dyn ObjectStore>,
    registry: Arc<FileTypeRegistry>,
    parser: BatchKeyParser,
    relocator: Relocator,
    destinations: DestinationConfig,
    events: EventBus,
    metrics: Metrics,
}

impl ValidationService {
    /// Construct the service.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        locks: Arc<dyn LockStore>,
        objects: Arc<dyn ObjectStore>,
        registry: Arc<FileTypeRegistry>,
        parser: BatchKeyParser,
        relocator: Relocator,
        destinations: DestinationConfig,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            locks,
            objects,
            registry,
            parser,
            relocator,
            destinations,
            events,
            metrics,
        }
    }

    /// Validate every requested file under the prefix and mark the lock done.
    async fn check_batch(
        &self,
        request: &ValidationRequest,
        batch_prefix: &str,
    ) -> PipelineResult<BatchScan> {
        let keys = self
            .objects
            .list(&request.prefix)
            .await
            .map_err(|err| PipelineError::storage("validation.list", &request.prefix, err))?;

        let mut result = ValidationResult::default();
        let mut relocatable = BTreeSet::new();
        for key in keys {
            let Some(file) = self.batch_file(&key, batch_prefix) else {
                continue;
            };
            if !self.is_requested(&file, request) {
                info!(file = %key, file_type = %file.file_type, "file type not part of this batch; not validated");
                relocatable.insert(file);
                continue;
            }
            let expected_columns = self
                .registry
                .column_count(&file.file_type)
                .map_err(|source| PipelineError::Configuration { source })?;
            let target = CsvTarget {
                file_name: &file.file_name,
                file_type: &file.file_type,
                expected_columns,
            };
            match self.check_file(&key, &target).await {
                Ok(errors) => {
                    debug!(file = %key, errors = errors.len(), "file checked");
                    result.errors.extend(errors);
                    relocatable.insert(file.clone());
                    result.files_considered.insert(file);
                }
                Err(err) if err.is_not_found() => {
                    warn!(file = %key, "file vanished before validation; skipped");
                }
                Err(err) => return Err(PipelineError::storage("validation.read", key, err)),
            }
        }

        match self.locks.mark_done(batch_prefix).await {
            Ok(()) => {}
            Err(StoreError::RecordMissing { .. }) => {
                error!(batch_prefix, "lock record missing when marking batch done");
            }
            Err(err) => return Err(PipelineError::store("lock.mark_done", err)),
        }
        Ok(BatchScan {
            result,
            relocatable,
        })
    }

    /// Parse a listed key and keep it only if it belongs to the batch.
    fn batch_file(&self, key: &str, batch_prefix: &str) -> Option<BatchAttributes> {
        let file = match self.parser.parse_key(key) {
            Ok(Some(file)) => file,
            Ok(None) => return None,
            Err(err) => {
                debug!(file = %key, error = %err, "listed key is not a batch file; skipped");
                return None;
            }
        };
        (file.batch_prefix == batch_prefix).then_some(file)
    }

    fn is_requested(&self, file: &BatchAttributes, request: &ValidationRequest) -> bool {
        self.registry.is_expected(&file.file_type)
            && request
                .file_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&file.file_type))
    }

    async fn check_file(&self, key: &str, target: &CsvTarget<'_>) -> Result<Vec<String>, FsOpsError> {
        let mut reader = self.objects.open(key).await?;
        validate_csv(&mut reader, target).await
    }

    async fn release_after_failure(&self, batch_prefix: &str) {
        match self.locks.release(batch_prefix).await {
            Ok(true) => info!(batch_prefix, "lock released for a later run"),
            Ok(false) => warn!(batch_prefix, "lock was not in progress at release"),
            Err(err) => error!(batch_prefix, error = %err, "lock release failed"),
        }
    }
}

#[async_trait]
impl BatchValidator for ValidationService {
    async fn validate(&self, request: ValidationRequest) -> PipelineResult<ValidationOutcome> {
        let batch_prefix = request.batch_prefix().to_string();

        let admitted = self
            .locks
            .try_admit_for_validation(&batch_prefix)
            .await
            .map_err(|err| PipelineError::store("lock.admit", err))?;
        if !admitted {
            info!(batch_prefix = %batch_prefix, "validation already handled; skipping");
            self.metrics.inc_validation_run("skipped");
            self.events.publish(Event::ValidationSkipped {
                batch_prefix: batch_prefix.clone(),
            });
            return Ok(ValidationOutcome::Skipped { batch_prefix });
        }

        let BatchScan {
            result,
            relocatable,
        } = match self.check_batch(&request, &batch_prefix).await {
            Ok(scan) => scan,
            Err(err) => {
                error!(batch_prefix = %batch_prefix, error = %err, "validation run aborted");
                self.metrics.inc_validation_run("error");
                self.release_after_failure(&batch_prefix).await;
                return Err(err);
            }
        };

        let valid = result.is_valid();
        let destination = self.destinations.for_outcome(valid).to_string();
        if valid {
            info!(
                batch_prefix = %batch_prefix,
                files = result.files_considered.len(),
                "batch validated"
            );
        } else {
            warn!(
                batch_prefix = %batch_prefix,
                errors = %result.errors.join(", "),
                "batch failed validation"
            );
        }

        let relocation = self
            .relocator
            .relocate(&relocatable, &destination)
            .await;
        if !relocation.failed.is_empty() {
            self.metrics.add_relocation_failures(relocation.failed.len());
            self.events.publish(Event::RelocationFailed {
                batch_prefix: batch_prefix.clone(),
                files: relocation.failed.clone(),
            });
        }

        self.metrics
            .inc_validation_run(if valid { "valid" } else { "invalid" });
        self.events.publish(Event::ValidationFinished {
            batch_prefix: batch_prefix.clone(),
            valid,
            error_count: result.errors.len(),
            destination: destination.clone(),
        });

        Ok(ValidationOutcome::Validated(ValidationReport {
            batch_prefix,
            errors: result.errors,
            files_considered: result.files_considered.len(),
            destination,
            relocation: relocation.into(),
        }))
    }
}

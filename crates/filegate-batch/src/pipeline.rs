//! Contracts shared by the coordinator, the validation run, and ingress.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::attributes::{BatchAttributes, UploadNotification};
use crate::error::PipelineResult;
use crate::tracker::TrackerStatus;

/// Downstream activation payload: `{prefix, fileTypes}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    /// Object-store prefix enumerating the batch.
    pub prefix: String,
    /// File types to validate.
    pub file_types: BTreeSet<String>,
}

impl ValidationRequest {
    /// Batch identity: the last segment of the prefix.
    #[must_use]
    pub fn batch_prefix(&self) -> &str {
        self.prefix
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.prefix)
    }
}

/// Errors and files gathered by one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Accumulated structural errors, in discovery order.
    pub errors: Vec<String>,
    /// Files that were validated.
    pub files_considered: BTreeSet<BatchAttributes>,
}

impl ValidationResult {
    /// Whether no errors were recorded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Files moved and left behind by one relocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationSummary {
    /// Destination keys written.
    pub moved: Vec<String>,
    /// Source keys left in place after a failed retry.
    pub failed: Vec<String>,
}

/// Outcome of a completed validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Batch identity.
    pub batch_prefix: String,
    /// Accumulated errors.
    pub errors: Vec<String>,
    /// Number of files validated.
    pub files_considered: usize,
    /// Folder the batch was relocated to.
    pub destination: String,
    /// Relocation accounting.
    pub relocation: RelocationSummary,
}

impl ValidationReport {
    /// Whether the batch passed validation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors joined the way ingress reports them.
    #[must_use]
    pub fn joined_errors(&self) -> String {
        self.errors.join(", ")
    }
}

/// What a validation trigger achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The admission gate refused the run; another trigger owns the batch.
    Skipped {
        /// Batch identity.
        batch_prefix: String,
    },
    /// The run completed.
    Validated(ValidationReport),
}

/// Result of handing a claimed batch to downstream activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Validation ran (or was skipped) synchronously.
    Completed(ValidationOutcome),
    /// Validation was handed off and answered with a status only.
    Delegated {
        /// HTTP status returned by the remote validator.
        status: u16,
    },
}

/// What the coordinator did with one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Not a CSV upload into an inbound folder.
    NotApplicable,
    /// Malformed path or name; logged and dropped.
    Ignored {
        /// Machine-readable reason.
        reason: String,
    },
    /// Recorded; the batch is still incomplete.
    Waiting {
        /// Batch identity.
        batch_prefix: String,
        /// Expected types still outstanding.
        missing: Vec<String>,
    },
    /// Already recorded, outside the expected set, or the tracker is busy.
    Duplicate {
        /// Batch identity.
        batch_prefix: String,
    },
    /// Complete, but another trigger holds the claim.
    ClaimDenied {
        /// Batch identity.
        batch_prefix: String,
    },
    /// Complete and handed to downstream activation.
    Activated(ActivationOutcome),
}

impl NotificationOutcome {
    /// Metric label for the outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotApplicable => "not_applicable",
            Self::Ignored { .. } => "ignored",
            Self::Waiting { .. } => "waiting",
            Self::Duplicate { .. } => "duplicate",
            Self::ClaimDenied { .. } => "claim_denied",
            Self::Activated(_) => "activated",
        }
    }
}

/// Entry point resolving upload notifications to batch trackers.
#[async_trait]
pub trait UploadCoordinator: Send + Sync {
    /// Route one notification.
    async fn handle(&self, notification: UploadNotification) -> PipelineResult<NotificationOutcome>;

    /// Current tracker status for a batch.
    async fn tracker_status(&self, batch_prefix: &str) -> PipelineResult<Option<TrackerStatus>>;
}

/// Validation run for a claimed batch.
#[async_trait]
pub trait BatchValidator: Send + Sync {
    /// Validate and relocate the batch, guarded by the admission gate.
    async fn validate(&self, request: ValidationRequest) -> PipelineResult<ValidationOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_wire_names() {
        let request: ValidationRequest = serde_json::from_str(
            r#"{"prefix":"acme/inbound/acme_20230601_0930","fileTypes":["type1","type2"]}"#,
        )
        .expect("decode");
        assert_eq!(request.batch_prefix(), "acme_20230601_0930");
        assert_eq!(request.file_types.len(), 2);
        let encoded = serde_json::to_value(&request).expect("encode");
        assert!(encoded.get("fileTypes").is_some());
    }

    #[test]
    fn report_joins_errors_with_commas() {
        let report = ValidationReport {
            batch_prefix: "acme_20230601_0930".into(),
            errors: vec!["first".into(), "second".into()],
            files_considered: 2,
            destination: "invalid-set".into(),
            relocation: RelocationSummary::default(),
        };
        assert!(!report.is_valid());
        assert_eq!(report.joined_errors(), "first, second");
    }

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(NotificationOutcome::NotApplicable.label(), "not_applicable");
        assert_eq!(
            NotificationOutcome::ClaimDenied {
                batch_prefix: "x".into()
            }
            .label(),
            "claim_denied"
        );
        assert!(ValidationResult::default().is_valid());
    }
}

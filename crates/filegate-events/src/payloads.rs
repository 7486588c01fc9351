//! Event payload types carried across the pipeline.

use chrono::{DateTime, Utc};

/// Identifier assigned to each event emitted by the pipeline.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the pipeline.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A tracker was created for a previously unseen batch.
    TrackerStarted {
        /// Batch identity the tracker is keyed by.
        batch_prefix: String,
        /// File type that seeded the tracker.
        file_type: String,
    },
    /// A file arrival was recorded against a waiting tracker.
    FileArrived {
        /// Batch identity.
        batch_prefix: String,
        /// File type that arrived.
        file_type: String,
        /// Expected file types still outstanding.
        missing: Vec<String>,
    },
    /// A tracker in an unexpected state was terminated and replaced.
    TrackerBounced {
        /// Batch identity.
        batch_prefix: String,
        /// Status label the tracker had when it was bounced.
        previous_status: String,
    },
    /// Every expected file type arrived.
    BatchCompleted {
        /// Batch identity.
        batch_prefix: String,
    },
    /// A completed batch could not be claimed because another trigger owns it.
    ClaimDenied {
        /// Batch identity.
        batch_prefix: String,
    },
    /// A validation run was refused by the admission gate.
    ValidationSkipped {
        /// Batch identity.
        batch_prefix: String,
    },
    /// A validation run finished and the batch was relocated.
    ValidationFinished {
        /// Batch identity.
        batch_prefix: String,
        /// Whether the batch passed structural validation.
        valid: bool,
        /// Number of accumulated validation errors.
        error_count: usize,
        /// Destination folder the batch was moved to.
        destination: String,
    },
    /// One or more files could not be relocated after a retry.
    RelocationFailed {
        /// Batch identity.
        batch_prefix: String,
        /// Object keys left in place.
        files: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for log and metric labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TrackerStarted { .. } => "tracker_started",
            Self::FileArrived { .. } => "file_arrived",
            Self::TrackerBounced { .. } => "tracker_bounced",
            Self::BatchCompleted { .. } => "batch_completed",
            Self::ClaimDenied { .. } => "claim_denied",
            Self::ValidationSkipped { .. } => "validation_skipped",
            Self::ValidationFinished { .. } => "validation_finished",
            Self::RelocationFailed { .. } => "relocation_failed",
        }
    }

    /// Batch identity every event is scoped to.
    #[must_use]
    pub fn batch_prefix(&self) -> &str {
        match self {
            Self::TrackerStarted { batch_prefix, .. }
            | Self::FileArrived { batch_prefix, .. }
            | Self::TrackerBounced { batch_prefix, .. }
            | Self::BatchCompleted { batch_prefix }
            | Self::ClaimDenied { batch_prefix }
            | Self::ValidationSkipped { batch_prefix }
            | Self::ValidationFinished { batch_prefix, .. }
            | Self::RelocationFailed { batch_prefix, .. } => batch_prefix,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned by the bus.
    pub id: EventId,
    /// Time the event was published.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

//! Per-batch tracker state machine.
//!
//! # Design
//! - `Waiting -> Completing -> Terminated`; `Completed` is reported only on the
//!   single `Waiting -> Completing` edge.
//! - Only expected types are recorded, so `received` never exceeds the expected set.
//! - State is plain data; persistence and event delivery live in `host.rs`.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::FileTypeRegistry;

/// Name of the external event raised for each new file.
pub const NEW_FILE_EVENT: &str = "newfile";

/// Lifecycle of a batch tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// Accepting file arrivals.
    Waiting,
    /// Every expected type arrived; validation is being dispatched.
    Completing,
    /// Validation dispatched or tracker bounced.
    Terminated,
}

impl TrackerStatus {
    /// Stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Completing => "completing",
            Self::Terminated => "terminated",
        }
    }

    /// Parse a storage label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(Self::Waiting),
            "completing" => Some(Self::Completing),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }
}

impl Display for TrackerStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// External event delivered to a running tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A file belonging to the batch arrived.
    #[serde(rename = "newfile")]
    NewFile {
        /// File name that arrived.
        file_name: String,
        /// File type derived from the name.
        file_type: String,
    },
}

impl TrackerEvent {
    /// External event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewFile { .. } => NEW_FILE_EVENT,
        }
    }
}

/// Result of feeding one file type into a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerTransition {
    /// Recorded; the batch is still incomplete.
    Waiting {
        /// Expected types still outstanding.
        missing: Vec<String>,
    },
    /// Recorded; the batch just became complete.
    Completed,
    /// The type had already been recorded.
    Duplicate,
    /// The type is not part of the expected set.
    Unexpected {
        /// Type that was offered.
        file_type: String,
    },
    /// The tracker no longer accepts arrivals.
    Rejected {
        /// Status the tracker was in.
        status: TrackerStatus,
    },
}

/// Durable state of one batch tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTrackerState {
    /// Batch identity.
    pub batch_prefix: String,
    /// Object-store prefix enumerating the batch.
    pub listing_prefix: String,
    /// Expected types observed so far.
    pub received_file_types: BTreeSet<String>,
    /// Current lifecycle status.
    pub status: TrackerStatus,
    /// Optimistic concurrency version, bumped by every store write.
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl BatchTrackerState {
    /// Create a tracker seeded with its first file type.
    ///
    /// A batch of one completes immediately.
    #[must_use]
    pub fn start(
        batch_prefix: impl Into<String>,
        listing_prefix: impl Into<String>,
        first_file_type: &str,
        registry: &FileTypeRegistry,
    ) -> (Self, TrackerTransition) {
        let now = Utc::now();
        let mut state = Self {
            batch_prefix: batch_prefix.into(),
            listing_prefix: listing_prefix.into(),
            received_file_types: BTreeSet::new(),
            status: TrackerStatus::Waiting,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let transition = state.observe(first_file_type, registry);
        (state, transition)
    }

    /// Record an arriving file type.
    pub fn observe(&mut self, file_type: &str, registry: &FileTypeRegistry) -> TrackerTransition {
        if self.status != TrackerStatus::Waiting {
            return TrackerTransition::Rejected {
                status: self.status,
            };
        }
        let file_type = file_type.to_ascii_lowercase();
        if !registry.is_expected(&file_type) {
            return TrackerTransition::Unexpected { file_type };
        }
        if !self.received_file_types.insert(file_type) {
            return TrackerTransition::Duplicate;
        }
        self.updated_at = Utc::now();
        if registry.is_complete(&self.received_file_types) {
            self.status = TrackerStatus::Completing;
            TrackerTransition::Completed
        } else {
            TrackerTransition::Waiting {
                missing: registry.missing(&self.received_file_types),
            }
        }
    }

    /// Move a completing tracker to its terminal state.
    ///
    /// Returns `false` when the tracker was not completing.
    pub fn finish(&mut self) -> bool {
        if self.status == TrackerStatus::Completing {
            self.status = TrackerStatus::Terminated;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    /// Force the tracker into its terminal state.
    pub fn terminate(&mut self) {
        self.status = TrackerStatus::Terminated;
        self.updated_at = Utc::now();
    }
}

//! Wire types accepted and returned by the HTTP ingress.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RFC 9457 problem document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message when available.
    pub detail: Option<String>,
}

/// One Event Grid envelope; notifications arrive as a JSON array of these.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventGridEvent {
    /// Event identifier.
    #[serde(default)]
    pub id: String,
    /// Event type, e.g. `Microsoft.Storage.BlobCreated`.
    pub event_type: String,
    /// Subject path of the resource.
    #[serde(default)]
    pub subject: String,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Value,
}

/// Payload of a `Microsoft.Storage.BlobCreated` event.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlobCreatedData {
    /// Storage API that created the blob.
    #[serde(default)]
    pub api: String,
    /// Content type recorded on the blob.
    #[serde(default)]
    pub content_type: String,
    /// Blob URL.
    pub url: String,
}

/// Payload of a subscription validation handshake.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionValidationData {
    /// Code to echo back.
    pub validation_code: String,
}

/// Handshake answer echoing the validation code.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionValidationResponse {
    /// Echoed validation code.
    pub validation_response: String,
}

/// Accepted-for-processing answer describing what happened to a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Outcome label.
    pub status: String,
    /// Batch the request resolved to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_prefix: Option<String>,
    /// Expected types still outstanding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
    /// Why the notification was dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Status returned by a remote validator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_status: Option<u16>,
}

impl StatusResponse {
    /// Bare status with no context.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    /// Attach the batch identity.
    #[must_use]
    pub fn with_batch(mut self, batch_prefix: impl Into<String>) -> Self {
        self.batch_prefix = Some(batch_prefix.into());
        self
    }
}

/// Tracker status lookup answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatusResponse {
    /// Batch identity.
    pub batch_prefix: String,
    /// Tracker lifecycle label.
    pub status: String,
}

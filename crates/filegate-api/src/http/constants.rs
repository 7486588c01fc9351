//! Shared HTTP constants (headers, problem URIs, event names).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const HEADER_LAST_EVENT_ID: &str = "last-event-id";
pub(crate) const SSE_KEEP_ALIVE_SECS: u64 = 20;

pub(crate) const PROBLEM_INTERNAL: &str = "https://filegate.dev/problems/internal";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://filegate.dev/problems/bad-request";
pub(crate) const PROBLEM_VALIDATION_FAILED: &str =
    "https://filegate.dev/problems/validation-failed";
pub(crate) const PROBLEM_POLICY_VIOLATION: &str =
    "https://filegate.dev/problems/policy-violation";
pub(crate) const PROBLEM_CONFLICT: &str = "https://filegate.dev/problems/conflict";
pub(crate) const PROBLEM_NOT_FOUND: &str = "https://filegate.dev/problems/not-found";
pub(crate) const PROBLEM_SERVICE_UNAVAILABLE: &str =
    "https://filegate.dev/problems/service-unavailable";
pub(crate) const PROBLEM_BAD_GATEWAY: &str = "https://filegate.dev/problems/bad-gateway";

pub(crate) const EVENT_SUBSCRIPTION_VALIDATION: &str =
    "Microsoft.EventGrid.SubscriptionValidationEvent";
pub(crate) const EVENT_BLOB_CREATED: &str = "Microsoft.Storage.BlobCreated";
pub(crate) const BLOB_API_PUT: &str = "PutBlob";
pub(crate) const SINGLE_EVENT_REQUIRED: &str = "Expecting only one item in the Event Grid message";

//! Notification and validation handlers.
//!
//! # Design
//! - Event Grid delivers a JSON array; exactly one event per request is accepted.
//! - Only `BlobCreated` events from `PutBlob` reach the coordinator; everything
//!   else is acknowledged as ignored so the sender does not retry.
//! - Validated batches answer 200 (valid) or 400 (invalid); every other
//!   successful outcome answers 202 with a status body.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use filegate_batch::{
    ActivationOutcome, NotificationOutcome, UploadNotification, ValidationOutcome,
    ValidationRequest,
};
use tracing::{debug, info, warn};

use crate::http::constants::{
    BLOB_API_PUT, EVENT_BLOB_CREATED, EVENT_SUBSCRIPTION_VALIDATION, SINGLE_EVENT_REQUIRED,
};
use crate::http::errors::ApiError;
use crate::models::{
    BlobCreatedData, EventGridEvent, StatusResponse, SubscriptionValidationData,
    SubscriptionValidationResponse, TrackerStatusResponse,
};
use crate::state::ApiState;

pub(crate) async fn notifications(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<Vec<EventGridEvent>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(events) = payload.map_err(|rejection| {
        warn!(error = %rejection, "notification payload rejected");
        ApiError::bad_request(rejection.body_text())
    })?;
    let [event] = <[EventGridEvent; 1]>::try_from(events).map_err(|events| {
        warn!(count = events.len(), "notification did not carry exactly one event");
        ApiError::bad_request(SINGLE_EVENT_REQUIRED)
    })?;

    if event.event_type == EVENT_SUBSCRIPTION_VALIDATION {
        let data: SubscriptionValidationData = serde_json::from_value(event.data)
            .map_err(|err| ApiError::bad_request(format!("invalid validation event: {err}")))?;
        info!("event subscription validation handshake");
        let body = SubscriptionValidationResponse {
            validation_response: data.validation_code,
        };
        return Ok((StatusCode::OK, Json(body)).into_response());
    }

    let Some(notification) = upload_notification(&event) else {
        debug!(event_type = %event.event_type, subject = %event.subject, "event not applicable");
        return Ok(accepted(StatusResponse::new("ignored")));
    };
    let outcome = state.coordinator.handle(notification).await?;
    notification_response(outcome)
}

pub(crate) async fn validate(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ValidationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection, "validation payload rejected");
        ApiError::bad_request(rejection.body_text())
    })?;
    if request.prefix.trim().is_empty() {
        return Err(ApiError::bad_request("prefix must not be empty"));
    }
    let outcome = state.validator.validate(request).await?;
    validation_response(outcome)
}

pub(crate) async fn batch_status(
    State(state): State<Arc<ApiState>>,
    Path(batch_prefix): Path<String>,
) -> Result<Json<TrackerStatusResponse>, ApiError> {
    let status = state
        .coordinator
        .tracker_status(&batch_prefix)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no tracker for {batch_prefix}")))?;
    Ok(Json(TrackerStatusResponse {
        batch_prefix,
        status: status.to_string(),
    }))
}

fn upload_notification(event: &EventGridEvent) -> Option<UploadNotification> {
    if event.event_type != EVENT_BLOB_CREATED {
        return None;
    }
    let data: BlobCreatedData = serde_json::from_value(event.data.clone()).ok()?;
    (data.api == BLOB_API_PUT).then(|| UploadNotification::new(data.url, data.content_type))
}

fn accepted(body: StatusResponse) -> Response {
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

fn notification_response(outcome: NotificationOutcome) -> Result<Response, ApiError> {
    let body = match outcome {
        NotificationOutcome::NotApplicable => StatusResponse::new("ignored"),
        NotificationOutcome::Ignored { reason } => StatusResponse {
            reason: Some(reason),
            ..StatusResponse::new("ignored")
        },
        NotificationOutcome::Waiting {
            batch_prefix,
            missing,
        } => StatusResponse {
            missing: Some(missing),
            ..StatusResponse::new("waiting").with_batch(batch_prefix)
        },
        NotificationOutcome::Duplicate { batch_prefix } => {
            StatusResponse::new("duplicate").with_batch(batch_prefix)
        }
        NotificationOutcome::ClaimDenied { batch_prefix } => {
            StatusResponse::new("claim_denied").with_batch(batch_prefix)
        }
        NotificationOutcome::Activated(ActivationOutcome::Completed(outcome)) => {
            return validation_response(outcome);
        }
        NotificationOutcome::Activated(ActivationOutcome::Delegated { status }) => {
            StatusResponse {
                downstream_status: Some(status),
                ..StatusResponse::new("delegated")
            }
        }
    };
    Ok(accepted(body))
}

fn validation_response(outcome: ValidationOutcome) -> Result<Response, ApiError> {
    match outcome {
        ValidationOutcome::Skipped { batch_prefix } => {
            Ok(accepted(StatusResponse::new("skipped").with_batch(batch_prefix)))
        }
        ValidationOutcome::Validated(report) if report.is_valid() => {
            Ok((StatusCode::OK, Json(report)).into_response())
        }
        ValidationOutcome::Validated(report) => {
            Err(ApiError::validation_failed(report.joined_errors()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::router::ApiServer;
    use crate::models::ProblemDetails;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use filegate_batch::{
        AttributeError, BatchValidator, PipelineError, PipelineResult, RelocationSummary,
        TrackerStatus, UploadCoordinator, ValidationReport,
    };
    use filegate_telemetry::Metrics;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tower::ServiceExt;

    const PREFIX: &str = "acme_20230601_0930";

    #[derive(Default)]
    struct StubCoordinator {
        received: Mutex<Vec<UploadNotification>>,
    }

    #[async_trait]
    impl UploadCoordinator for StubCoordinator {
        async fn handle(
            &self,
            notification: UploadNotification,
        ) -> PipelineResult<NotificationOutcome> {
            let path = notification.path.clone();
            if let Ok(mut received) = self.received.lock() {
                received.push(notification);
            }
            if path.contains("globex") {
                return Err(PipelineError::Policy {
                    source: AttributeError::ContainerMismatch {
                        container: "acme".into(),
                        customer: "globex".into(),
                    },
                });
            }
            Ok(NotificationOutcome::Waiting {
                batch_prefix: PREFIX.into(),
                missing: vec!["type9".into()],
            })
        }

        async fn tracker_status(
            &self,
            batch_prefix: &str,
        ) -> PipelineResult<Option<TrackerStatus>> {
            Ok((batch_prefix == PREFIX).then_some(TrackerStatus::Waiting))
        }
    }

    struct StubValidator;

    #[async_trait]
    impl BatchValidator for StubValidator {
        async fn validate(&self, request: ValidationRequest) -> PipelineResult<ValidationOutcome> {
            let errors = if request.file_types.contains("type3") {
                vec![
                    "a.csv has 2 columns, expected 14".to_string(),
                    "b.csv has an unquoted field".to_string(),
                ]
            } else {
                Vec::new()
            };
            if request.file_types.is_empty() {
                return Ok(ValidationOutcome::Skipped {
                    batch_prefix: request.batch_prefix().to_string(),
                });
            }
            Ok(ValidationOutcome::Validated(ValidationReport {
                batch_prefix: request.batch_prefix().to_string(),
                errors,
                files_considered: request.file_types.len(),
                destination: "valid-set".into(),
                relocation: RelocationSummary::default(),
            }))
        }
    }

    fn server(coordinator: Arc<StubCoordinator>) -> Result<(axum::Router, Metrics)> {
        let metrics = Metrics::new()?;
        let server = ApiServer::new(
            coordinator,
            Arc::new(StubValidator),
            filegate_events::EventBus::new(),
            metrics.clone(),
        );
        Ok((server.into_router(), metrics))
    }

    async fn post(router: axum::Router, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?;
        let response = router.oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    fn blob_created(url: &str, api: &str) -> Value {
        json!([{
            "id": "evt-1",
            "eventType": EVENT_BLOB_CREATED,
            "subject": "/blobServices/default/containers/acme/blobs/inbound",
            "data": {"api": api, "contentType": "text/csv", "url": url}
        }])
    }

    #[tokio::test]
    async fn subscription_handshake_echoes_code() -> Result<()> {
        let (router, _) = server(Arc::default())?;
        let body = json!([{
            "id": "evt-0",
            "eventType": EVENT_SUBSCRIPTION_VALIDATION,
            "data": {"validationCode": "512d38b6"}
        }]);
        let (status, value) = post(router, "/api/notifications", body).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({"validationResponse": "512d38b6"}));
        Ok(())
    }

    #[tokio::test]
    async fn batched_deliveries_are_rejected() -> Result<()> {
        let (router, _) = server(Arc::default())?;
        let (status, value) = post(router, "/api/notifications", json!([])).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let problem: ProblemDetails = serde_json::from_value(value)?;
        assert_eq!(problem.detail.as_deref(), Some(SINGLE_EVENT_REQUIRED));
        Ok(())
    }

    #[tokio::test]
    async fn put_blob_events_reach_the_coordinator() -> Result<()> {
        let coordinator = Arc::new(StubCoordinator::default());
        let (router, metrics) = server(Arc::clone(&coordinator))?;
        let url = format!("https://store.example/acme/inbound/{PREFIX}_type1.csv");

        let (status, value) =
            post(router.clone(), "/api/notifications", blob_created(&url, "PutBlob")).await?;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(
            value,
            json!({"status": "waiting", "batchPrefix": PREFIX, "missing": ["type9"]})
        );

        let (status, value) =
            post(router, "/api/notifications", blob_created(&url, "CopyBlob")).await?;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(value, json!({"status": "ignored"}));

        let received = coordinator.received.lock().map(|r| r.len()).unwrap_or(0);
        assert_eq!(received, 1);
        let rendered = metrics.render()?;
        assert!(rendered.contains("route=\"/api/notifications\""));
        Ok(())
    }

    #[tokio::test]
    async fn policy_violations_answer_unprocessable() -> Result<()> {
        let (router, _) = server(Arc::default())?;
        let url = "https://store.example/acme/inbound/globex_20230601_0930_type1.csv";
        let (status, value) =
            post(router, "/api/notifications", blob_created(url, "PutBlob")).await?;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let problem: ProblemDetails = serde_json::from_value(value)?;
        assert_eq!(problem.status, 422);
        Ok(())
    }

    #[tokio::test]
    async fn validate_maps_outcomes_to_statuses() -> Result<()> {
        let (router, _) = server(Arc::default())?;
        let prefix = format!("acme/inbound/{PREFIX}");

        let (status, value) = post(
            router.clone(),
            "/api/validate",
            json!({"prefix": prefix, "fileTypes": ["type1"]}),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["batchPrefix"], PREFIX);

        let (status, value) = post(
            router.clone(),
            "/api/validate",
            json!({"prefix": prefix, "fileTypes": ["type3"]}),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            value["detail"],
            "a.csv has 2 columns, expected 14, b.csv has an unquoted field"
        );

        let (status, value) = post(
            router.clone(),
            "/api/validate",
            json!({"prefix": prefix, "fileTypes": []}),
        )
        .await?;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(value["status"], "skipped");

        let (status, _) = post(router, "/api/validate", json!({"fileTypes": []})).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn batch_status_reports_tracker_lifecycle() -> Result<()> {
        let (router, _) = server(Arc::default())?;
        let response = router
            .clone()
            .oneshot(Request::get(format!("/api/batches/{PREFIX}")).body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        assert_eq!(value, json!({"batchPrefix": PREFIX, "status": "waiting"}));

        let response = router
            .oneshot(Request::get("/api/batches/unknown_1_1").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }
}

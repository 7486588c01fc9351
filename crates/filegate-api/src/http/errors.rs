//! RFC 9457-style API error wrapper.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use filegate_batch::PipelineError;
use tracing::{error, warn};

use crate::http::constants::{
    PROBLEM_BAD_GATEWAY, PROBLEM_BAD_REQUEST, PROBLEM_CONFLICT, PROBLEM_INTERNAL,
    PROBLEM_NOT_FOUND, PROBLEM_POLICY_VIOLATION, PROBLEM_SERVICE_UNAVAILABLE,
    PROBLEM_VALIDATION_FAILED,
};
use crate::models::ProblemDetails;

/// Structured API error rendered as a problem document.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    title: &'static str,
    detail: Option<String>,
}

impl ApiError {
    const fn new(status: StatusCode, kind: &'static str, title: &'static str) -> Self {
        Self {
            status,
            kind,
            title,
            detail: None,
        }
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PROBLEM_INTERNAL,
            "internal server error",
        )
        .with_detail(message)
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, PROBLEM_BAD_REQUEST, "bad request").with_detail(detail)
    }

    pub(crate) fn validation_failed(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            PROBLEM_VALIDATION_FAILED,
            "batch failed validation",
        )
        .with_detail(detail)
    }

    pub(crate) fn policy_violation(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            PROBLEM_POLICY_VIOLATION,
            "upload violates ingestion policy",
        )
        .with_detail(detail)
    }

    pub(crate) fn not_found(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            PROBLEM_NOT_FOUND,
            "resource not found",
        )
        .with_detail(detail)
    }

    pub(crate) fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, PROBLEM_CONFLICT, "conflict").with_detail(detail)
    }

    pub(crate) fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            PROBLEM_SERVICE_UNAVAILABLE,
            "service unavailable",
        )
        .with_detail(detail)
    }

    pub(crate) fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            PROBLEM_BAD_GATEWAY,
            "downstream validation failed",
        )
        .with_detail(detail)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Policy { source } => {
                warn!(error = %source, "rejecting upload outside ingestion policy");
                Self::policy_violation(source.to_string())
            }
            PipelineError::Contention {
                batch_prefix,
                attempts,
            } => {
                warn!(batch_prefix = %batch_prefix, attempts, "batch tracker contended");
                Self::conflict(format!("batch {batch_prefix} is busy; retry later"))
            }
            PipelineError::Store { operation, source } => {
                error!(operation, error = %source, "pipeline store unavailable");
                Self::service_unavailable("batch state store is unavailable")
            }
            PipelineError::Storage {
                operation,
                path,
                source,
            } => {
                error!(operation, path = %path, error = %source, "object storage failure");
                Self::service_unavailable("object storage is unavailable")
            }
            PipelineError::Activation { operation, detail } => {
                error!(operation, detail = %detail, "downstream activation failed");
                Self::bad_gateway(detail)
            }
            PipelineError::Configuration { source } => {
                error!(error = %source, "pipeline configuration defect");
                Self::internal("pipeline configuration defect")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemDetails {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            status: self.status.as_u16(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filegate_batch::AttributeError;

    #[test]
    fn pipeline_errors_map_to_problem_statuses() {
        let policy = ApiError::from(PipelineError::Policy {
            source: AttributeError::ContainerMismatch {
                container: "acme".into(),
                customer: "globex".into(),
            },
        });
        assert_eq!(policy.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(policy.kind, PROBLEM_POLICY_VIOLATION);

        let contention = ApiError::from(PipelineError::Contention {
            batch_prefix: "acme_20230601_0930".into(),
            attempts: 4,
        });
        assert_eq!(contention.status, StatusCode::CONFLICT);

        let activation = ApiError::from(PipelineError::Activation {
            operation: "activation.http.send",
            detail: "connection refused".into(),
        });
        assert_eq!(activation.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn problem_response_uses_error_status() {
        let response = ApiError::bad_request("nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

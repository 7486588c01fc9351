//! Hand-off of a claimed batch to its validation run.
//!
//! The admission gate in the lock store makes repeated activations of the same
//! prefix harmless, so neither activator deduplicates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use filegate_batch::{
    ActivationOutcome, BatchValidator, PipelineError, PipelineResult, ValidationRequest,
};
use reqwest::StatusCode;
use tracing::{info, warn};
use url::Url;

const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Starts validation for a complete, claimed batch.
#[async_trait]
pub trait Activator: Send + Sync {
    /// Trigger validation of `request`.
    async fn activate(&self, request: ValidationRequest) -> PipelineResult<ActivationOutcome>;
}

/// Runs validation in this process.
#[derive(Clone)]
pub struct InProcessActivator {
    validator: Arc<dyn BatchValidator>,
}

impl InProcessActivator {
    /// Activate through `validator`.
    #[must_use]
    pub fn new(validator: Arc<dyn BatchValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Activator for InProcessActivator {
    async fn activate(&self, request: ValidationRequest) -> PipelineResult<ActivationOutcome> {
        let outcome = self.validator.validate(request).await?;
        Ok(ActivationOutcome::Completed(outcome))
    }
}

/// POSTs `{prefix, fileTypes}` to a remote validation endpoint.
#[derive(Clone)]
pub struct HttpActivator {
    client: reqwest::Client,
    url: Url,
}

impl HttpActivator {
    /// Build an activator targeting `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: Url) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Activator for HttpActivator {
    async fn activate(&self, request: ValidationRequest) -> PipelineResult<ActivationOutcome> {
        let batch_prefix = request.batch_prefix().to_string();
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|err| PipelineError::Activation {
                operation: "activation.http.send",
                detail: err.to_string(),
            })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                info!(batch_prefix = %batch_prefix, "remote validation passed");
            }
            StatusCode::BAD_REQUEST => match response.text().await {
                Ok(body) => {
                    warn!(batch_prefix = %batch_prefix, errors = %body, "remote validation failed");
                }
                Err(err) => {
                    warn!(
                        batch_prefix = %batch_prefix,
                        error = %err,
                        "remote validation failed; response body unreadable"
                    );
                }
            },
            StatusCode::ACCEPTED => {
                info!(batch_prefix = %batch_prefix, "remote validation already handled");
            }
            other => {
                return Err(PipelineError::Activation {
                    operation: "activation.http.status",
                    detail: format!("{} returned {other}", self.url),
                });
            }
        }
        Ok(ActivationOutcome::Delegated {
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::Router;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use filegate_batch::ValidationOutcome;
    use std::collections::BTreeSet;

    struct SkippingValidator;

    #[async_trait]
    impl BatchValidator for SkippingValidator {
        async fn validate(&self, request: ValidationRequest) -> PipelineResult<ValidationOutcome> {
            Ok(ValidationOutcome::Skipped {
                batch_prefix: request.batch_prefix().to_string(),
            })
        }
    }

    fn request() -> ValidationRequest {
        ValidationRequest {
            prefix: "acme/inbound/acme_20230601_0930".into(),
            file_types: BTreeSet::from(["type1".to_string()]),
        }
    }

    async fn serve(status: AxumStatus) -> Result<Url> {
        let app = Router::new().route(
            "/api/validate",
            post(move |axum::Json(body): axum::Json<serde_json::Value>| async move {
                let prefix = body.get("prefix").and_then(serde_json::Value::as_str);
                let has_types = body.get("fileTypes").is_some();
                if prefix == Some("acme/inbound/acme_20230601_0930") && has_types {
                    (status, "remote")
                } else {
                    (AxumStatus::UNPROCESSABLE_ENTITY, "bad payload")
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Url::parse(&format!("http://{addr}/api/validate"))?)
    }

    #[tokio::test]
    async fn in_process_activation_runs_the_validator() -> PipelineResult<()> {
        let activator = InProcessActivator::new(Arc::new(SkippingValidator));
        let outcome = activator.activate(request()).await?;
        assert!(matches!(
            outcome,
            ActivationOutcome::Completed(ValidationOutcome::Skipped { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn http_activation_maps_known_statuses() -> Result<()> {
        for status in [AxumStatus::OK, AxumStatus::BAD_REQUEST, AxumStatus::ACCEPTED] {
            let activator = HttpActivator::new(serve(status).await?)?;
            let outcome = activator.activate(request()).await?;
            assert_eq!(
                outcome,
                ActivationOutcome::Delegated {
                    status: status.as_u16()
                }
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn truncated_failure_body_still_reports_the_status() -> Result<()> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut received = Vec::new();
                let mut buf = [0_u8; 1024];
                while !received.ends_with(b"}") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(read) => received.extend_from_slice(&buf[..read]),
                    }
                }
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 400 Bad Request\r\ncontent-length: 512\r\n\r\npartial",
                    )
                    .await;
                let _ = socket.shutdown().await;
            }
        });

        let activator = HttpActivator::new(Url::parse(&format!("http://{addr}/api/validate"))?)?;
        let outcome = activator.activate(request()).await?;
        assert_eq!(outcome, ActivationOutcome::Delegated { status: 400 });
        Ok(())
    }

    #[tokio::test]
    async fn http_activation_rejects_unexpected_statuses() -> Result<()> {
        let activator = HttpActivator::new(serve(AxumStatus::INTERNAL_SERVER_ERROR).await?)?;
        let err = activator
            .activate(request())
            .await
            .expect_err("server error");
        assert!(matches!(
            err,
            PipelineError::Activation {
                operation: "activation.http.status",
                ..
            }
        ));
        Ok(())
    }
}

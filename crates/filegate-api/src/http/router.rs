//! Router construction and server host for the API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::Request,
    routing::{get, post},
};
use filegate_batch::{BatchValidator, UploadCoordinator};
use filegate_events::EventBus;
use filegate_telemetry::{Metrics, build_sha};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::constants::HEADER_REQUEST_ID;
use crate::http::events::stream_events;
use crate::http::health::{health, metrics};
use crate::http::ingest::{batch_status, notifications, validate};
use crate::http::telemetry::HttpMetricsLayer;
use crate::state::ApiState;

/// Axum router wrapper that hosts the Filegate ingress.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Construct the server with the pipeline entry points wired into state.
    #[must_use]
    pub fn new(
        coordinator: Arc<dyn UploadCoordinator>,
        validator: Arc<dyn BatchValidator>,
        events: EventBus,
        telemetry: Metrics,
    ) -> Self {
        let state = Arc::new(ApiState::new(
            coordinator,
            validator,
            events,
            telemetry.clone(),
        ));
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let layered = ServiceBuilder::new()
            .layer(filegate_telemetry::set_request_id_layer())
            .layer(filegate_telemetry::propagate_request_id_layer())
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));

        let router = Self::routes().route_layer(layered).with_state(state);
        Self { router }
    }

    fn routes() -> Router<Arc<ApiState>> {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/api/notifications", post(notifications))
            .route("/api/validate", post(validate))
            .route("/api/batches/{batch_prefix}", get(batch_status))
            .route("/api/events", get(stream_events))
    }

    /// Consume the server, yielding its router for embedding or tests.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve the API on the supplied address.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve(self, addr: SocketAddr) -> ApiServerResult<()> {
        tracing::info!("Starting API on {}", addr);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        axum::serve(listener, self.router.into_make_service())
            .await
            .map_err(|source| ApiServerError::Serve { source })?;
        Ok(())
    }
}

//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters the ingestion pipeline reports on.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    notifications_total: IntCounterVec,
    validation_runs_total: IntCounterVec,
    batches_completed_total: IntCounter,
    claims_denied_total: IntCounter,
    relocation_failures_total: IntCounter,
}

/// Snapshot of pipeline counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Batches whose expected file set was observed in full.
    pub batches_completed_total: u64,
    /// Completed batches whose claim was denied by the dedup lock.
    pub claims_denied_total: u64,
    /// Files left in place after a failed relocation retry.
    pub relocation_failures_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = counter_vec(
            "http_requests_total",
            "Total HTTP requests received",
            &["route", "code"],
        )?;
        let notifications_total = counter_vec(
            "notifications_total",
            "Upload notifications handled by outcome",
            &["outcome"],
        )?;
        let validation_runs_total = counter_vec(
            "validation_runs_total",
            "Batch validation runs by result",
            &["result"],
        )?;
        let batches_completed_total = counter(
            "batches_completed_total",
            "Batches whose expected file set arrived in full",
        )?;
        let claims_denied_total = counter(
            "claims_denied_total",
            "Completed batches already claimed by another trigger",
        )?;
        let relocation_failures_total = counter(
            "relocation_failures_total",
            "Files left in place after a failed copy retry",
        )?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "notifications_total", &notifications_total)?;
        register(&registry, "validation_runs_total", &validation_runs_total)?;
        register(&registry, "batches_completed_total", &batches_completed_total)?;
        register(&registry, "claims_denied_total", &claims_denied_total)?;
        register(
            &registry,
            "relocation_failures_total",
            &relocation_failures_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                notifications_total,
                validation_runs_total,
                batches_completed_total,
                claims_denied_total,
                relocation_failures_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Increment the notification counter for a coordinator outcome label.
    pub fn inc_notification(&self, outcome: &str) {
        self.inner
            .notifications_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the validation run counter (`valid`, `invalid`, `skipped`, `error`).
    pub fn inc_validation_run(&self, result: &str) {
        self.inner
            .validation_runs_total
            .with_label_values(&[result])
            .inc();
    }

    /// Increment the completed batch counter.
    pub fn inc_batch_completed(&self) {
        self.inner.batches_completed_total.inc();
    }

    /// Increment the denied claim counter.
    pub fn inc_claim_denied(&self) {
        self.inner.claims_denied_total.inc();
    }

    /// Add the number of files that could not be relocated.
    pub fn add_relocation_failures(&self, count: usize) {
        self.inner
            .relocation_failures_total
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the pipeline counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_completed_total: self.inner.batches_completed_total.get(),
            claims_denied_total: self.inner.claims_denied_total.get(),
            relocation_failures_total: self.inner.relocation_failures_total.get(),
        }
    }
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

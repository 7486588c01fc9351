//! # Design
//!
//! - Centralize application-level errors for bootstrap and wiring.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: filegate_config::ConfigError,
    },
    /// API server operations failed.
    #[error("api server operation failed")]
    ApiServer {
        /// Operation identifier.
        operation: &'static str,
        /// Source API server error.
        source: filegate_api::ApiServerError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: filegate_telemetry::TelemetryError,
    },
    /// Database bootstrap failed.
    #[error("database bootstrap failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data layer error.
        source: filegate_data::DataError,
    },
    /// The batch key parser could not be built.
    #[error("batch key parser unavailable")]
    Parser {
        /// Source attribute error.
        source: filegate_batch::AttributeError,
    },
    /// HTTP client construction failed.
    #[error("http client construction failed")]
    HttpClient {
        /// Source HTTP client error.
        source: reqwest::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: filegate_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn api_server(
        operation: &'static str,
        source: filegate_api::ApiServerError,
    ) -> Self {
        Self::ApiServer { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: filegate_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: filegate_data::DataError) -> Self {
        Self::Data { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "load",
            filegate_config::ConfigError::InvalidField {
                field: "FILEGATE_HTTP_PORT",
                reason: "zero",
                value: Some("0".into()),
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert_eq!(config.to_string(), "configuration operation failed");
        assert!(config.source().is_some());

        let parser = AppError::Parser {
            source: filegate_batch::AttributeError::MalformedName {
                file_name: "x.csv".into(),
            },
        };
        assert_eq!(parser.to_string(), "batch key parser unavailable");
        assert!(parser.source().is_some());
    }
}

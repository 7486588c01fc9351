//! # Design
//!
//! - `Backends` selects durable (Postgres) or in-memory lock and tracker
//!   stores from the configuration; object storage is always the local store.
//! - `PipelineServices::assemble` is the single wiring point shared by the
//!   binary and the integration suites.
//! - Logging is installed before anything else so wiring failures are visible.

use std::net::SocketAddr;
use std::sync::Arc;

use filegate_api::ApiServer;
use filegate_batch::{
    BatchKeyParser, BatchValidator, FileTypeRegistry, LockStore, MemoryLockStore,
    MemoryTrackerStore, TrackerStore,
};
use filegate_config::{ActivationMode, PipelineConfig};
use filegate_data::FilegateDatabase;
use filegate_events::EventBus;
use filegate_fsops::{LocalObjectStore, ObjectStore, Relocator};
use filegate_telemetry::{LogFormat, LoggingConfig, Metrics, build_sha};
use tracing::info;

use crate::activation::{Activator, HttpActivator, InProcessActivator};
use crate::coordinator::Coordinator;
use crate::error::{AppError, AppResult};
use crate::tracker_host::DurableTrackerHost;
use crate::validation::ValidationService;

/// Storage backends the pipeline runs against.
#[derive(Clone)]
pub struct Backends {
    /// Dedup lock store.
    pub locks: Arc<dyn LockStore>,
    /// Tracker persistence.
    pub trackers: Arc<dyn TrackerStore>,
    /// Object store holding uploaded files.
    pub objects: Arc<dyn ObjectStore>,
}

impl Backends {
    /// In-memory lock and tracker stores over `objects`.
    #[must_use]
    pub fn in_memory(objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            locks: Arc::new(MemoryLockStore::new()),
            trackers: Arc::new(MemoryTrackerStore::new()),
            objects,
        }
    }

    /// Backends described by `config`: Postgres when a database URL is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail.
    pub async fn from_config(config: &PipelineConfig) -> AppResult<Self> {
        let objects: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::new(config.storage_root.clone()));
        let Some(url) = config.database_url.as_deref() else {
            info!("no database configured; lock and tracker state is in memory");
            return Ok(Self::in_memory(objects));
        };
        let database = FilegateDatabase::connect(url)
            .await
            .map_err(|err| AppError::data("database.connect", err))?;
        info!("durable lock and tracker stores ready");
        Ok(Self {
            locks: Arc::new(database.locks()),
            trackers: Arc::new(database.trackers()),
            objects,
        })
    }
}

/// The two pipeline entry points, wired over shared backends.
#[derive(Clone)]
pub struct PipelineServices {
    /// Upload notification entry point.
    pub coordinator: Arc<Coordinator>,
    /// Validation run entry point.
    pub validator: Arc<ValidationService>,
}

impl PipelineServices {
    /// Wire the coordinator and validation service.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch key parser or the HTTP activation client
    /// cannot be built.
    pub fn assemble(
        config: &PipelineConfig,
        backends: Backends,
        events: &EventBus,
        metrics: &Metrics,
    ) -> AppResult<Self> {
        let registry = Arc::new(config.registry.clone());
        let parser = BatchKeyParser::new().map_err(|source| AppError::Parser { source })?;

        let validator = Arc::new(ValidationService::new(
            Arc::clone(&backends.locks),
            Arc::clone(&backends.objects),
            Arc::clone(&registry),
            parser.clone(),
            Relocator::new(Arc::clone(&backends.objects), config.relocation),
            config.destinations.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let activator = activator_for(&config.activation, validator.clone())?;
        let host = Arc::new(DurableTrackerHost::new(
            backends.trackers,
            Arc::clone(&registry),
        ));
        let coordinator = Arc::new(Coordinator::new(
            parser,
            registry,
            host,
            backends.locks,
            activator,
            events.clone(),
            metrics.clone(),
        ));
        log_registry(&config.registry);
        Ok(Self {
            coordinator,
            validator,
        })
    }
}

fn activator_for(
    mode: &ActivationMode,
    validator: Arc<dyn BatchValidator>,
) -> AppResult<Arc<dyn Activator>> {
    match mode {
        ActivationMode::InProcess => Ok(Arc::new(InProcessActivator::new(validator))),
        ActivationMode::Http { url } => {
            info!(url = %url, "validation delegated over http");
            let activator =
                HttpActivator::new(url.clone()).map_err(|source| AppError::HttpClient { source })?;
            Ok(Arc::new(activator))
        }
    }
}

fn log_registry(registry: &FileTypeRegistry) {
    let expected: Vec<&str> = registry.expected().iter().map(String::as_str).collect();
    info!(expected = ?expected, "batch registry loaded");
}

/// Dependencies required to bootstrap the Filegate application.
pub(crate) struct BootstrapDependencies {
    config: PipelineConfig,
    events: EventBus,
    telemetry: Metrics,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        let config =
            PipelineConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
        let telemetry =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config,
            events: EventBus::new(),
            telemetry,
        })
    }
}

/// Entry point for the Filegate boot sequence.
///
/// # Errors
///
/// Returns an error if dependency construction or application startup fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    Box::pin(run_app_with(dependencies)).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let BootstrapDependencies {
        config,
        events,
        telemetry,
    } = dependencies;

    let logging = LoggingConfig {
        level: &config.logging.level,
        format: config
            .logging
            .format
            .as_deref()
            .map_or_else(LogFormat::infer, LogFormat::from_name),
        build_sha: build_sha(),
    };
    filegate_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    info!(storage_root = %config.storage_root.display(), "Filegate bootstrap starting");

    let backends = Backends::from_config(&config).await?;
    let services = PipelineServices::assemble(&config, backends, &events, &telemetry)?;
    let api = ApiServer::new(
        services.coordinator,
        services.validator,
        events,
        telemetry,
    );

    let addr = SocketAddr::new(config.http.bind, config.http.port);
    info!(addr = %addr, "Launching API listener");
    api.serve(addr)
        .await
        .map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("API server shutdown complete");
    Ok(())
}

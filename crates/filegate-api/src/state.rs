//! Shared handler state.

use std::sync::Arc;

use filegate_batch::{BatchValidator, UploadCoordinator};
use filegate_events::EventBus;
use filegate_telemetry::Metrics;

pub(crate) struct ApiState {
    pub(crate) coordinator: Arc<dyn UploadCoordinator>,
    pub(crate) validator: Arc<dyn BatchValidator>,
    pub(crate) events: EventBus,
    pub(crate) telemetry: Metrics,
}

impl ApiState {
    pub(crate) fn new(
        coordinator: Arc<dyn UploadCoordinator>,
        validator: Arc<dyn BatchValidator>,
        events: EventBus,
        telemetry: Metrics,
    ) -> Self {
        Self {
            coordinator,
            validator,
            events,
            telemetry,
        }
    }
}

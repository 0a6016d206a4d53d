use std::sync::Arc;
use std::time::Duration;

use weir_core::service::{TrafficService, UpstreamService, VirtualModelService};
use weir_core::Services;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(services: Services, request_timeout: Duration) -> Self {
        Self {
            services,
            request_timeout,
        }
    }

    pub fn traffic(&self) -> &Arc<TrafficService> {
        &self.services.traffic
    }

    pub fn virtual_models(&self) -> &Arc<VirtualModelService> {
        &self.services.virtual_models
    }

    pub fn upstreams(&self) -> &Arc<UpstreamService> {
        &self.services.upstreams
    }
}

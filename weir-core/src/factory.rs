//! Wiring: build the services from a store and optional adapters.

use std::sync::Arc;

use crate::ports::{
    AiGateway, InferenceServiceRepository, ModelVersionRepository, RegisteredModelRepository,
    ServingEnvironmentRepository, ServingRuntime, StoreHealth, TrafficConfigRepository,
    TrafficVariantRepository, VirtualModelRepository,
};
use crate::service::{TrafficService, UpstreamService, VirtualModelService};

/// Every repository port, usually backed by one store.
#[derive(Clone)]
pub struct Repositories {
    pub traffic_configs: Arc<dyn TrafficConfigRepository>,
    pub traffic_variants: Arc<dyn TrafficVariantRepository>,
    pub virtual_models: Arc<dyn VirtualModelRepository>,
    pub inference_services: Arc<dyn InferenceServiceRepository>,
    pub serving_environments: Arc<dyn ServingEnvironmentRepository>,
    pub registered_models: Arc<dyn RegisteredModelRepository>,
    pub model_versions: Arc<dyn ModelVersionRepository>,
    pub health: Arc<dyn StoreHealth>,
}

impl Repositories {
    /// Use one store for every port.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TrafficConfigRepository
            + TrafficVariantRepository
            + VirtualModelRepository
            + InferenceServiceRepository
            + ServingEnvironmentRepository
            + RegisteredModelRepository
            + ModelVersionRepository
            + StoreHealth
            + 'static,
    {
        Self {
            traffic_configs: store.clone(),
            traffic_variants: store.clone(),
            virtual_models: store.clone(),
            inference_services: store.clone(),
            serving_environments: store.clone(),
            registered_models: store.clone(),
            model_versions: store.clone(),
            health: store,
        }
    }
}

/// The application services sharing one set of adapters.
#[derive(Clone)]
pub struct Services {
    pub traffic: Arc<TrafficService>,
    pub virtual_models: Arc<VirtualModelService>,
    pub upstreams: Arc<UpstreamService>,
    pub health: Arc<dyn StoreHealth>,
}

impl Services {
    /// `gateway_namespace` is where virtual-model routes live and the
    /// default namespace for upstream backends.
    pub fn new(
        repos: Repositories,
        runtime: Option<Arc<dyn ServingRuntime>>,
        gateway: Option<Arc<dyn AiGateway>>,
        gateway_namespace: impl Into<String>,
    ) -> Self {
        let gateway_namespace = gateway_namespace.into();

        let mut traffic = TrafficService::new(
            repos.traffic_configs,
            repos.traffic_variants,
            repos.inference_services,
            repos.serving_environments,
            repos.model_versions,
        );
        if let Some(runtime) = runtime {
            traffic = traffic.with_runtime(runtime);
        }

        let mut virtual_models = VirtualModelService::new(repos.virtual_models, &gateway_namespace);
        if let Some(gateway) = gateway.clone() {
            traffic = traffic.with_gateway(gateway.clone());
            virtual_models = virtual_models.with_gateway(gateway);
        }

        Self {
            traffic: Arc::new(traffic),
            virtual_models: Arc::new(virtual_models),
            upstreams: Arc::new(UpstreamService::new(gateway, gateway_namespace)),
            health: repos.health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::error::WeirError;
    use crate::ports::{MockAiGateway, MockServingRuntime};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_services_share_gateway() {
        let gateway = Arc::new(MockAiGateway::new());
        let services = Services::new(
            Repositories::from_store(Arc::new(MemoryStore::new())),
            Some(Arc::new(MockServingRuntime::new())),
            Some(gateway.clone()),
            "llm",
        );
        let ctx = RequestContext::new(Uuid::new_v4()).unwrap();
        services.health.ping(&ctx).await.unwrap();
        assert_eq!(services.virtual_models.namespace(), "llm");
        assert!(services.upstreams.list_envoy_backends(&ctx, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_services_without_gateway() {
        let services = Services::new(
            Repositories::from_store(Arc::new(MemoryStore::new())),
            None,
            None,
            "model-serving",
        );
        let ctx = RequestContext::new(Uuid::new_v4()).unwrap();
        assert_eq!(
            services.upstreams.list_service_backends(&ctx, None).await.unwrap_err(),
            WeirError::AiGatewayNotAvailable
        );
    }
}

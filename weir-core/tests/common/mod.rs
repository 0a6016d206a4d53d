//! Shared fixtures: an in-memory store seeded with one environment, one
//! model with three versions, and the `llama` inference service.

#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;
use weir_core::domain::{
    InferenceService, ModelVersion, RegisteredModel, ServingEnvironment, TrafficConfig,
    TrafficStrategy,
};
use weir_core::ports::{
    InferenceServiceRepository, MockAiGateway, MockServingRuntime, ModelVersionRepository,
    RegisteredModelRepository, ServingEnvironmentRepository,
};
use weir_core::service::CreateTrafficConfig;
use weir_core::store::MemoryStore;
use weir_core::{Repositories, RequestContext, Services};

pub const NAMESPACE: &str = "serving-prod";
pub const GATEWAY_NAMESPACE: &str = "model-serving";

pub struct Harness {
    pub ctx: RequestContext,
    pub store: Arc<MemoryStore>,
    pub runtime: Arc<MockServingRuntime>,
    pub gateway: Arc<MockAiGateway>,
    pub services: Services,
    pub isvc: InferenceService,
    pub v1: ModelVersion,
    pub v2: ModelVersion,
    pub v3: ModelVersion,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_gateway(MockAiGateway::new()).await
    }

    pub async fn with_gateway(gateway: MockAiGateway) -> Self {
        let project = Uuid::new_v4();
        let ctx = RequestContext::new(project).unwrap();
        let store = Arc::new(MemoryStore::new());

        let mut env = ServingEnvironment::new(project, "prod");
        env.external_id = Some(NAMESPACE.into());
        ServingEnvironmentRepository::create(store.as_ref(), &ctx, &env)
            .await
            .unwrap();
        let model = RegisteredModel::new(project, "llama");
        RegisteredModelRepository::create(store.as_ref(), &ctx, &model)
            .await
            .unwrap();

        let mut versions = Vec::new();
        for n in 1..=3 {
            let version = ModelVersion::new(
                project,
                model.id,
                format!("v{n}"),
                format!("s3://models/llama/{n}"),
            );
            ModelVersionRepository::create(store.as_ref(), &ctx, &version)
                .await
                .unwrap();
            versions.push(version);
        }
        let isvc = InferenceService::new(project, "llama", env.id, model.id).unwrap();
        InferenceServiceRepository::create(store.as_ref(), &ctx, &isvc)
            .await
            .unwrap();

        let runtime = Arc::new(MockServingRuntime::new());
        runtime.seed(NAMESPACE, "llama", versions[0].id);
        let gateway = Arc::new(gateway);
        let services = Services::new(
            Repositories::from_store(store.clone()),
            Some(runtime.clone()),
            Some(gateway.clone()),
            GATEWAY_NAMESPACE,
        );

        let v3 = versions.pop().unwrap();
        let v2 = versions.pop().unwrap();
        let v1 = versions.pop().unwrap();
        Self {
            ctx,
            store,
            runtime,
            gateway,
            services,
            isvc,
            v1,
            v2,
            v3,
        }
    }

    pub async fn create_config(&self) -> TrafficConfig {
        self.services
            .traffic
            .create_config(
                &self.ctx,
                CreateTrafficConfig {
                    inference_service_id: self.isvc.id,
                    strategy: TrafficStrategy::Canary,
                    stable_version_id: self.v1.id,
                },
            )
            .await
            .unwrap()
            .value
    }
}

/// `(name, weight)` pairs for a config's variants, sorted by name.
pub fn weights(config: &TrafficConfig) -> Vec<(String, i32)> {
    let mut out: Vec<_> = config
        .variants
        .iter()
        .map(|v| (v.variant_name.clone(), v.weight))
        .collect();
    out.sort();
    out
}

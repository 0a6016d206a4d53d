//! Persistence ports.
//!
//! Every method takes the request context; reads and writes are scoped to
//! `ctx.project_id()`. Records belonging to another project behave as if
//! they did not exist. Implementations translate their own failures:
//! a uniqueness violation becomes the matching conflict sentinel and a
//! missing row becomes the matching not-found sentinel.

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::domain::{
    InferenceService, ModelVersion, RegisteredModel, ServingEnvironment, TrafficConfig,
    TrafficConfigFilter, TrafficVariant, VirtualModel, VirtualModelBackend,
};
use crate::error::Result;

#[async_trait]
pub trait TrafficConfigRepository: Send + Sync {
    /// Insert a config. At most one config exists per inference service.
    async fn create(&self, ctx: &RequestContext, config: &TrafficConfig) -> Result<()>;

    /// Load a config without its variants.
    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<TrafficConfig>;

    async fn get_by_inference_service(
        &self,
        ctx: &RequestContext,
        inference_service_id: Uuid,
    ) -> Result<TrafficConfig>;

    async fn update(&self, ctx: &RequestContext, config: &TrafficConfig) -> Result<()>;

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()>;

    /// Matching configs for the page requested, plus the total match count.
    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &TrafficConfigFilter,
    ) -> Result<(Vec<TrafficConfig>, usize)>;
}

#[async_trait]
pub trait TrafficVariantRepository: Send + Sync {
    /// Insert a variant. Names are unique within a config.
    async fn create(&self, ctx: &RequestContext, variant: &TrafficVariant) -> Result<()>;

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<TrafficVariant>;

    async fn get_by_name(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        name: &str,
    ) -> Result<TrafficVariant>;

    async fn update(&self, ctx: &RequestContext, variant: &TrafficVariant) -> Result<()>;

    /// Apply several updates atomically and in order. Name uniqueness is
    /// checked against the final state, so a rename that frees a name may
    /// be followed by one that takes it.
    async fn update_many(&self, ctx: &RequestContext, variants: &[TrafficVariant]) -> Result<()>;

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()>;

    /// Variants of a config in creation order.
    async fn list_by_config(&self, ctx: &RequestContext, config_id: Uuid)
    -> Result<Vec<TrafficVariant>>;

    async fn delete_by_config(&self, ctx: &RequestContext, config_id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait VirtualModelRepository: Send + Sync {
    /// Insert a virtual model. Names are unique within a project.
    async fn create(&self, ctx: &RequestContext, vm: &VirtualModel) -> Result<()>;

    /// Load a virtual model with its backends.
    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<VirtualModel>;

    async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<VirtualModel>;

    async fn update(&self, ctx: &RequestContext, vm: &VirtualModel) -> Result<()>;

    /// Delete the backend rows, then the virtual model row.
    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()>;

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<VirtualModel>>;

    /// Insert a backend. Backend names are unique within a virtual model.
    async fn create_backend(&self, ctx: &RequestContext, backend: &VirtualModelBackend) -> Result<()>;

    async fn update_backend(&self, ctx: &RequestContext, backend: &VirtualModelBackend) -> Result<()>;

    async fn delete_backend(&self, ctx: &RequestContext, backend_id: Uuid) -> Result<()>;

    async fn list_backends(
        &self,
        ctx: &RequestContext,
        virtual_model_id: Uuid,
    ) -> Result<Vec<VirtualModelBackend>>;
}

#[async_trait]
pub trait InferenceServiceRepository: Send + Sync {
    async fn create(&self, ctx: &RequestContext, isvc: &InferenceService) -> Result<()>;

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<InferenceService>;

    async fn update(&self, ctx: &RequestContext, isvc: &InferenceService) -> Result<()>;
}

#[async_trait]
pub trait ServingEnvironmentRepository: Send + Sync {
    async fn create(&self, ctx: &RequestContext, env: &ServingEnvironment) -> Result<()>;

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<ServingEnvironment>;
}

#[async_trait]
pub trait RegisteredModelRepository: Send + Sync {
    async fn create(&self, ctx: &RequestContext, model: &RegisteredModel) -> Result<()>;

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<RegisteredModel>;
}

#[async_trait]
pub trait ModelVersionRepository: Send + Sync {
    async fn create(&self, ctx: &RequestContext, version: &ModelVersion) -> Result<()>;

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<ModelVersion>;
}

/// Liveness probe for the backing store.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self, ctx: &RequestContext) -> Result<()>;
}

//! Virtual models: a stable public model name routed across weighted,
//! prioritised upstream backends on the AI gateway.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lock::{KeyedLock, virtual_model_key};
use super::outcome::{ExternalEffect, Outcome, SyncReport};
use crate::context::RequestContext;
use crate::domain::virtual_model::{validate_backend_name, validate_priority};
use crate::domain::{GatewayRoute, VirtualModel, VirtualModelBackend, validate_weight};
use crate::error::{Result, WeirError};
use crate::ports::{AiGateway, VirtualModelRepository};

/// Label put on routes owned by a virtual model.
pub const LABEL_VIRTUAL_MODEL_ID: &str = "virtual-model-id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVirtualModel {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBackend {
    pub backend_name: String,
    #[serde(default)]
    pub backend_namespace: Option<String>,
    #[serde(default)]
    pub model_name_override: Option<String>,
    pub weight: i32,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBackend {
    pub weight: i32,
    #[serde(default)]
    pub priority: i32,
}

pub struct VirtualModelService {
    repo: Arc<dyn VirtualModelRepository>,
    gateway: Option<Arc<dyn AiGateway>>,
    namespace: String,
    locks: KeyedLock,
}

impl VirtualModelService {
    /// `namespace` holds the virtual models' routes and is the default
    /// namespace for backends that do not name one.
    pub fn new(repo: Arc<dyn VirtualModelRepository>, namespace: impl Into<String>) -> Self {
        Self {
            repo,
            gateway: None,
            namespace: namespace.into(),
            locks: KeyedLock::new(),
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn AiGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    fn gateway(&self) -> Option<&Arc<dyn AiGateway>> {
        self.gateway.as_ref().filter(|g| g.is_available())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // --- Reads ---

    pub async fn get(&self, ctx: &RequestContext, name: &str) -> Result<VirtualModel> {
        self.repo.get_by_name(ctx, name).await
    }

    pub async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<VirtualModel> {
        self.repo.get_by_id(ctx, id).await
    }

    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<VirtualModel>> {
        self.repo.list(ctx).await
    }

    pub async fn list_backends(&self, ctx: &RequestContext, name: &str) -> Result<Vec<VirtualModelBackend>> {
        let vm = self.repo.get_by_name(ctx, name).await?;
        self.repo.list_backends(ctx, vm.id).await
    }

    // --- Mutations ---

    /// Create a virtual model and, when a gateway is available, an empty
    /// route answering its name.
    pub async fn create(&self, ctx: &RequestContext, req: CreateVirtualModel) -> Result<Outcome<VirtualModel>> {
        let _guard = self
            .locks
            .acquire(virtual_model_key(ctx.project_id(), &req.name))
            .await;

        let mut vm = VirtualModel::new(ctx.project_id(), req.name)?;
        vm.description = req.description;
        self.repo.create(ctx, &vm).await?;
        info!(virtual_model = %vm.name, id = %vm.id, "Created virtual model");

        let gateway = match self.gateway() {
            None => ExternalEffect::Skipped,
            Some(gateway) => {
                let route = GatewayRoute::new(vm.default_route_name(), &self.namespace, &vm.name)
                    .with_label(LABEL_VIRTUAL_MODEL_ID, vm.id.to_string());
                match gateway.create_route(ctx, &route).await {
                    Ok(()) => {
                        vm.gateway_route_name = Some(route.name);
                        self.repo.update(ctx, &vm).await?;
                        ExternalEffect::Applied
                    }
                    Err(e) => {
                        warn!(virtual_model = %vm.name, error = %e, "Failed to create gateway route");
                        ExternalEffect::failed(&e)
                    }
                }
            }
        };

        let vm = self.repo.get_by_id(ctx, vm.id).await?;
        Ok(Outcome::new(vm, SyncReport::gateway(gateway)))
    }

    /// Attach an upstream backend. The backend must already exist on the
    /// gateway when one is available.
    pub async fn add_backend(
        &self,
        ctx: &RequestContext,
        name: &str,
        req: AddBackend,
    ) -> Result<Outcome<VirtualModel>> {
        validate_backend_name(&req.backend_name)?;
        validate_weight(req.weight)?;
        validate_priority(req.priority)?;
        let _guard = self.locks.acquire(virtual_model_key(ctx.project_id(), name)).await;
        let vm = self.repo.get_by_name(ctx, name).await?;

        let namespace = req
            .backend_namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| self.namespace.clone());
        if let Some(gateway) = self.gateway() {
            gateway
                .get_service_backend(ctx, &namespace, &req.backend_name)
                .await
                .map_err(|e| if e.is_not_found() { WeirError::BackendNotFound } else { e })?;
        }
        if vm.backend(&req.backend_name).is_some() {
            return Err(WeirError::BackendAlreadyExists);
        }

        let mut backend = VirtualModelBackend::new(vm.id, &req.backend_name, req.weight, req.priority)?;
        backend.backend_namespace = Some(namespace);
        backend.model_name_override = req.model_name_override.filter(|m| !m.is_empty());
        self.repo.create_backend(ctx, &backend).await?;

        info!(
            virtual_model = %vm.name,
            backend = %backend.backend_name,
            weight = backend.weight,
            priority = backend.priority,
            "Added backend to virtual model"
        );
        self.finish(ctx, vm.id).await
    }

    pub async fn update_backend(
        &self,
        ctx: &RequestContext,
        name: &str,
        backend_id: Uuid,
        req: UpdateBackend,
    ) -> Result<Outcome<VirtualModel>> {
        validate_weight(req.weight)?;
        validate_priority(req.priority)?;
        let _guard = self.locks.acquire(virtual_model_key(ctx.project_id(), name)).await;
        let vm = self.repo.get_by_name(ctx, name).await?;

        let mut backend = vm
            .backend_by_id(backend_id)
            .cloned()
            .ok_or(WeirError::BackendNotFound)?;
        backend.set_weight_and_priority(req.weight, req.priority)?;
        self.repo.update_backend(ctx, &backend).await?;

        info!(
            virtual_model = %vm.name,
            backend = %backend.backend_name,
            weight = req.weight,
            priority = req.priority,
            "Updated virtual model backend"
        );
        self.finish(ctx, vm.id).await
    }

    pub async fn delete_backend(
        &self,
        ctx: &RequestContext,
        name: &str,
        backend_id: Uuid,
    ) -> Result<Outcome<VirtualModel>> {
        let _guard = self.locks.acquire(virtual_model_key(ctx.project_id(), name)).await;
        let vm = self.repo.get_by_name(ctx, name).await?;
        let backend = vm
            .backend_by_id(backend_id)
            .ok_or(WeirError::BackendNotFound)?;
        self.repo.delete_backend(ctx, backend_id).await?;

        info!(virtual_model = %vm.name, backend = %backend.backend_name, "Removed backend from virtual model");
        self.finish(ctx, vm.id).await
    }

    /// Delete a virtual model: best-effort route removal, then its backends,
    /// then the model itself.
    pub async fn delete(&self, ctx: &RequestContext, name: &str) -> Result<Outcome<()>> {
        let _guard = self.locks.acquire(virtual_model_key(ctx.project_id(), name)).await;
        let vm = self.repo.get_by_name(ctx, name).await?;

        let gateway = match (self.gateway(), vm.gateway_route_name.as_deref()) {
            (Some(gateway), Some(route_name)) => {
                match gateway.delete_route(ctx, &self.namespace, route_name).await {
                    Ok(()) => ExternalEffect::Applied,
                    Err(e) => {
                        warn!(virtual_model = %vm.name, route = route_name, error = %e, "Failed to delete gateway route");
                        ExternalEffect::failed(&e)
                    }
                }
            }
            _ => ExternalEffect::Skipped,
        };

        self.repo.delete(ctx, vm.id).await?;
        info!(virtual_model = %vm.name, "Deleted virtual model");
        Ok(Outcome::new((), SyncReport::gateway(gateway)))
    }

    async fn sync_route(&self, ctx: &RequestContext, vm: &VirtualModel) -> ExternalEffect {
        let (Some(gateway), Some(route_name)) = (self.gateway(), vm.gateway_route_name.as_deref()) else {
            return ExternalEffect::Skipped;
        };
        let backends = vm.weighted_backends();
        match gateway
            .update_traffic_weights(ctx, &self.namespace, route_name, &backends)
            .await
        {
            Ok(()) => {
                debug!(virtual_model = %vm.name, route = route_name, backends = backends.len(), "Synced gateway route");
                ExternalEffect::Applied
            }
            Err(e) => {
                warn!(virtual_model = %vm.name, route = route_name, error = %e, "Failed to sync gateway route");
                ExternalEffect::failed(&e)
            }
        }
    }

    async fn finish(&self, ctx: &RequestContext, id: Uuid) -> Result<Outcome<VirtualModel>> {
        let vm = self.repo.get_by_id(ctx, id).await?;
        let gateway = self.sync_route(ctx, &vm).await;
        Ok(Outcome::new(vm, SyncReport::gateway(gateway)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::{AiServiceBackend, ApiSchema, BackendRef};
    use crate::ports::{GatewayCall, MockAiGateway};
    use crate::store::MemoryStore;

    const NS: &str = "model-serving";

    fn upstream(name: &str, namespace: &str) -> AiServiceBackend {
        AiServiceBackend {
            name: name.into(),
            namespace: namespace.into(),
            schema: ApiSchema::OpenAi,
            backend_ref: BackendRef::envoy(name),
            header_mutation: None,
            labels: BTreeMap::new(),
        }
    }

    fn setup() -> (RequestContext, Arc<MockAiGateway>, VirtualModelService) {
        let ctx = RequestContext::new(Uuid::new_v4()).unwrap();
        let gateway = Arc::new(MockAiGateway::new());
        gateway.seed_service_backend(upstream("openai", NS));
        gateway.seed_service_backend(upstream("anthropic", NS));
        let service =
            VirtualModelService::new(Arc::new(MemoryStore::new()), NS).with_gateway(gateway.clone());
        (ctx, gateway, service)
    }

    fn add(name: &str, weight: i32, priority: i32) -> AddBackend {
        AddBackend {
            backend_name: name.into(),
            backend_namespace: None,
            model_name_override: None,
            weight,
            priority,
        }
    }

    async fn create(service: &VirtualModelService, ctx: &RequestContext, name: &str) -> VirtualModel {
        service
            .create(
                ctx,
                CreateVirtualModel {
                    name: name.into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap()
            .value
    }

    #[tokio::test]
    async fn test_create_makes_empty_route() {
        let (ctx, gateway, service) = setup();
        let vm = create(&service, &ctx, "chat").await;
        let route_name = vm.gateway_route_name.clone().unwrap();
        assert!(route_name.starts_with("vm-"));
        let route = gateway.route(NS, &route_name).unwrap();
        assert_eq!(route.model_name, "chat");
        assert!(route.backends.is_empty());
        assert_eq!(route.labels.get(LABEL_VIRTUAL_MODEL_ID), Some(&vm.id.to_string()));

        let dup = service
            .create(
                &ctx,
                CreateVirtualModel {
                    name: "chat".into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(dup, WeirError::VirtualModelExists);
    }

    #[tokio::test]
    async fn test_add_backend_validation_order() {
        let (ctx, _gateway, service) = setup();
        create(&service, &ctx, "chat").await;

        assert_eq!(
            service.add_backend(&ctx, "chat", add("openai", 101, 0)).await.unwrap_err(),
            WeirError::InvalidTrafficWeight
        );
        assert_eq!(
            service.add_backend(&ctx, "chat", add("openai", 50, -1)).await.unwrap_err(),
            WeirError::InvalidPriority
        );
        assert_eq!(
            service.add_backend(&ctx, "chat", add("", 50, 0)).await.unwrap_err(),
            WeirError::InvalidBackendName
        );
        assert_eq!(
            service.add_backend(&ctx, "chat", add("  ", 50, 0)).await.unwrap_err(),
            WeirError::InvalidBackendName
        );
        assert_eq!(
            service.add_backend(&ctx, "chat", add("cohere", 50, 0)).await.unwrap_err(),
            WeirError::BackendNotFound
        );
        assert_eq!(
            service.add_backend(&ctx, "missing", add("openai", 50, 0)).await.unwrap_err(),
            WeirError::VirtualModelNotFound
        );

        service.add_backend(&ctx, "chat", add("openai", 50, 0)).await.unwrap();
        assert_eq!(
            service.add_backend(&ctx, "chat", add("openai", 20, 1)).await.unwrap_err(),
            WeirError::BackendAlreadyExists
        );
    }

    #[tokio::test]
    async fn test_backends_sync_to_route() {
        let (ctx, gateway, service) = setup();
        let vm = create(&service, &ctx, "chat").await;
        let mut req = add("openai", 70, 0);
        req.model_name_override = Some("gpt-4o".into());
        service.add_backend(&ctx, "chat", req).await.unwrap();
        let outcome = service
            .add_backend(&ctx, "chat", add("anthropic", 30, 1))
            .await
            .unwrap();
        assert_eq!(outcome.sync.gateway, ExternalEffect::Applied);

        let route = gateway.route(NS, vm.gateway_route_name.as_deref().unwrap()).unwrap();
        assert_eq!(route.backends.len(), 2);
        let openai = route.backends.iter().find(|b| b.name == "openai").unwrap();
        assert_eq!(openai.namespace.as_deref(), Some(NS));
        assert_eq!(openai.model_name_override.as_deref(), Some("gpt-4o"));

        // Weight zero drops out of the route but stays registered.
        let anthropic = outcome.value.backend("anthropic").unwrap().id;
        let outcome = service
            .update_backend(&ctx, "chat", anthropic, UpdateBackend { weight: 0, priority: 1 })
            .await
            .unwrap();
        assert_eq!(outcome.value.backends.len(), 2);
        let route = gateway.route(NS, vm.gateway_route_name.as_deref().unwrap()).unwrap();
        assert_eq!(route.backends.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_backend() {
        let (ctx, _gateway, service) = setup();
        create(&service, &ctx, "chat").await;
        assert_eq!(
            service
                .update_backend(&ctx, "chat", Uuid::new_v4(), UpdateBackend { weight: 10, priority: 0 })
                .await
                .unwrap_err(),
            WeirError::BackendNotFound
        );
        assert_eq!(
            service
                .update_backend(&ctx, "chat", Uuid::new_v4(), UpdateBackend { weight: 10, priority: -2 })
                .await
                .unwrap_err(),
            WeirError::InvalidPriority
        );
        assert_eq!(
            service.delete_backend(&ctx, "chat", Uuid::new_v4()).await.unwrap_err(),
            WeirError::BackendNotFound
        );
    }

    #[tokio::test]
    async fn test_delete_backend_of_other_model_is_not_found() {
        let (ctx, _gateway, service) = setup();
        create(&service, &ctx, "chat").await;
        create(&service, &ctx, "code").await;
        let chat = service.add_backend(&ctx, "chat", add("openai", 100, 0)).await.unwrap().value;
        let backend_id = chat.backends[0].id;
        assert_eq!(
            service.delete_backend(&ctx, "code", backend_id).await.unwrap_err(),
            WeirError::BackendNotFound
        );
        let after = service.delete_backend(&ctx, "chat", backend_id).await.unwrap();
        assert!(after.value.backends.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_route_then_rows() {
        let (ctx, gateway, service) = setup();
        let vm = create(&service, &ctx, "chat").await;
        service.add_backend(&ctx, "chat", add("openai", 100, 0)).await.unwrap();

        let outcome = service.delete(&ctx, "chat").await.unwrap();
        assert_eq!(outcome.sync.gateway, ExternalEffect::Applied);
        assert!(gateway.calls().contains(&GatewayCall::DeleteRoute {
            namespace: NS.into(),
            name: vm.gateway_route_name.unwrap(),
        }));
        assert_eq!(service.get(&ctx, "chat").await.unwrap_err(), WeirError::VirtualModelNotFound);
    }

    #[tokio::test]
    async fn test_without_gateway_skips_backend_probe() {
        let ctx = RequestContext::new(Uuid::new_v4()).unwrap();
        let service = VirtualModelService::new(Arc::new(MemoryStore::new()), NS);
        let vm = create(&service, &ctx, "chat").await;
        assert!(vm.gateway_route_name.is_none());
        let outcome = service
            .add_backend(&ctx, "chat", add("anything", 100, 0))
            .await
            .unwrap();
        assert_eq!(outcome.sync.gateway, ExternalEffect::Skipped);
        assert_eq!(service.list_backends(&ctx, "chat").await.unwrap().len(), 1);
    }
}

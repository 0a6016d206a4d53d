//! In-memory implementation of every repository port.
//!
//! Enforces the same uniqueness rules as the SQLite schema so services
//! behave identically against either store. Used by tests and by
//! `database.path = ":memory:"`-style local runs that do not want SQLite.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::domain::{
    InferenceService, ModelVersion, RegisteredModel, ServingEnvironment, TrafficConfig,
    TrafficConfigFilter, TrafficVariant, VirtualModel, VirtualModelBackend,
};
use crate::error::{Result, WeirError};
use crate::ports::{
    InferenceServiceRepository, ModelVersionRepository, RegisteredModelRepository,
    ServingEnvironmentRepository, StoreHealth, TrafficConfigRepository, TrafficVariantRepository,
    VirtualModelRepository,
};

#[derive(Debug, Default)]
struct Tables {
    configs: HashMap<Uuid, TrafficConfig>,
    variants: HashMap<Uuid, TrafficVariant>,
    virtual_models: HashMap<Uuid, VirtualModel>,
    vm_backends: HashMap<Uuid, VirtualModelBackend>,
    inference_services: HashMap<Uuid, InferenceService>,
    environments: HashMap<Uuid, ServingEnvironment>,
    models: HashMap<Uuid, RegisteredModel>,
    versions: HashMap<Uuid, ModelVersion>,
}

impl Tables {
    fn config_in_project(&self, project: Uuid, id: Uuid) -> Option<&TrafficConfig> {
        self.configs.get(&id).filter(|c| c.project_id == project)
    }

    fn variant_in_project(&self, project: Uuid, id: Uuid) -> Option<&TrafficVariant> {
        self.variants
            .get(&id)
            .filter(|v| self.config_in_project(project, v.traffic_config_id).is_some())
    }

    fn vm_in_project(&self, project: Uuid, id: Uuid) -> Option<&VirtualModel> {
        self.virtual_models.get(&id).filter(|vm| vm.project_id == project)
    }

    fn backend_in_project(&self, project: Uuid, id: Uuid) -> Option<&VirtualModelBackend> {
        self.vm_backends
            .get(&id)
            .filter(|b| self.vm_in_project(project, b.virtual_model_id).is_some())
    }

    fn variant_name_taken(&self, variant: &TrafficVariant) -> bool {
        self.variants.values().any(|v| {
            v.id != variant.id
                && v.traffic_config_id == variant.traffic_config_id
                && v.variant_name == variant.variant_name
        })
    }

    /// Joined read of a variant.
    fn hydrate_variant(&self, variant: &TrafficVariant) -> TrafficVariant {
        let mut out = variant.clone();
        out.model_version_name = self.versions.get(&variant.model_version_id).map(|mv| mv.name.clone());
        out
    }

    /// Joined read of a config, without variants.
    fn hydrate_config(&self, config: &TrafficConfig) -> TrafficConfig {
        let mut out = config.clone();
        out.variants.clear();
        out.inference_service_name = self
            .inference_services
            .get(&config.inference_service_id)
            .map(|isvc| isvc.name.clone());
        out
    }

    fn hydrate_vm(&self, vm: &VirtualModel) -> VirtualModel {
        let mut out = vm.clone();
        out.backends = self.backends_of(vm.id);
        out
    }

    fn backends_of(&self, vm_id: Uuid) -> Vec<VirtualModelBackend> {
        let mut backends: Vec<_> = self
            .vm_backends
            .values()
            .filter(|b| b.virtual_model_id == vm_id)
            .cloned()
            .collect();
        backends.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.weight.cmp(&a.weight))
                .then(a.created_at.cmp(&b.created_at))
        });
        backends
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self, ctx: &RequestContext) -> Result<MutexGuard<'_, Tables>> {
        ctx.check()?;
        Ok(self.tables.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl TrafficConfigRepository for MemoryStore {
    async fn create(&self, ctx: &RequestContext, config: &TrafficConfig) -> Result<()> {
        let mut t = self.tables(ctx)?;
        let taken = t.configs.values().any(|c| {
            c.project_id == config.project_id && c.inference_service_id == config.inference_service_id
        });
        if taken || t.configs.contains_key(&config.id) {
            return Err(WeirError::TrafficConfigExists);
        }
        let mut row = config.clone();
        row.variants.clear();
        t.configs.insert(row.id, row);
        Ok(())
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<TrafficConfig> {
        let t = self.tables(ctx)?;
        t.config_in_project(ctx.project_id(), id)
            .map(|c| t.hydrate_config(c))
            .ok_or(WeirError::TrafficConfigNotFound)
    }

    async fn get_by_inference_service(
        &self,
        ctx: &RequestContext,
        inference_service_id: Uuid,
    ) -> Result<TrafficConfig> {
        let t = self.tables(ctx)?;
        t.configs
            .values()
            .find(|c| c.project_id == ctx.project_id() && c.inference_service_id == inference_service_id)
            .map(|c| t.hydrate_config(c))
            .ok_or(WeirError::TrafficConfigNotFound)
    }

    async fn update(&self, ctx: &RequestContext, config: &TrafficConfig) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.config_in_project(ctx.project_id(), config.id).is_none() {
            return Err(WeirError::TrafficConfigNotFound);
        }
        let mut row = config.clone();
        row.variants.clear();
        row.inference_service_name = None;
        t.configs.insert(row.id, row);
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.config_in_project(ctx.project_id(), id).is_none() {
            return Err(WeirError::TrafficConfigNotFound);
        }
        t.configs.remove(&id);
        t.variants.retain(|_, v| v.traffic_config_id != id);
        Ok(())
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &TrafficConfigFilter,
    ) -> Result<(Vec<TrafficConfig>, usize)> {
        let t = self.tables(ctx)?;
        let mut matching: Vec<_> = t
            .configs
            .values()
            .filter(|c| c.project_id == ctx.project_id() && filter.matches(c))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|c| t.hydrate_config(c))
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl TrafficVariantRepository for MemoryStore {
    async fn create(&self, ctx: &RequestContext, variant: &TrafficVariant) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.config_in_project(ctx.project_id(), variant.traffic_config_id).is_none() {
            return Err(WeirError::TrafficConfigNotFound);
        }
        if t.variants.contains_key(&variant.id) || t.variant_name_taken(variant) {
            return Err(WeirError::VariantAlreadyExists);
        }
        let mut row = variant.clone();
        row.model_version_name = None;
        t.variants.insert(row.id, row);
        Ok(())
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<TrafficVariant> {
        let t = self.tables(ctx)?;
        t.variant_in_project(ctx.project_id(), id)
            .map(|v| t.hydrate_variant(v))
            .ok_or(WeirError::TrafficVariantNotFound)
    }

    async fn get_by_name(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        name: &str,
    ) -> Result<TrafficVariant> {
        let t = self.tables(ctx)?;
        if t.config_in_project(ctx.project_id(), config_id).is_none() {
            return Err(WeirError::TrafficVariantNotFound);
        }
        t.variants
            .values()
            .find(|v| v.traffic_config_id == config_id && v.variant_name == name)
            .map(|v| t.hydrate_variant(v))
            .ok_or(WeirError::TrafficVariantNotFound)
    }

    async fn update(&self, ctx: &RequestContext, variant: &TrafficVariant) -> Result<()> {
        self.update_many(ctx, std::slice::from_ref(variant)).await
    }

    async fn update_many(&self, ctx: &RequestContext, variants: &[TrafficVariant]) -> Result<()> {
        let mut t = self.tables(ctx)?;
        for variant in variants {
            if t.variant_in_project(ctx.project_id(), variant.id).is_none() {
                return Err(WeirError::TrafficVariantNotFound);
            }
        }
        // Check names against the final state before touching anything.
        let mut staged = t.variants.clone();
        for variant in variants {
            let mut row = variant.clone();
            row.model_version_name = None;
            staged.insert(row.id, row);
        }
        for variant in variants {
            let clash = staged.values().any(|v| {
                v.id != variant.id
                    && v.traffic_config_id == variant.traffic_config_id
                    && v.variant_name == variant.variant_name
            });
            if clash {
                return Err(WeirError::VariantAlreadyExists);
            }
        }
        t.variants = staged;
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.variant_in_project(ctx.project_id(), id).is_none() {
            return Err(WeirError::TrafficVariantNotFound);
        }
        t.variants.remove(&id);
        Ok(())
    }

    async fn list_by_config(&self, ctx: &RequestContext, config_id: Uuid) -> Result<Vec<TrafficVariant>> {
        let t = self.tables(ctx)?;
        if t.config_in_project(ctx.project_id(), config_id).is_none() {
            return Ok(Vec::new());
        }
        let mut variants: Vec<_> = t
            .variants
            .values()
            .filter(|v| v.traffic_config_id == config_id)
            .map(|v| t.hydrate_variant(v))
            .collect();
        variants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(variants)
    }

    async fn delete_by_config(&self, ctx: &RequestContext, config_id: Uuid) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.config_in_project(ctx.project_id(), config_id).is_none() {
            return Ok(());
        }
        t.variants.retain(|_, v| v.traffic_config_id != config_id);
        Ok(())
    }
}

#[async_trait]
impl VirtualModelRepository for MemoryStore {
    async fn create(&self, ctx: &RequestContext, vm: &VirtualModel) -> Result<()> {
        let mut t = self.tables(ctx)?;
        let taken = t
            .virtual_models
            .values()
            .any(|existing| existing.project_id == vm.project_id && existing.name == vm.name);
        if taken || t.virtual_models.contains_key(&vm.id) {
            return Err(WeirError::VirtualModelExists);
        }
        let mut row = vm.clone();
        row.backends.clear();
        t.virtual_models.insert(row.id, row);
        Ok(())
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<VirtualModel> {
        let t = self.tables(ctx)?;
        t.vm_in_project(ctx.project_id(), id)
            .map(|vm| t.hydrate_vm(vm))
            .ok_or(WeirError::VirtualModelNotFound)
    }

    async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> Result<VirtualModel> {
        let t = self.tables(ctx)?;
        t.virtual_models
            .values()
            .find(|vm| vm.project_id == ctx.project_id() && vm.name == name)
            .map(|vm| t.hydrate_vm(vm))
            .ok_or(WeirError::VirtualModelNotFound)
    }

    async fn update(&self, ctx: &RequestContext, vm: &VirtualModel) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.vm_in_project(ctx.project_id(), vm.id).is_none() {
            return Err(WeirError::VirtualModelNotFound);
        }
        let mut row = vm.clone();
        row.backends.clear();
        t.virtual_models.insert(row.id, row);
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.vm_in_project(ctx.project_id(), id).is_none() {
            return Err(WeirError::VirtualModelNotFound);
        }
        t.vm_backends.retain(|_, b| b.virtual_model_id != id);
        t.virtual_models.remove(&id);
        Ok(())
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Vec<VirtualModel>> {
        let t = self.tables(ctx)?;
        let mut vms: Vec<_> = t
            .virtual_models
            .values()
            .filter(|vm| vm.project_id == ctx.project_id())
            .map(|vm| t.hydrate_vm(vm))
            .collect();
        vms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(vms)
    }

    async fn create_backend(&self, ctx: &RequestContext, backend: &VirtualModelBackend) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.vm_in_project(ctx.project_id(), backend.virtual_model_id).is_none() {
            return Err(WeirError::VirtualModelNotFound);
        }
        let taken = t.vm_backends.values().any(|b| {
            b.virtual_model_id == backend.virtual_model_id && b.backend_name == backend.backend_name
        });
        if taken || t.vm_backends.contains_key(&backend.id) {
            return Err(WeirError::BackendAlreadyExists);
        }
        t.vm_backends.insert(backend.id, backend.clone());
        Ok(())
    }

    async fn update_backend(&self, ctx: &RequestContext, backend: &VirtualModelBackend) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.backend_in_project(ctx.project_id(), backend.id).is_none() {
            return Err(WeirError::BackendNotFound);
        }
        t.vm_backends.insert(backend.id, backend.clone());
        Ok(())
    }

    async fn delete_backend(&self, ctx: &RequestContext, backend_id: Uuid) -> Result<()> {
        let mut t = self.tables(ctx)?;
        if t.backend_in_project(ctx.project_id(), backend_id).is_none() {
            return Err(WeirError::BackendNotFound);
        }
        t.vm_backends.remove(&backend_id);
        Ok(())
    }

    async fn list_backends(
        &self,
        ctx: &RequestContext,
        virtual_model_id: Uuid,
    ) -> Result<Vec<VirtualModelBackend>> {
        let t = self.tables(ctx)?;
        if t.vm_in_project(ctx.project_id(), virtual_model_id).is_none() {
            return Err(WeirError::VirtualModelNotFound);
        }
        Ok(t.backends_of(virtual_model_id))
    }
}

#[async_trait]
impl InferenceServiceRepository for MemoryStore {
    async fn create(&self, ctx: &RequestContext, isvc: &InferenceService) -> Result<()> {
        let mut t = self.tables(ctx)?;
        let taken = t.inference_services.values().any(|existing| {
            existing.project_id == isvc.project_id
                && existing.serving_environment_id == isvc.serving_environment_id
                && existing.name == isvc.name
        });
        if taken {
            return Err(WeirError::InferenceServiceNameConflict);
        }
        t.inference_services.insert(isvc.id, isvc.clone());
        Ok(())
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<InferenceService> {
        let t = self.tables(ctx)?;
        t.inference_services
            .get(&id)
            .filter(|isvc| isvc.project_id == ctx.project_id())
            .cloned()
            .ok_or(WeirError::InferenceServiceNotFound)
    }

    async fn update(&self, ctx: &RequestContext, isvc: &InferenceService) -> Result<()> {
        let mut t = self.tables(ctx)?;
        match t.inference_services.get_mut(&isvc.id) {
            Some(existing) if existing.project_id == ctx.project_id() => {
                *existing = isvc.clone();
                Ok(())
            }
            _ => Err(WeirError::InferenceServiceNotFound),
        }
    }
}

#[async_trait]
impl ServingEnvironmentRepository for MemoryStore {
    async fn create(&self, ctx: &RequestContext, env: &ServingEnvironment) -> Result<()> {
        let mut t = self.tables(ctx)?;
        t.environments.insert(env.id, env.clone());
        Ok(())
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<ServingEnvironment> {
        let t = self.tables(ctx)?;
        t.environments
            .get(&id)
            .filter(|env| env.project_id == ctx.project_id())
            .cloned()
            .ok_or(WeirError::ServingEnvironmentNotFound)
    }
}

#[async_trait]
impl RegisteredModelRepository for MemoryStore {
    async fn create(&self, ctx: &RequestContext, model: &RegisteredModel) -> Result<()> {
        let mut t = self.tables(ctx)?;
        t.models.insert(model.id, model.clone());
        Ok(())
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<RegisteredModel> {
        let t = self.tables(ctx)?;
        t.models
            .get(&id)
            .filter(|m| m.project_id == ctx.project_id())
            .cloned()
            .ok_or(WeirError::RegisteredModelNotFound)
    }
}

#[async_trait]
impl ModelVersionRepository for MemoryStore {
    async fn create(&self, ctx: &RequestContext, version: &ModelVersion) -> Result<()> {
        let mut t = self.tables(ctx)?;
        t.versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<ModelVersion> {
        let t = self.tables(ctx)?;
        t.versions
            .get(&id)
            .filter(|mv| mv.project_id == ctx.project_id())
            .cloned()
            .ok_or(WeirError::ModelVersionNotFound)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self, ctx: &RequestContext) -> Result<()> {
        self.tables(ctx).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrafficStrategy;

    fn ctx() -> RequestContext {
        RequestContext::new(Uuid::new_v4()).unwrap()
    }

    async fn seeded_config(store: &MemoryStore, ctx: &RequestContext) -> TrafficConfig {
        let config =
            TrafficConfig::new(ctx.project_id(), Uuid::new_v4(), TrafficStrategy::Canary).unwrap();
        TrafficConfigRepository::create(store, ctx, &config).await.unwrap();
        config
    }

    #[tokio::test]
    async fn test_one_config_per_inference_service() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let config = seeded_config(&store, &ctx).await;
        let mut dup =
            TrafficConfig::new(ctx.project_id(), config.inference_service_id, TrafficStrategy::AbTest)
                .unwrap();
        dup.id = Uuid::new_v4();
        assert_eq!(
            TrafficConfigRepository::create(&store, &ctx, &dup).await.unwrap_err(),
            WeirError::TrafficConfigExists
        );
    }

    #[tokio::test]
    async fn test_project_isolation() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let config = seeded_config(&store, &ctx).await;
        let other = RequestContext::new(Uuid::new_v4()).unwrap();
        assert_eq!(
            TrafficConfigRepository::get_by_id(&store, &other, config.id)
                .await
                .unwrap_err(),
            WeirError::TrafficConfigNotFound
        );
        let (items, total) = TrafficConfigRepository::list(&store, &other, &TrafficConfigFilter::default())
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_update_many_allows_swap_of_names() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let config = seeded_config(&store, &ctx).await;
        let stable = TrafficVariant::new(config.id, Uuid::new_v4(), "stable", 90).unwrap();
        let canary = TrafficVariant::new(config.id, Uuid::new_v4(), "canary", 10).unwrap();
        TrafficVariantRepository::create(&store, &ctx, &stable).await.unwrap();
        TrafficVariantRepository::create(&store, &ctx, &canary).await.unwrap();

        let mut demoted = stable.clone();
        demoted.rename("old-stable-1");
        demoted.deactivate();
        let mut promoted = canary.clone();
        promoted.rename("stable");
        promoted.apply_weight(100).unwrap();

        store
            .update_many(&ctx, &[demoted.clone(), promoted.clone()])
            .await
            .unwrap();
        let names: Vec<_> = store
            .list_by_config(&ctx, config.id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.variant_name)
            .collect();
        assert!(names.contains(&"stable".to_string()));
        assert!(names.contains(&"old-stable-1".to_string()));
    }

    #[tokio::test]
    async fn test_update_many_is_atomic_on_clash() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let config = seeded_config(&store, &ctx).await;
        let stable = TrafficVariant::new(config.id, Uuid::new_v4(), "stable", 90).unwrap();
        let canary = TrafficVariant::new(config.id, Uuid::new_v4(), "canary", 10).unwrap();
        TrafficVariantRepository::create(&store, &ctx, &stable).await.unwrap();
        TrafficVariantRepository::create(&store, &ctx, &canary).await.unwrap();

        let mut reweighted = stable.clone();
        reweighted.set_weight(50).unwrap();
        let mut clashing = canary.clone();
        clashing.rename("stable");

        assert_eq!(
            store.update_many(&ctx, &[reweighted, clashing]).await.unwrap_err(),
            WeirError::VariantAlreadyExists
        );
        let current = TrafficVariantRepository::get_by_name(&store, &ctx, config.id, "stable")
            .await
            .unwrap();
        assert_eq!(current.weight, 90);
    }

    #[tokio::test]
    async fn test_backend_name_unique_per_vm() {
        let store = MemoryStore::new();
        let ctx = ctx();
        let vm = VirtualModel::new(ctx.project_id(), "chat").unwrap();
        VirtualModelRepository::create(&store, &ctx, &vm).await.unwrap();
        let backend = VirtualModelBackend::new(vm.id, "openai", 50, 0).unwrap();
        store.create_backend(&ctx, &backend).await.unwrap();
        let dup = VirtualModelBackend::new(vm.id, "openai", 50, 1).unwrap();
        assert_eq!(
            store.create_backend(&ctx, &dup).await.unwrap_err(),
            WeirError::BackendAlreadyExists
        );

        VirtualModelRepository::delete(&store, &ctx, vm.id).await.unwrap();
        assert_eq!(
            store.list_backends(&ctx, vm.id).await.unwrap_err(),
            WeirError::VirtualModelNotFound
        );
    }

    #[tokio::test]
    async fn test_cancelled_context_rejected() {
        let store = MemoryStore::new();
        let ctx = ctx();
        ctx.cancellation_token().cancel();
        assert_eq!(store.ping(&ctx).await.unwrap_err(), WeirError::Cancelled);
    }
}

//! Traffic management: canary rollouts, A/B variants, promotion, and
//! rollback for one inference service at a time.
//!
//! Every mutation runs under the config's keyed lock and follows the same
//! order: validate, persist, then call the serving runtime, then resync the
//! gateway route from the persisted variants. A failing deploy aborts the
//! operation before anything is written. Undeploys and route syncs after
//! the commit are best effort and reported through [`SyncReport`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lock::{KeyedLock, config_key, inference_service_key};
use super::outcome::{ExternalEffect, Outcome, SyncReport};
use crate::context::RequestContext;
use crate::domain::traffic::{
    CANARY_VARIANT, STABLE_VARIANT, clamp_canary_weight, validate_variant_name,
};
use crate::domain::{
    GatewayRoute, InferenceService, MAX_WEIGHT, ModelVersion, TrafficConfig, TrafficConfigFilter,
    TrafficStrategy, TrafficVariant, WeightedBackend, validate_weight,
};
use crate::error::{Result, WeirError};
use crate::ports::{
    AiGateway, InferenceServiceRepository, ModelVersionRepository, ServingEnvironmentRepository,
    ServingRuntime, TrafficConfigRepository, TrafficVariantRepository,
};

/// Label put on routes owned by a traffic config.
pub const LABEL_TRAFFIC_CONFIG_ID: &str = "traffic-config-id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTrafficConfig {
    pub inference_service_id: Uuid,
    #[serde(default)]
    pub strategy: TrafficStrategy,
    pub stable_version_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCanary {
    pub version_id: Uuid,
    #[serde(default)]
    pub initial_weight: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVariant {
    pub name: String,
    pub version_id: Uuid,
    pub weight: i32,
}

/// Where a config's inference service runs.
struct Placement {
    isvc: InferenceService,
    namespace: String,
}

pub struct TrafficService {
    configs: Arc<dyn TrafficConfigRepository>,
    variants: Arc<dyn TrafficVariantRepository>,
    inference_services: Arc<dyn InferenceServiceRepository>,
    environments: Arc<dyn ServingEnvironmentRepository>,
    versions: Arc<dyn ModelVersionRepository>,
    runtime: Option<Arc<dyn ServingRuntime>>,
    gateway: Option<Arc<dyn AiGateway>>,
    locks: KeyedLock,
}

impl TrafficService {
    pub fn new(
        configs: Arc<dyn TrafficConfigRepository>,
        variants: Arc<dyn TrafficVariantRepository>,
        inference_services: Arc<dyn InferenceServiceRepository>,
        environments: Arc<dyn ServingEnvironmentRepository>,
        versions: Arc<dyn ModelVersionRepository>,
    ) -> Self {
        Self {
            configs,
            variants,
            inference_services,
            environments,
            versions,
            runtime: None,
            gateway: None,
            locks: KeyedLock::new(),
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ServingRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn AiGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    fn runtime(&self) -> Option<&Arc<dyn ServingRuntime>> {
        self.runtime.as_ref().filter(|r| r.is_available())
    }

    fn gateway(&self) -> Option<&Arc<dyn AiGateway>> {
        self.gateway.as_ref().filter(|g| g.is_available())
    }

    // --- Reads ---

    /// Load a config with its variants.
    pub async fn get_config(&self, ctx: &RequestContext, config_id: Uuid) -> Result<TrafficConfig> {
        let mut config = self.configs.get_by_id(ctx, config_id).await?;
        config.variants = self.variants.list_by_config(ctx, config_id).await?;
        Ok(config)
    }

    pub async fn get_config_by_inference_service(
        &self,
        ctx: &RequestContext,
        inference_service_id: Uuid,
    ) -> Result<TrafficConfig> {
        let config = self
            .configs
            .get_by_inference_service(ctx, inference_service_id)
            .await?;
        self.get_config(ctx, config.id).await
    }

    pub async fn list_configs(
        &self,
        ctx: &RequestContext,
        filter: &TrafficConfigFilter,
    ) -> Result<(Vec<TrafficConfig>, usize)> {
        let (mut configs, total) = self.configs.list(ctx, filter).await?;
        for config in &mut configs {
            config.variants = self.variants.list_by_config(ctx, config.id).await?;
        }
        Ok((configs, total))
    }

    pub async fn list_variants(&self, ctx: &RequestContext, config_id: Uuid) -> Result<Vec<TrafficVariant>> {
        Ok(self.get_config(ctx, config_id).await?.variants)
    }

    pub async fn get_variant(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        name: &str,
    ) -> Result<TrafficVariant> {
        self.configs.get_by_id(ctx, config_id).await?;
        self.variants.get_by_name(ctx, config_id, name).await
    }

    // --- Config lifecycle ---

    /// Create a config for an inference service with a single `stable`
    /// variant at weight 100, and a gateway route when one is available.
    pub async fn create_config(
        &self,
        ctx: &RequestContext,
        req: CreateTrafficConfig,
    ) -> Result<Outcome<TrafficConfig>> {
        let _guard = self
            .locks
            .acquire(inference_service_key(ctx.project_id(), req.inference_service_id))
            .await;

        let isvc = self
            .inference_services
            .get_by_id(ctx, req.inference_service_id)
            .await?;
        let version = self.versions.get_by_id(ctx, req.stable_version_id).await?;

        let mut config = TrafficConfig::new(ctx.project_id(), isvc.id, req.strategy)?;
        self.configs.create(ctx, &config).await?;

        let mut stable = TrafficVariant::new(config.id, version.id, STABLE_VARIANT, MAX_WEIGHT)?
            .with_runtime_resource(&isvc.name);
        stable.activate();
        self.variants.create(ctx, &stable).await?;

        info!(
            config_id = %config.id,
            inference_service = %isvc.name,
            strategy = %config.strategy,
            "Created traffic config"
        );

        let gateway = match self.gateway() {
            None => ExternalEffect::Skipped,
            Some(gateway) => {
                let route_name = config.default_route_name();
                match self.create_route(ctx, gateway, &config, &isvc, &route_name).await {
                    Ok(()) => {
                        config.gateway_route_name = Some(route_name);
                        self.configs.update(ctx, &config).await?;
                        ExternalEffect::Applied
                    }
                    Err(e) => {
                        warn!(config_id = %config.id, error = %e, "Failed to create gateway route");
                        ExternalEffect::failed(&e)
                    }
                }
            }
        };

        let config = self.get_config(ctx, config.id).await?;
        Ok(Outcome::new(config, SyncReport::gateway(gateway)))
    }

    async fn create_route(
        &self,
        ctx: &RequestContext,
        gateway: &Arc<dyn AiGateway>,
        config: &TrafficConfig,
        isvc: &InferenceService,
        route_name: &str,
    ) -> Result<()> {
        let namespace = self.namespace_of(ctx, isvc).await?;
        let route = GatewayRoute::new(route_name, namespace, &isvc.name)
            .with_label(LABEL_TRAFFIC_CONFIG_ID, config.id.to_string())
            .with_backends(vec![WeightedBackend::variant(
                &isvc.name,
                MAX_WEIGHT,
                STABLE_VARIANT,
            )]);
        gateway.create_route(ctx, &route).await
    }

    /// Delete a config: best-effort route removal, then its variants, then
    /// the config itself.
    pub async fn delete_config(&self, ctx: &RequestContext, config_id: Uuid) -> Result<Outcome<()>> {
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.configs.get_by_id(ctx, config_id).await?;

        let gateway = match (self.gateway(), config.gateway_route_name.as_deref()) {
            (Some(gateway), Some(route_name)) => {
                match self.delete_route(ctx, gateway, &config, route_name).await {
                    Ok(()) => ExternalEffect::Applied,
                    Err(e) => {
                        warn!(config_id = %config_id, route = route_name, error = %e, "Failed to delete gateway route");
                        ExternalEffect::failed(&e)
                    }
                }
            }
            _ => ExternalEffect::Skipped,
        };

        self.variants.delete_by_config(ctx, config_id).await?;
        self.configs.delete(ctx, config_id).await?;
        info!(config_id = %config_id, "Deleted traffic config");
        Ok(Outcome::new((), SyncReport::gateway(gateway)))
    }

    async fn delete_route(
        &self,
        ctx: &RequestContext,
        gateway: &Arc<dyn AiGateway>,
        config: &TrafficConfig,
        route_name: &str,
    ) -> Result<()> {
        let placement = self.placement(ctx, config).await?;
        gateway.delete_route(ctx, &placement.namespace, route_name).await
    }

    // --- Canary workflow ---

    /// Deploy `version` as the `canary` variant and shift the clamped
    /// initial weight away from stable.
    pub async fn start_canary(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        req: StartCanary,
    ) -> Result<Outcome<TrafficConfig>> {
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.get_config(ctx, config_id).await?;

        if config.has_active_canary() {
            return Err(WeirError::CanaryAlreadyExists);
        }
        let mut stable = config.stable().cloned().ok_or(WeirError::NoStableVariant)?;
        let version = self.deployable_version(ctx, req.version_id).await?;

        let weight = clamp_canary_weight(req.initial_weight);
        let stable_weight = MAX_WEIGHT - weight - config.weight_excluding(&[STABLE_VARIANT, CANARY_VARIANT]);
        if stable_weight < 0 {
            return Err(WeirError::WeightSumExceeds100);
        }

        let placement = self.placement(ctx, &config).await?;
        let previous = config.variant(CANARY_VARIANT);
        if let Some(previous) = previous {
            // A canary zeroed through a plain weight update is still deployed.
            self.release(ctx, &config, previous).await;
        }
        let resource_name = config.free_resource_name(
            &format!("{}-{CANARY_VARIANT}", placement.isvc.name),
            previous.map(|v| v.id),
        );
        let runtime = self
            .deploy(ctx, &placement, &resource_name, &version)
            .await
            .inspect_err(|e| warn!(config_id = %config_id, error = %e, "Canary deploy failed"))?;

        // An earlier, rolled-back canary row is reused.
        let (mut canary, existing) = match previous {
            Some(previous) => (previous.clone(), true),
            None => (
                TrafficVariant::new(config_id, version.id, CANARY_VARIANT, weight)?,
                false,
            ),
        };
        canary.model_version_id = version.id;
        canary.runtime_resource_name = resource_name;
        canary.apply_weight(weight)?;
        stable.apply_weight(stable_weight)?;

        if existing {
            self.variants.update_many(ctx, &[canary, stable]).await?;
        } else {
            self.variants.create(ctx, &canary).await?;
            self.variants.update(ctx, &stable).await?;
        }

        info!(
            config_id = %config_id,
            version_id = %version.id,
            canary_weight = weight,
            "Started canary"
        );
        self.finish(ctx, config_id, runtime).await
    }

    /// Move traffic between the canary and stable variants.
    pub async fn update_canary_weight(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        weight: i32,
    ) -> Result<Outcome<TrafficConfig>> {
        validate_weight(weight)?;
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.get_config(ctx, config_id).await?;

        let mut canary = config
            .variant(CANARY_VARIANT)
            .filter(|v| v.is_active())
            .cloned()
            .ok_or(WeirError::TrafficVariantNotFound)?;
        let mut stable = config.stable().cloned().ok_or(WeirError::NoStableVariant)?;

        let stable_weight = MAX_WEIGHT - weight - config.weight_excluding(&[STABLE_VARIANT, CANARY_VARIANT]);
        if stable_weight < 0 {
            return Err(WeirError::WeightSumExceeds100);
        }
        canary.set_weight(weight)?;
        stable.apply_weight(stable_weight)?;
        self.variants.update_many(ctx, &[canary, stable]).await?;

        info!(config_id = %config_id, canary_weight = weight, "Updated canary weight");
        self.finish(ctx, config_id, ExternalEffect::Skipped).await
    }

    /// Make the canary the new stable. The previous stable is kept as an
    /// inactive `old-stable-<epoch>` variant.
    pub async fn promote_canary(&self, ctx: &RequestContext, config_id: Uuid) -> Result<Outcome<TrafficConfig>> {
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.get_config(ctx, config_id).await?;

        let canary = config
            .variant(CANARY_VARIANT)
            .filter(|v| v.is_active())
            .cloned()
            .ok_or(WeirError::CannotPromoteInactive)?;
        let stable = config.stable().cloned().ok_or(WeirError::NoStableVariant)?;
        let others = config.weight_excluding(&[STABLE_VARIANT, CANARY_VARIANT]);

        let (demoted, promoted) = swap_stable(&config, stable, canary, MAX_WEIGHT - others)?;
        let old_name = demoted.variant_name.clone();
        self.variants.update_many(ctx, &[demoted, promoted]).await?;

        info!(config_id = %config_id, demoted_to = %old_name, "Promoted canary to stable");
        self.finish(ctx, config_id, ExternalEffect::Skipped).await
    }

    /// Abandon the canary: deactivate it, restore stable's share, and tear
    /// down the canary's runtime resource. A canary already at zero is
    /// still torn down.
    pub async fn rollback(&self, ctx: &RequestContext, config_id: Uuid) -> Result<Outcome<TrafficConfig>> {
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.get_config(ctx, config_id).await?;

        let mut stable = config.stable().cloned().ok_or(WeirError::NoStableVariant)?;
        let canary = config.variant(CANARY_VARIANT);

        let mut updates = Vec::with_capacity(2);
        if let Some(canary) = canary {
            let mut canary = canary.clone();
            canary.deactivate();
            updates.push(canary);
        }
        stable.apply_weight(MAX_WEIGHT - config.weight_excluding(&[STABLE_VARIANT, CANARY_VARIANT]))?;
        updates.push(stable);
        self.variants.update_many(ctx, &updates).await?;

        let runtime = match canary {
            Some(canary) => self.release(ctx, &config, canary).await,
            None => ExternalEffect::Skipped,
        };

        info!(config_id = %config_id, "Rolled back canary");
        self.finish(ctx, config_id, runtime).await
    }

    // --- Generic variants ---

    /// Add a named variant (A/B testing). Weight 0 leaves it pending.
    pub async fn add_variant(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        req: AddVariant,
    ) -> Result<Outcome<TrafficConfig>> {
        validate_weight(req.weight)?;
        validate_variant_name(&req.name)?;
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.get_config(ctx, config_id).await?;

        if config.has_variant(&req.name) {
            return Err(WeirError::VariantAlreadyExists);
        }
        let version = self.deployable_version(ctx, req.version_id).await?;
        if config.total_weight() + req.weight > MAX_WEIGHT {
            return Err(WeirError::WeightSumExceeds100);
        }

        let placement = self.placement(ctx, &config).await?;
        let resource_name =
            config.free_resource_name(&format!("{}-{}", placement.isvc.name, req.name), None);
        let runtime = self
            .deploy(ctx, &placement, &resource_name, &version)
            .await
            .inspect_err(|e| warn!(config_id = %config_id, variant = %req.name, error = %e, "Variant deploy failed"))?;

        let mut variant = TrafficVariant::new(config_id, version.id, &req.name, req.weight)?
            .with_runtime_resource(resource_name);
        if req.weight > 0 {
            variant.activate();
        }
        self.variants.create(ctx, &variant).await?;

        info!(config_id = %config_id, variant = %req.name, weight = req.weight, "Added variant");
        self.finish(ctx, config_id, runtime).await
    }

    /// Set one variant's weight. Zero deactivates it.
    pub async fn update_variant(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        name: &str,
        weight: i32,
    ) -> Result<Outcome<TrafficConfig>> {
        validate_weight(weight)?;
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.get_config(ctx, config_id).await?;

        let mut variant = config
            .variant(name)
            .cloned()
            .ok_or(WeirError::TrafficVariantNotFound)?;
        let current = if variant.is_active() { variant.weight } else { 0 };
        if config.total_weight() - current + weight > MAX_WEIGHT {
            return Err(WeirError::WeightSumExceeds100);
        }
        variant.apply_weight(weight)?;
        self.variants.update(ctx, &variant).await?;

        info!(config_id = %config_id, variant = name, weight, "Updated variant weight");
        self.finish(ctx, config_id, ExternalEffect::Skipped).await
    }

    /// Remove a non-stable variant and, unless the inference service itself
    /// or another variant still runs on it, its runtime resource.
    pub async fn delete_variant(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        name: &str,
    ) -> Result<Outcome<TrafficConfig>> {
        if name == STABLE_VARIANT {
            return Err(WeirError::CannotDeleteStable);
        }
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.get_config(ctx, config_id).await?;

        let variant = config
            .variant(name)
            .cloned()
            .ok_or(WeirError::TrafficVariantNotFound)?;
        self.variants.delete(ctx, variant.id).await?;
        let runtime = self.release(ctx, &config, &variant).await;

        info!(config_id = %config_id, variant = name, "Deleted variant");
        self.finish(ctx, config_id, runtime).await
    }

    /// Set several weights in one transaction and resync once.
    pub async fn bulk_update_weights(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        weights: &BTreeMap<String, i32>,
    ) -> Result<Outcome<TrafficConfig>> {
        for weight in weights.values() {
            validate_weight(*weight)?;
        }
        if weights.values().sum::<i32>() > MAX_WEIGHT {
            return Err(WeirError::WeightSumExceeds100);
        }
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let mut config = self.get_config(ctx, config_id).await?;

        let mut updates = Vec::with_capacity(weights.len());
        for (name, weight) in weights {
            let variant = config
                .variant_mut(name)
                .ok_or(WeirError::TrafficVariantNotFound)
                .inspect_err(|_| debug!(config_id = %config_id, variant = %name, "Unknown variant in bulk update"))?;
            variant.apply_weight(*weight)?;
            updates.push(variant.clone());
        }
        config.validate_weights()?;
        self.variants.update_many(ctx, &updates).await?;

        info!(config_id = %config_id, variants = weights.len(), "Bulk-updated variant weights");
        self.finish(ctx, config_id, ExternalEffect::Skipped).await
    }

    /// Make a named, active variant the new stable and deactivate all
    /// others.
    pub async fn promote_variant(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        name: &str,
    ) -> Result<Outcome<TrafficConfig>> {
        if name == STABLE_VARIANT {
            return Err(WeirError::CannotPromoteStable);
        }
        let _guard = self.locks.acquire(config_key(config_id)).await;
        let config = self.get_config(ctx, config_id).await?;

        let target = config
            .variant(name)
            .cloned()
            .ok_or(WeirError::TrafficVariantNotFound)?;
        if !target.is_active() {
            return Err(WeirError::CannotPromoteInactive);
        }
        let stable = config.stable().cloned().ok_or(WeirError::NoStableVariant)?;

        let (demoted, promoted) = swap_stable(&config, stable, target, MAX_WEIGHT)?;
        let skip = [demoted.id, promoted.id];
        let mut updates = vec![demoted];
        updates.extend(
            config
                .variants
                .iter()
                .filter(|v| v.is_active() && !skip.contains(&v.id))
                .cloned()
                .map(|mut v| {
                    v.deactivate();
                    v
                }),
        );
        updates.push(promoted);
        self.variants.update_many(ctx, &updates).await?;

        info!(config_id = %config_id, variant = name, "Promoted variant to stable");
        self.finish(ctx, config_id, ExternalEffect::Skipped).await
    }

    // --- Helpers ---

    /// A version that is about to get its own runtime resource must be
    /// `READY`.
    async fn deployable_version(&self, ctx: &RequestContext, version_id: Uuid) -> Result<ModelVersion> {
        let version = self.versions.get_by_id(ctx, version_id).await?;
        if !version.is_ready() {
            return Err(WeirError::VersionNotReady);
        }
        Ok(version)
    }

    async fn placement(&self, ctx: &RequestContext, config: &TrafficConfig) -> Result<Placement> {
        let isvc = self
            .inference_services
            .get_by_id(ctx, config.inference_service_id)
            .await?;
        let namespace = self.namespace_of(ctx, &isvc).await?;
        Ok(Placement { isvc, namespace })
    }

    async fn namespace_of(&self, ctx: &RequestContext, isvc: &InferenceService) -> Result<String> {
        let env = self
            .environments
            .get_by_id(ctx, isvc.serving_environment_id)
            .await?;
        Ok(env.namespace().to_string())
    }

    /// Deploy `version` as `resource_name` next to the config's inference
    /// service. Errors abort the caller.
    async fn deploy(
        &self,
        ctx: &RequestContext,
        placement: &Placement,
        resource_name: &str,
        version: &ModelVersion,
    ) -> Result<ExternalEffect> {
        let Some(runtime) = self.runtime() else {
            debug!(resource = resource_name, "Serving runtime unavailable, skipping deploy");
            return Ok(ExternalEffect::Skipped);
        };
        let descriptor = placement.isvc.sibling(resource_name);
        let deployment = runtime
            .deploy(ctx, &placement.namespace, &descriptor, version)
            .await?;
        debug!(
            resource = resource_name,
            namespace = %placement.namespace,
            external_id = %deployment.external_id,
            "Deployed runtime resource"
        );
        Ok(ExternalEffect::Applied)
    }

    /// Best-effort teardown of `variant`'s runtime resource. `config` is the
    /// state before the variant was removed or deactivated. A resource that
    /// is already gone counts as torn down.
    async fn release(&self, ctx: &RequestContext, config: &TrafficConfig, variant: &TrafficVariant) -> ExternalEffect {
        let Some(runtime) = self.runtime() else {
            return ExternalEffect::Skipped;
        };
        let resource_name = variant.runtime_resource_name.as_str();
        let result: Result<ExternalEffect> = async {
            let placement = self.placement(ctx, config).await?;
            if !config.can_release_resource(variant, &placement.isvc.name) {
                debug!(config_id = %config.id, resource = resource_name, "Runtime resource still in use, keeping it");
                return Ok(ExternalEffect::Skipped);
            }
            match runtime.undeploy(ctx, &placement.namespace, resource_name).await {
                Ok(()) => Ok(ExternalEffect::Applied),
                Err(WeirError::InferenceServiceNotFound) => {
                    debug!(config_id = %config.id, resource = resource_name, "Runtime resource already gone");
                    Ok(ExternalEffect::Applied)
                }
                Err(e) => Err(e),
            }
        }
        .await;
        result.unwrap_or_else(|e| {
            warn!(config_id = %config.id, resource = resource_name, error = %e, "Failed to undeploy runtime resource");
            ExternalEffect::failed(&e)
        })
    }

    /// Rebuild the route's backend list from the persisted variants.
    async fn sync_route(&self, ctx: &RequestContext, config: &TrafficConfig) -> ExternalEffect {
        let (Some(gateway), Some(route_name)) = (self.gateway(), config.gateway_route_name.as_deref())
        else {
            return ExternalEffect::Skipped;
        };
        let backends = config.weighted_backends();
        let result: Result<()> = async {
            let placement = self.placement(ctx, config).await?;
            gateway
                .update_traffic_weights(ctx, &placement.namespace, route_name, &backends)
                .await
        }
        .await;
        match result {
            Ok(()) => {
                debug!(config_id = %config.id, route = route_name, backends = backends.len(), "Synced gateway route");
                ExternalEffect::Applied
            }
            Err(e) => {
                warn!(config_id = %config.id, route = route_name, error = %e, "Failed to sync gateway route");
                ExternalEffect::failed(&e)
            }
        }
    }

    /// Reload the committed config, resync its route, and package the
    /// outcome.
    async fn finish(
        &self,
        ctx: &RequestContext,
        config_id: Uuid,
        runtime: ExternalEffect,
    ) -> Result<Outcome<TrafficConfig>> {
        let config = self.get_config(ctx, config_id).await?;
        let gateway = self.sync_route(ctx, &config).await;
        Ok(Outcome::new(config, SyncReport { runtime, gateway }))
    }
}

/// Demote `stable` to an `old-stable-<epoch>` name and promote `target` to
/// `stable` carrying `weight`.
fn swap_stable(
    config: &TrafficConfig,
    mut stable: TrafficVariant,
    mut target: TrafficVariant,
    weight: i32,
) -> Result<(TrafficVariant, TrafficVariant)> {
    let old_name = config.next_old_stable_name(Utc::now().timestamp());
    stable.rename(old_name);
    stable.deactivate();
    target.rename(STABLE_VARIANT);
    target.apply_weight(weight)?;
    target.activate();
    Ok((stable, target))
}

//! End-to-end control-plane scenarios against the in-memory store and the
//! mock runtime and gateway.

mod common;

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use weir_core::domain::traffic::VariantStatus;
use weir_core::domain::{AiServiceBackend, ApiSchema, BackendRef, WeightedBackend};
use weir_core::ports::{GatewayCall, MockAiGateway, RuntimeCall};
use weir_core::service::{
    AddBackend, AddVariant, CreateVirtualModel, ExternalEffect, StartCanary,
};
use weir_core::WeirError;

use common::{GATEWAY_NAMESPACE, Harness, NAMESPACE, weights};

fn pairs(items: &[(&str, i32)]) -> Vec<(String, i32)> {
    items.iter().map(|(n, w)| (n.to_string(), *w)).collect()
}

// --- S1: canary lifecycle ---

#[tokio::test]
async fn canary_lifecycle() {
    let h = Harness::new().await;
    let config = h.create_config().await;
    let route = config.gateway_route_name.clone().unwrap();
    let traffic = &h.services.traffic;

    let started = traffic
        .start_canary(
            &h.ctx,
            config.id,
            StartCanary {
                version_id: h.v2.id,
                initial_weight: 20,
            },
        )
        .await
        .unwrap();
    assert_eq!(weights(&started.value), pairs(&[("canary", 20), ("stable", 80)]));
    let mut backends = h.gateway.route(NAMESPACE, &route).unwrap().backends;
    backends.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        backends,
        vec![
            WeightedBackend::variant("llama", 80, "stable"),
            WeightedBackend::variant("llama-canary", 20, "canary"),
        ]
    );

    let updated = traffic.update_canary_weight(&h.ctx, config.id, 50).await.unwrap();
    assert_eq!(weights(&updated.value), pairs(&[("canary", 50), ("stable", 50)]));

    let promoted = traffic.promote_canary(&h.ctx, config.id).await.unwrap().value;
    let stable = promoted.stable().unwrap();
    assert_eq!(stable.model_version_id, h.v2.id);
    assert_eq!(stable.weight, 100);
    let old: Vec<_> = promoted
        .variants
        .iter()
        .filter(|v| v.variant_name.starts_with("old-stable-"))
        .collect();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].weight, 0);
    assert_eq!(old[0].status, VariantStatus::Inactive);
    assert_eq!(old[0].model_version_id, h.v1.id);

    let backends = h.gateway.route(NAMESPACE, &route).unwrap().backends;
    assert_eq!(backends, vec![WeightedBackend::variant("llama-canary", 100, "stable")]);
}

// --- S2: rollback ---

#[tokio::test]
async fn rollback_restores_stable() {
    let h = Harness::new().await;
    let config = h.create_config().await;
    let route = config.gateway_route_name.clone().unwrap();
    h.services
        .traffic
        .start_canary(
            &h.ctx,
            config.id,
            StartCanary {
                version_id: h.v2.id,
                initial_weight: 20,
            },
        )
        .await
        .unwrap();

    let rolled = h.services.traffic.rollback(&h.ctx, config.id).await.unwrap();
    assert_eq!(weights(&rolled.value), pairs(&[("canary", 0), ("stable", 100)]));
    assert_eq!(
        rolled.value.variant("canary").unwrap().status,
        VariantStatus::Inactive
    );
    assert!(h.runtime.calls().contains(&RuntimeCall::Undeploy {
        namespace: NAMESPACE.into(),
        name: "llama-canary".into(),
    }));
    assert_eq!(
        h.gateway.route(NAMESPACE, &route).unwrap().backends,
        vec![WeightedBackend::variant("llama", 100, "stable")]
    );
    assert_eq!(rolled.sync.runtime, ExternalEffect::Applied);
    assert_eq!(rolled.sync.gateway, ExternalEffect::Applied);
}

// --- S3: multi-variant A/B ---

#[tokio::test]
async fn ab_variants_and_bulk_weights() {
    let h = Harness::new().await;
    let config = h.create_config().await;
    let route = config.gateway_route_name.clone().unwrap();
    let traffic = &h.services.traffic;

    let err = traffic
        .add_variant(
            &h.ctx,
            config.id,
            AddVariant {
                name: "blue".into(),
                version_id: h.v3.id,
                weight: 30,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, WeirError::WeightSumExceeds100);

    for (name, version) in [("blue", h.v2.id), ("green", h.v3.id)] {
        traffic
            .add_variant(
                &h.ctx,
                config.id,
                AddVariant {
                    name: name.into(),
                    version_id: version,
                    weight: 0,
                },
            )
            .await
            .unwrap();
    }

    let bulk = BTreeMap::from([
        ("stable".to_string(), 50),
        ("blue".to_string(), 30),
        ("green".to_string(), 20),
    ]);
    let calls_before = h.gateway.calls().len();
    let outcome = traffic
        .bulk_update_weights(&h.ctx, config.id, &bulk)
        .await
        .unwrap();
    assert_eq!(
        weights(&outcome.value),
        pairs(&[("blue", 30), ("green", 20), ("stable", 50)])
    );
    assert_eq!(outcome.value.total_weight(), 100);
    assert_eq!(h.gateway.route(NAMESPACE, &route).unwrap().backends.len(), 3);

    // One gateway sync for the whole batch.
    assert_eq!(h.gateway.calls().len(), calls_before + 1);
}

// --- S4: protected stable ---

#[tokio::test]
async fn stable_is_protected() {
    let h = Harness::new().await;
    let config = h.create_config().await;
    let traffic = &h.services.traffic;

    assert_eq!(
        traffic.delete_variant(&h.ctx, config.id, "stable").await.unwrap_err(),
        WeirError::CannotDeleteStable
    );
    assert_eq!(
        traffic.promote_variant(&h.ctx, config.id, "stable").await.unwrap_err(),
        WeirError::CannotPromoteStable
    );
    let after = traffic.get_config(&h.ctx, config.id).await.unwrap();
    assert_eq!(weights(&after), pairs(&[("stable", 100)]));
}

#[tokio::test]
async fn promote_variant_deactivates_others() {
    let h = Harness::new().await;
    let config = h.create_config().await;
    let traffic = &h.services.traffic;
    traffic.update_variant(&h.ctx, config.id, "stable", 40).await.unwrap();
    for (name, version, weight) in [("blue", h.v2.id, 30), ("green", h.v3.id, 30)] {
        traffic
            .add_variant(
                &h.ctx,
                config.id,
                AddVariant {
                    name: name.into(),
                    version_id: version,
                    weight,
                },
            )
            .await
            .unwrap();
    }

    let promoted = traffic.promote_variant(&h.ctx, config.id, "blue").await.unwrap().value;
    let stable = promoted.stable().unwrap();
    assert_eq!(stable.model_version_id, h.v2.id);
    assert_eq!(stable.weight, 100);
    assert_eq!(promoted.variant("green").unwrap().status, VariantStatus::Inactive);
    assert_eq!(promoted.total_weight(), 100);
    assert_eq!(promoted.weighted_backends().len(), 1);
}

#[tokio::test]
async fn delete_variant_tears_down_resource() {
    let h = Harness::new().await;
    let config = h.create_config().await;
    let traffic = &h.services.traffic;
    traffic.update_variant(&h.ctx, config.id, "stable", 70).await.unwrap();
    traffic
        .add_variant(
            &h.ctx,
            config.id,
            AddVariant {
                name: "blue".into(),
                version_id: h.v2.id,
                weight: 30,
            },
        )
        .await
        .unwrap();
    assert!(h.runtime.is_deployed(NAMESPACE, "llama-blue"));

    let outcome = traffic.delete_variant(&h.ctx, config.id, "blue").await.unwrap();
    assert!(!outcome.value.has_variant("blue"));
    assert!(!h.runtime.is_deployed(NAMESPACE, "llama-blue"));
    assert_eq!(outcome.sync.runtime, ExternalEffect::Applied);
}

// --- S5: virtual model fan-out ---

fn upstream(name: &str) -> AiServiceBackend {
    AiServiceBackend {
        name: name.into(),
        namespace: GATEWAY_NAMESPACE.into(),
        schema: ApiSchema::OpenAi,
        backend_ref: BackendRef::envoy(name),
        header_mutation: None,
        labels: BTreeMap::new(),
    }
}

#[tokio::test]
async fn virtual_model_fan_out() {
    let h = Harness::new().await;
    h.gateway.seed_service_backend(upstream("openai-svc"));
    h.gateway.seed_service_backend(upstream("anthropic-svc"));
    let vms = &h.services.virtual_models;

    let vm = vms
        .create(
            &h.ctx,
            CreateVirtualModel {
                name: "gpt-compat".into(),
                description: "OpenAI-compatible chat".into(),
            },
        )
        .await
        .unwrap()
        .value;
    let route = vm.gateway_route_name.clone().unwrap();
    assert_eq!(route, format!("vm-{}", &vm.id.simple().to_string()[..8]));
    assert!(h.gateway.route(GATEWAY_NAMESPACE, &route).unwrap().backends.is_empty());

    vms.add_backend(
        &h.ctx,
        "gpt-compat",
        AddBackend {
            backend_name: "openai-svc".into(),
            backend_namespace: None,
            model_name_override: Some("gpt-4".into()),
            weight: 70,
            priority: 0,
        },
    )
    .await
    .unwrap();
    vms.add_backend(
        &h.ctx,
        "gpt-compat",
        AddBackend {
            backend_name: "anthropic-svc".into(),
            backend_namespace: None,
            model_name_override: None,
            weight: 30,
            priority: 1,
        },
    )
    .await
    .unwrap();

    let mut backends = h.gateway.route(GATEWAY_NAMESPACE, &route).unwrap().backends;
    backends.sort_by_key(|b| b.priority);
    let summary: Vec<_> = backends
        .iter()
        .map(|b| (b.name.as_str(), b.weight, b.priority, b.model_name_override.as_deref()))
        .collect();
    assert_eq!(
        summary,
        vec![("openai-svc", 70, 0, Some("gpt-4")), ("anthropic-svc", 30, 1, None)]
    );

    let calls_before = h.gateway.calls().len();
    vms.delete(&h.ctx, "gpt-compat").await.unwrap();
    assert_eq!(
        h.gateway.calls()[calls_before],
        GatewayCall::DeleteRoute {
            namespace: GATEWAY_NAMESPACE.into(),
            name: route,
        }
    );
    assert_eq!(
        vms.get(&h.ctx, "gpt-compat").await.unwrap_err(),
        WeirError::VirtualModelNotFound
    );
}

// --- S6: gateway unavailable ---

#[tokio::test]
async fn gateway_unavailable_still_persists() {
    let h = Harness::with_gateway(MockAiGateway::unavailable()).await;
    let config = h.create_config().await;
    assert!(config.gateway_route_name.is_none());
    assert_eq!(weights(&config), pairs(&[("stable", 100)]));

    let started = h
        .services
        .traffic
        .start_canary(
            &h.ctx,
            config.id,
            StartCanary {
                version_id: h.v2.id,
                initial_weight: 25,
            },
        )
        .await
        .unwrap();
    assert_eq!(weights(&started.value), pairs(&[("canary", 25), ("stable", 75)]));
    assert_eq!(started.sync.gateway, ExternalEffect::Skipped);
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn gateway_sync_failure_is_reported_not_raised() {
    let h = Harness::new().await;
    let config = h.create_config().await;
    h.gateway.fail_writes(true);
    let outcome = h
        .services
        .traffic
        .update_variant(&h.ctx, config.id, "stable", 90)
        .await
        .unwrap();
    assert!(outcome.sync.gateway.is_failed());
    let stored = h.services.traffic.get_config(&h.ctx, config.id).await.unwrap();
    assert_eq!(weights(&stored), pairs(&[("stable", 90)]));
}

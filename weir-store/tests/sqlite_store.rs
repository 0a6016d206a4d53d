//! Repository behaviour of the SQLite store, alone and under the services.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use uuid::Uuid;
use weir_core::domain::{
    InferenceService, ModelVersion, RecordStatus, RegisteredModel, ServingEnvironment,
    TrafficConfig, TrafficConfigFilter, TrafficStrategy, TrafficVariant, VariantStatus,
    VirtualModel, VirtualModelBackend,
};
use weir_core::ports::{
    InferenceServiceRepository, MockAiGateway, MockServingRuntime, ModelVersionRepository,
    RegisteredModelRepository, ServingEnvironmentRepository, StoreHealth, TrafficConfigRepository,
    TrafficVariantRepository, VirtualModelRepository,
};
use weir_core::service::{CreateTrafficConfig, StartCanary};
use weir_core::{Repositories, RequestContext, Services, WeirError};
use weir_store::SqliteStore;

struct Seeded {
    ctx: RequestContext,
    store: Arc<SqliteStore>,
    isvc: InferenceService,
    v1: ModelVersion,
    v2: ModelVersion,
}

async fn seeded(store: SqliteStore) -> Seeded {
    let project = Uuid::new_v4();
    let ctx = RequestContext::new(project).unwrap();
    let store = Arc::new(store);

    let mut env = ServingEnvironment::new(project, "prod");
    env.external_id = Some("serving-prod".into());
    ServingEnvironmentRepository::create(store.as_ref(), &ctx, &env)
        .await
        .unwrap();
    let model = RegisteredModel::new(project, "llama");
    RegisteredModelRepository::create(store.as_ref(), &ctx, &model)
        .await
        .unwrap();
    let v1 = ModelVersion::new(project, model.id, "v1", "s3://models/llama/1");
    let mut v2 = ModelVersion::new(project, model.id, "v2", "s3://models/llama/2");
    v2.labels.insert("stage".into(), "candidate".into());
    for version in [&v1, &v2] {
        ModelVersionRepository::create(store.as_ref(), &ctx, version)
            .await
            .unwrap();
    }
    let isvc = InferenceService::new(project, "llama", env.id, model.id).unwrap();
    InferenceServiceRepository::create(store.as_ref(), &ctx, &isvc)
        .await
        .unwrap();

    Seeded {
        ctx,
        store,
        isvc,
        v1,
        v2,
    }
}

async fn config_with_stable(s: &Seeded) -> TrafficConfig {
    let config = TrafficConfig::new(s.ctx.project_id(), s.isvc.id, TrafficStrategy::Canary).unwrap();
    TrafficConfigRepository::create(s.store.as_ref(), &s.ctx, &config)
        .await
        .unwrap();
    let mut stable = TrafficVariant::new(config.id, s.v1.id, "stable", 100)
        .unwrap()
        .with_runtime_resource("llama");
    stable.activate();
    TrafficVariantRepository::create(s.store.as_ref(), &s.ctx, &stable)
        .await
        .unwrap();
    config
}

#[tokio::test]
async fn test_registry_roundtrip() {
    let s = seeded(SqliteStore::open_in_memory().unwrap()).await;
    let isvc = InferenceServiceRepository::get_by_id(s.store.as_ref(), &s.ctx, s.isvc.id)
        .await
        .unwrap();
    assert_eq!(isvc.name, "llama");
    assert_eq!(isvc.desired_state, s.isvc.desired_state);

    let v2 = ModelVersionRepository::get_by_id(s.store.as_ref(), &s.ctx, s.v2.id)
        .await
        .unwrap();
    assert_eq!(v2.labels.get("stage").map(String::as_str), Some("candidate"));
    assert!(v2.is_ready());

    let dup = InferenceService::new(s.ctx.project_id(), "llama", isvc.serving_environment_id, isvc.registered_model_id)
        .unwrap();
    assert_eq!(
        InferenceServiceRepository::create(s.store.as_ref(), &s.ctx, &dup)
            .await
            .unwrap_err(),
        WeirError::InferenceServiceNameConflict
    );
}

#[tokio::test]
async fn test_config_uniqueness_and_join() {
    let s = seeded(SqliteStore::open_in_memory().unwrap()).await;
    let config = config_with_stable(&s).await;

    let loaded = TrafficConfigRepository::get_by_id(s.store.as_ref(), &s.ctx, config.id)
        .await
        .unwrap();
    assert_eq!(loaded.inference_service_name.as_deref(), Some("llama"));
    assert!(loaded.variants.is_empty());

    let again = TrafficConfig::new(s.ctx.project_id(), s.isvc.id, TrafficStrategy::AbTest).unwrap();
    assert_eq!(
        TrafficConfigRepository::create(s.store.as_ref(), &s.ctx, &again)
            .await
            .unwrap_err(),
        WeirError::TrafficConfigExists
    );

    let variants = s.store.list_by_config(&s.ctx, config.id).await.unwrap();
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0].model_version_name.as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_other_projects_see_nothing() {
    let s = seeded(SqliteStore::open_in_memory().unwrap()).await;
    let config = config_with_stable(&s).await;
    let other = RequestContext::new(Uuid::new_v4()).unwrap();

    assert_eq!(
        TrafficConfigRepository::get_by_id(s.store.as_ref(), &other, config.id)
            .await
            .unwrap_err(),
        WeirError::TrafficConfigNotFound
    );
    assert!(s.store.list_by_config(&other, config.id).await.unwrap().is_empty());
    let (page, total) = TrafficConfigRepository::list(s.store.as_ref(), &other, &TrafficConfigFilter::default())
        .await
        .unwrap();
    assert!(page.is_empty());
    assert_eq!(total, 0);
    assert_eq!(
        TrafficConfigRepository::delete(s.store.as_ref(), &other, config.id)
            .await
            .unwrap_err(),
        WeirError::TrafficConfigNotFound
    );
}

#[tokio::test]
async fn test_update_many_checks_final_names() {
    let s = seeded(SqliteStore::open_in_memory().unwrap()).await;
    let config = config_with_stable(&s).await;
    let mut canary = TrafficVariant::new(config.id, s.v2.id, "canary", 20).unwrap();
    canary.activate();
    TrafficVariantRepository::create(s.store.as_ref(), &s.ctx, &canary)
        .await
        .unwrap();
    let mut stable = TrafficVariantRepository::get_by_name(s.store.as_ref(), &s.ctx, config.id, "stable")
        .await
        .unwrap();

    // Swap names in one batch, in the "wrong" order.
    canary.rename("stable");
    stable.rename("old-stable-1");
    stable.deactivate();
    s.store
        .update_many(&s.ctx, &[canary.clone(), stable.clone()])
        .await
        .unwrap();

    let now_stable = TrafficVariantRepository::get_by_name(s.store.as_ref(), &s.ctx, config.id, "stable")
        .await
        .unwrap();
    assert_eq!(now_stable.model_version_id, s.v2.id);
    let old = TrafficVariantRepository::get_by_name(s.store.as_ref(), &s.ctx, config.id, "old-stable-1")
        .await
        .unwrap();
    assert_eq!(old.status, VariantStatus::Inactive);
    assert_eq!(old.weight, 0);

    // A clash in the final state rolls the whole batch back.
    let mut clash = old.clone();
    clash.rename("stable");
    let mut weight_change = now_stable.clone();
    weight_change.set_weight(60).unwrap();
    assert_eq!(
        s.store
            .update_many(&s.ctx, &[weight_change, clash])
            .await
            .unwrap_err(),
        WeirError::VariantAlreadyExists
    );
    let unchanged = TrafficVariantRepository::get_by_name(s.store.as_ref(), &s.ctx, config.id, "stable")
        .await
        .unwrap();
    assert_eq!(unchanged.weight, 20);
}

#[tokio::test]
async fn test_delete_config_cascades_variants() {
    let s = seeded(SqliteStore::open_in_memory().unwrap()).await;
    let config = config_with_stable(&s).await;
    TrafficConfigRepository::delete(s.store.as_ref(), &s.ctx, config.id)
        .await
        .unwrap();
    assert!(s.store.list_by_config(&s.ctx, config.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_configs_paginates() {
    let store = SqliteStore::open_in_memory().unwrap();
    let s = seeded(store).await;
    for n in 0..3 {
        let isvc = InferenceService::new(
            s.ctx.project_id(),
            format!("svc-{n}"),
            s.isvc.serving_environment_id,
            s.isvc.registered_model_id,
        )
        .unwrap();
        InferenceServiceRepository::create(s.store.as_ref(), &s.ctx, &isvc)
            .await
            .unwrap();
        let strategy = if n == 2 {
            TrafficStrategy::AbTest
        } else {
            TrafficStrategy::Canary
        };
        let mut config = TrafficConfig::new(s.ctx.project_id(), isvc.id, strategy).unwrap();
        if n == 0 {
            config.status = RecordStatus::Inactive;
        }
        TrafficConfigRepository::create(s.store.as_ref(), &s.ctx, &config)
            .await
            .unwrap();
    }

    let filter = TrafficConfigFilter {
        limit: Some(2),
        ..TrafficConfigFilter::default()
    };
    let (page, total) = TrafficConfigRepository::list(s.store.as_ref(), &s.ctx, &filter)
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);

    let active = TrafficConfigFilter {
        status: Some(RecordStatus::Active),
        ..TrafficConfigFilter::default()
    };
    let (_, total) = TrafficConfigRepository::list(s.store.as_ref(), &s.ctx, &active)
        .await
        .unwrap();
    assert_eq!(total, 2);

    let ab = TrafficConfigFilter {
        strategy: Some(TrafficStrategy::AbTest),
        ..TrafficConfigFilter::default()
    };
    let (page, total) = TrafficConfigRepository::list(s.store.as_ref(), &s.ctx, &ab)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(page[0].strategy, TrafficStrategy::AbTest);
}

#[tokio::test]
async fn test_virtual_model_backends() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let ctx = RequestContext::new(Uuid::new_v4()).unwrap();
    let vm = VirtualModel::new(ctx.project_id(), "gpt-compat").unwrap();
    VirtualModelRepository::create(store.as_ref(), &ctx, &vm).await.unwrap();
    assert_eq!(
        VirtualModelRepository::create(store.as_ref(), &ctx, &VirtualModel::new(ctx.project_id(), "gpt-compat").unwrap())
            .await
            .unwrap_err(),
        WeirError::VirtualModelExists
    );

    let fallback = VirtualModelBackend::new(vm.id, "anthropic-svc", 30, 1).unwrap();
    let primary = VirtualModelBackend::new(vm.id, "openai-svc", 70, 0).unwrap();
    store.create_backend(&ctx, &fallback).await.unwrap();
    store.create_backend(&ctx, &primary).await.unwrap();
    assert_eq!(
        store
            .create_backend(&ctx, &VirtualModelBackend::new(vm.id, "openai-svc", 10, 2).unwrap())
            .await
            .unwrap_err(),
        WeirError::BackendAlreadyExists
    );

    let loaded = VirtualModelRepository::get_by_name(store.as_ref(), &ctx, "gpt-compat")
        .await
        .unwrap();
    let names: Vec<_> = loaded.backends.iter().map(|b| b.backend_name.as_str()).collect();
    assert_eq!(names, vec!["openai-svc", "anthropic-svc"]);

    store.delete_backend(&ctx, fallback.id).await.unwrap();
    assert_eq!(
        store.delete_backend(&ctx, fallback.id).await.unwrap_err(),
        WeirError::BackendNotFound
    );

    VirtualModelRepository::delete(store.as_ref(), &ctx, vm.id).await.unwrap();
    assert_eq!(
        store.list_backends(&ctx, vm.id).await.unwrap_err(),
        WeirError::VirtualModelNotFound
    );
}

#[tokio::test]
async fn test_services_over_sqlite() {
    let s = seeded(SqliteStore::open_in_memory().unwrap()).await;
    let runtime = Arc::new(MockServingRuntime::new());
    runtime.seed("serving-prod", "llama", s.v1.id);
    let gateway = Arc::new(MockAiGateway::new());
    let services = Services::new(
        Repositories::from_store(s.store.clone()),
        Some(runtime.clone()),
        Some(gateway.clone()),
        "model-serving",
    );

    let config = services
        .traffic
        .create_config(
            &s.ctx,
            CreateTrafficConfig {
                inference_service_id: s.isvc.id,
                strategy: TrafficStrategy::Canary,
                stable_version_id: s.v1.id,
            },
        )
        .await
        .unwrap()
        .value;
    services
        .traffic
        .start_canary(
            &s.ctx,
            config.id,
            StartCanary {
                version_id: s.v2.id,
                initial_weight: 30,
            },
        )
        .await
        .unwrap();
    let promoted = services
        .traffic
        .promote_canary(&s.ctx, config.id)
        .await
        .unwrap()
        .value;

    let stable = promoted.stable().unwrap();
    assert_eq!(stable.model_version_id, s.v2.id);
    assert_eq!(stable.weight, 100);
    assert_eq!(stable.model_version_name.as_deref(), Some("v2"));
    assert_eq!(promoted.total_weight(), 100);
    assert_eq!(promoted.variants.len(), 2);
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weir.db");
    let config_id;
    let ctx;
    {
        let s = seeded(SqliteStore::open(&path, Duration::from_secs(1)).unwrap()).await;
        config_id = config_with_stable(&s).await.id;
        ctx = s.ctx.clone();
    }

    let reopened = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
    reopened.ping(&ctx).await.unwrap();
    let config = TrafficConfigRepository::get_by_id(&reopened, &ctx, config_id)
        .await
        .unwrap();
    assert_eq!(config.inference_service_name.as_deref(), Some("llama"));
    let variants = reopened.list_by_config(&ctx, config_id).await.unwrap();
    assert_eq!(variants[0].variant_name, "stable");
}

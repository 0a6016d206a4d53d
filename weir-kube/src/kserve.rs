//! KServe serving runtime: one `InferenceService` object per deployed
//! model version.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};
use weir_core::config::KubernetesConfig;
use weir_core::domain::{InferenceService as ServiceDescriptor, ModelVersion};
use weir_core::ports::{Deployment, RuntimeStatus, ServingRuntime};
use weir_core::{RequestContext, Result};

use crate::crd::{
    InferenceService, InferenceServiceSpec, ModelFormat, PredictorModel, PredictorSpec,
};
use crate::error::{KubeError, runtime_error};

pub const LABEL_INFERENCE_SERVICE_ID: &str = "weir.dev/inference-service-id";
pub const LABEL_REGISTERED_MODEL_ID: &str = "weir.dev/registered-model-id";
pub const LABEL_MODEL_VERSION_ID: &str = "weir.dev/model-version-id";

#[derive(Clone)]
pub struct KServeRuntime {
    client: Client,
    default_namespace: String,
}

impl KServeRuntime {
    pub fn new(client: Client, default_namespace: impl Into<String>) -> Self {
        Self {
            client,
            default_namespace: default_namespace.into(),
        }
    }

    /// Build the runtime from configuration; `None` when disabled.
    pub async fn from_config(config: &KubernetesConfig) -> Result<Option<Self>, KubeError> {
        if !config.enabled {
            return Ok(None);
        }
        let client = crate::client::connect(config.in_cluster, config.kubeconfig.as_deref()).await?;
        Ok(Some(Self::new(client, &config.default_namespace)))
    }

    /// Empty namespaces fall back to the configured default.
    fn namespace<'a>(&'a self, namespace: &'a str) -> &'a str {
        if namespace.is_empty() {
            &self.default_namespace
        } else {
            namespace
        }
    }

    fn api(&self, namespace: &str) -> Api<InferenceService> {
        Api::namespaced(self.client.clone(), self.namespace(namespace))
    }
}

/// Build the `InferenceService` object serving `version` under
/// `descriptor.name`.
pub fn build_inference_service(
    descriptor: &ServiceDescriptor,
    version: &ModelVersion,
) -> InferenceService {
    let mut labels = BTreeMap::from([
        (LABEL_INFERENCE_SERVICE_ID.to_string(), descriptor.id.to_string()),
        (
            LABEL_REGISTERED_MODEL_ID.to_string(),
            descriptor.registered_model_id.to_string(),
        ),
        (LABEL_MODEL_VERSION_ID.to_string(), version.id.to_string()),
    ]);
    labels.extend(descriptor.labels.clone());

    let model_format = version
        .model_framework
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| ModelFormat {
            name: name.to_string(),
            version: version
                .model_framework_version
                .clone()
                .filter(|v| !v.is_empty()),
        });

    let spec = InferenceServiceSpec {
        predictor: PredictorSpec {
            model: Some(PredictorModel {
                storage_uri: version.uri.clone(),
                model_format,
                runtime: version.container_image.clone().filter(|i| !i.is_empty()),
            }),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut isvc = InferenceService::new(&descriptor.name, spec);
    isvc.metadata.labels = Some(labels);
    isvc
}

/// Readiness from the `Ready` condition; its message is the error when
/// the condition is `False`.
pub fn runtime_status(isvc: &InferenceService) -> RuntimeStatus {
    let Some(status) = &isvc.status else {
        return RuntimeStatus::default();
    };
    let mut result = RuntimeStatus {
        url: status.url.clone(),
        ..Default::default()
    };
    if let Some(ready) = status.conditions.iter().find(|c| c.type_ == "Ready") {
        result.ready = ready.is_true();
        if ready.status == "False" {
            result.error = ready.message.clone();
        }
    }
    result
}

#[async_trait]
impl ServingRuntime for KServeRuntime {
    async fn deploy(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        isvc: &ServiceDescriptor,
        version: &ModelVersion,
    ) -> Result<Deployment> {
        let api = self.api(namespace);
        let object = build_inference_service(isvc, version);
        let created = ctx
            .run(async {
                api.create(&PostParams::default(), &object)
                    .await
                    .map_err(|e| runtime_error(e, &format!("create inferenceservice {}", isvc.name)))
            })
            .await?;

        info!(
            name = %isvc.name,
            namespace = self.namespace(namespace),
            model_version_id = %version.id,
            "Deployed KServe InferenceService"
        );
        Ok(Deployment {
            external_id: created.uid().unwrap_or_default(),
            url: created.status.and_then(|s| s.url),
        })
    }

    async fn undeploy(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()> {
        let api = self.api(namespace);
        ctx.run(async {
            api.delete(name, &DeleteParams::default())
                .await
                .map_err(|e| runtime_error(e, &format!("delete inferenceservice {name}")))
        })
        .await?;
        debug!(name, "Deleted KServe InferenceService");
        Ok(())
    }

    async fn status(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<RuntimeStatus> {
        let api = self.api(namespace);
        let isvc = ctx
            .run(async {
                api.get(name)
                    .await
                    .map_err(|e| runtime_error(e, &format!("get inferenceservice {name}")))
            })
            .await?;
        Ok(runtime_status(&isvc))
    }

    fn is_available(&self) -> bool {
        true
    }
}

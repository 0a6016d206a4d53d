//! Serving runtime port: deploys model versions as runtime resources.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::domain::{InferenceService, ModelVersion};
use crate::error::{Result, WeirError};

/// Result of a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Identifier assigned by the runtime (a Kubernetes UID for KServe).
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait ServingRuntime: Send + Sync {
    /// Create a runtime resource named `isvc.name` in `namespace` serving
    /// `version`.
    async fn deploy(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        isvc: &InferenceService,
        version: &ModelVersion,
    ) -> Result<Deployment>;

    async fn undeploy(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()>;

    async fn status(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<RuntimeStatus>;

    /// Whether calls should be attempted at all.
    fn is_available(&self) -> bool;
}

/// Calls recorded by [`MockServingRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Deploy {
        namespace: String,
        name: String,
        model_version_id: Uuid,
    },
    Undeploy {
        namespace: String,
        name: String,
    },
}

#[derive(Debug, Default)]
struct MockRuntimeState {
    deployed: BTreeMap<(String, String), Uuid>,
    calls: Vec<RuntimeCall>,
    fail_deploys: bool,
    fail_undeploys: bool,
}

/// In-process serving runtime for tests and local development.
#[derive(Debug)]
pub struct MockServingRuntime {
    available: bool,
    state: Mutex<MockRuntimeState>,
}

impl Default for MockServingRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServingRuntime {
    pub fn new() -> Self {
        Self {
            available: true,
            state: Mutex::new(MockRuntimeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockRuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A runtime that reports itself unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn fail_deploys(&self, fail: bool) {
        self.state().fail_deploys = fail;
    }

    pub fn fail_undeploys(&self, fail: bool) {
        self.state().fail_undeploys = fail;
    }

    /// Register a resource as already running, e.g. the pre-existing
    /// stable deployment.
    pub fn seed(&self, namespace: &str, name: &str, model_version_id: Uuid) {
        self.state()
            .deployed
            .insert((namespace.to_string(), name.to_string()), model_version_id);
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state().calls.clone()
    }

    pub fn is_deployed(&self, namespace: &str, name: &str) -> bool {
        self.state()
            .deployed
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub fn deployed_names(&self) -> Vec<String> {
        self.state()
            .deployed
            .keys()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ServingRuntime for MockServingRuntime {
    async fn deploy(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        isvc: &InferenceService,
        version: &ModelVersion,
    ) -> Result<Deployment> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(RuntimeCall::Deploy {
            namespace: namespace.to_string(),
            name: isvc.name.clone(),
            model_version_id: version.id,
        });
        if state.fail_deploys {
            return Err(WeirError::runtime(format!(
                "admission webhook denied inference service {}",
                isvc.name
            )));
        }
        let key = (namespace.to_string(), isvc.name.clone());
        if state.deployed.contains_key(&key) {
            return Err(WeirError::InferenceServiceNameConflict);
        }
        state.deployed.insert(key, version.id);
        Ok(Deployment {
            external_id: Uuid::new_v4().to_string(),
            url: Some(format!("http://{}.{namespace}.svc.cluster.local", isvc.name)),
        })
    }

    async fn undeploy(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(RuntimeCall::Undeploy {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        if state.fail_undeploys {
            return Err(WeirError::runtime(format!("timed out deleting {name}")));
        }
        state
            .deployed
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or(WeirError::InferenceServiceNotFound)
    }

    async fn status(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<RuntimeStatus> {
        ctx.check()?;
        let state = self.state();
        if state
            .deployed
            .contains_key(&(namespace.to_string(), name.to_string()))
        {
            Ok(RuntimeStatus {
                ready: true,
                url: Some(format!("http://{name}.{namespace}.svc.cluster.local")),
                error: None,
            })
        } else {
            Err(WeirError::InferenceServiceNotFound)
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

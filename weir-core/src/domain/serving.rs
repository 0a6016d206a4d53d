//! Registry records the control plane reads: serving environments,
//! registered models, model versions, and inference services.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WeirError};

/// Label keys stamped on runtime resources.
pub const LABEL_INFERENCE_SERVICE_ID: &str = "weir.dev/inference-service-id";
pub const LABEL_REGISTERED_MODEL_ID: &str = "weir.dev/registered-model-id";
pub const LABEL_MODEL_VERSION_ID: &str = "weir.dev/model-version-id";

/// A deployment target; maps to a Kubernetes namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingEnvironment {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl ServingEnvironment {
    pub fn new(project_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            project_id,
            name: name.into(),
            description: String::new(),
            external_id: None,
        }
    }

    /// Kubernetes namespace: the external id when set, else the name.
    pub fn namespace(&self) -> &str {
        self.external_id
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl RegisteredModel {
    pub fn new(project_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            project_id,
            name: name.into(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersionStatus {
    #[default]
    Pending,
    Ready,
    Failed,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "READY" => Ok(Self::Ready),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown version status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_id: Uuid,
    pub registered_model_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: VersionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_framework_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,
    /// Storage location of the artifact, e.g. `s3://models/llama/3`.
    pub uri: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ModelVersion {
    pub fn new(
        project_id: Uuid,
        registered_model_id: Uuid,
        name: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            project_id,
            registered_model_id,
            name: name.into(),
            description: String::new(),
            status: VersionStatus::Ready,
            model_framework: None,
            model_framework_version: None,
            container_image: None,
            uri: uri.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == VersionStatus::Ready
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InferenceServiceState {
    Deployed,
    #[default]
    Undeployed,
}

impl InferenceServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployed => "DEPLOYED",
            Self::Undeployed => "UNDEPLOYED",
        }
    }
}

impl fmt::Display for InferenceServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InferenceServiceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPLOYED" => Ok(Self::Deployed),
            "UNDEPLOYED" => Ok(Self::Undeployed),
            other => Err(format!("unknown inference service state '{other}'")),
        }
    }
}

/// A named, deployable serving unit bound to an environment and a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceService {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub serving_environment_id: Uuid,
    pub registered_model_id: Uuid,
    pub desired_state: InferenceServiceState,
    pub current_state: InferenceServiceState,
    /// Serving runtime (e.g. a KServe runtime name or container image).
    #[serde(default)]
    pub runtime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl InferenceService {
    pub fn new(
        project_id: Uuid,
        name: impl Into<String>,
        serving_environment_id: Uuid,
        registered_model_id: Uuid,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WeirError::InvalidInferenceServiceId);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            project_id,
            name,
            external_id: None,
            serving_environment_id,
            registered_model_id,
            desired_state: InferenceServiceState::Deployed,
            current_state: InferenceServiceState::Undeployed,
            runtime: String::new(),
            url: None,
            last_error: None,
            labels: BTreeMap::new(),
        })
    }

    /// Descriptor for a sibling runtime resource named `resource_name`
    /// that serves another version of the same model in the same place.
    pub fn sibling(&self, resource_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: resource_name.into(),
            external_id: None,
            desired_state: InferenceServiceState::Deployed,
            current_state: InferenceServiceState::Undeployed,
            url: None,
            last_error: None,
            ..self.clone()
        }
    }

    pub fn mark_deployed(&mut self, external_id: Option<String>, url: Option<String>) {
        self.current_state = InferenceServiceState::Deployed;
        if external_id.is_some() {
            self.external_id = external_id;
        }
        self.url = url;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_undeployed(&mut self) {
        self.current_state = InferenceServiceState::Undeployed;
        self.url = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.desired_state != self.current_state
    }
}

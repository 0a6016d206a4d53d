//! Virtual models: one public model name fanned out to weighted,
//! prioritised upstream backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gateway::WeightedBackend;
use super::{RecordStatus, short_id, validate_weight};
use crate::error::{Result, WeirError};

pub fn validate_backend_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        Err(WeirError::InvalidBackendName)
    } else {
        Ok(())
    }
}

pub fn validate_priority(priority: i32) -> Result<()> {
    if priority < 0 {
        Err(WeirError::InvalidPriority)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualModelBackend {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub virtual_model_id: Uuid,
    pub backend_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
    pub weight: i32,
    /// Lower is preferred; higher tiers are fallbacks.
    pub priority: i32,
    pub status: RecordStatus,
}

impl VirtualModelBackend {
    pub fn new(
        virtual_model_id: Uuid,
        backend_name: impl Into<String>,
        weight: i32,
        priority: i32,
    ) -> Result<Self> {
        let backend_name = backend_name.into();
        validate_backend_name(&backend_name)?;
        validate_weight(weight)?;
        validate_priority(priority)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            virtual_model_id,
            backend_name,
            backend_namespace: None,
            model_name_override: None,
            weight,
            priority,
            status: RecordStatus::Active,
        })
    }

    pub fn set_weight_and_priority(&mut self, weight: i32, priority: i32) -> Result<()> {
        validate_weight(weight)?;
        validate_priority(priority)?;
        self.weight = weight;
        self.priority = priority;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_routed(&self) -> bool {
        self.status == RecordStatus::Active && self.weight > 0
    }

    /// Model name sent upstream: the override when set, else the virtual
    /// model's own name.
    pub fn effective_model_name<'a>(&'a self, virtual_model_name: &'a str) -> &'a str {
        self.model_name_override
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(virtual_model_name)
    }

    fn to_weighted(&self) -> WeightedBackend {
        WeightedBackend {
            name: self.backend_name.clone(),
            namespace: self.backend_namespace.clone(),
            weight: self.weight,
            priority: self.priority,
            variant_tag: None,
            model_name_override: self.model_name_override.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualModel {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_route_name: Option<String>,
    pub status: RecordStatus,
    #[serde(default)]
    pub backends: Vec<VirtualModelBackend>,
}

impl VirtualModel {
    pub fn new(project_id: Uuid, name: impl Into<String>) -> Result<Self> {
        if project_id.is_nil() {
            return Err(WeirError::MissingProjectId);
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WeirError::InvalidVirtualModelName);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            project_id,
            name,
            description: String::new(),
            gateway_route_name: None,
            status: RecordStatus::Active,
            backends: Vec::new(),
        })
    }

    pub fn backend(&self, backend_name: &str) -> Option<&VirtualModelBackend> {
        self.backends.iter().find(|b| b.backend_name == backend_name)
    }

    pub fn backend_by_id(&self, id: Uuid) -> Option<&VirtualModelBackend> {
        self.backends.iter().find(|b| b.id == id)
    }

    pub fn default_route_name(&self) -> String {
        format!("vm-{}", short_id(&self.id))
    }

    /// Route entries: active backends with positive weight.
    pub fn weighted_backends(&self) -> Vec<WeightedBackend> {
        self.backends
            .iter()
            .filter(|b| b.is_routed())
            .map(VirtualModelBackend::to_weighted)
            .collect()
    }
}

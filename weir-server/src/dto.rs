//! Wire types for the HTTP API.
//!
//! Requests carry the field names API clients already use
//! (`model_version_id`, `ai_service_backend_name`, ...); responses flatten
//! the domain aggregates into the same shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use weir_core::domain::{
    BackendEndpoint, BackendRef, HeaderMutation, RecordStatus, TrafficConfig, TrafficConfigFilter,
    TrafficStrategy, TrafficVariant, VirtualModel, VirtualModelBackend,
};
use weir_core::service::{
    AddBackend, AddVariant, CreateTrafficConfig, CreateVirtualModel, StartCanary, UpdateBackend,
};

use crate::error::{ApiError, ApiResult};

/// Page size when a list request does not give one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

// --- Traffic configs ---

#[derive(Debug, Deserialize)]
pub struct CreateTrafficConfigRequest {
    pub inference_service_id: Uuid,
    #[serde(default)]
    pub strategy: Option<String>,
    pub stable_version_id: Uuid,
}

impl CreateTrafficConfigRequest {
    pub fn into_command(self) -> ApiResult<CreateTrafficConfig> {
        let strategy = match self.strategy.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<TrafficStrategy>()?,
            None => TrafficStrategy::default(),
        };
        Ok(CreateTrafficConfig {
            inference_service_id: self.inference_service_id,
            strategy,
            stable_version_id: self.stable_version_id,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTrafficConfigsQuery {
    pub inference_service_id: Option<Uuid>,
    pub strategy: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl ListTrafficConfigsQuery {
    pub fn into_filter(self) -> ApiResult<TrafficConfigFilter> {
        let strategy = self
            .strategy
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<TrafficStrategy>)
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<RecordStatus>)
            .transpose()
            .map_err(ApiError::BadRequest)?;
        Ok(TrafficConfigFilter {
            inference_service_id: self.inference_service_id,
            strategy,
            status,
            limit: Some(self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE)),
            offset: self.offset,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StartCanaryRequest {
    pub model_version_id: Uuid,
    #[serde(default)]
    pub initial_weight: i32,
}

impl From<StartCanaryRequest> for StartCanary {
    fn from(req: StartCanaryRequest) -> Self {
        Self {
            version_id: req.model_version_id,
            initial_weight: req.initial_weight,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WeightRequest {
    pub weight: i32,
}

#[derive(Debug, Deserialize)]
pub struct AddVariantRequest {
    pub variant_name: String,
    pub model_version_id: Uuid,
    #[serde(default)]
    pub weight: i32,
}

impl From<AddVariantRequest> for AddVariant {
    fn from(req: AddVariantRequest) -> Self {
        Self {
            name: req.variant_name,
            version_id: req.model_version_id,
            weight: req.weight,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateWeightsRequest {
    pub weights: BTreeMap<String, i32>,
}

#[derive(Debug, Serialize)]
pub struct TrafficVariantResponse {
    pub id: Uuid,
    pub variant_name: String,
    pub model_version_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version_name: Option<String>,
    pub weight: i32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kserve_isvc_name: Option<String>,
}

impl From<TrafficVariant> for TrafficVariantResponse {
    fn from(variant: TrafficVariant) -> Self {
        Self {
            id: variant.id,
            status: variant.status.to_string(),
            kserve_isvc_name: Some(variant.runtime_resource_name).filter(|n| !n.is_empty()),
            variant_name: variant.variant_name,
            model_version_id: variant.model_version_id,
            model_version_name: variant.model_version_name,
            weight: variant.weight,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrafficConfigResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub inference_service_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_service_name: Option<String>,
    pub strategy: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_gateway_route_name: Option<String>,
    pub variants: Vec<TrafficVariantResponse>,
}

impl From<TrafficConfig> for TrafficConfigResponse {
    fn from(config: TrafficConfig) -> Self {
        Self {
            id: config.id,
            created_at: config.created_at,
            updated_at: config.updated_at,
            inference_service_id: config.inference_service_id,
            inference_service_name: config.inference_service_name,
            strategy: config.strategy.to_string(),
            status: config.status.to_string(),
            ai_gateway_route_name: config.gateway_route_name,
            variants: config.variants.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListTrafficConfigsResponse {
    pub items: Vec<TrafficConfigResponse>,
    pub total: usize,
    pub page_size: usize,
    /// Offset of the next page, absent on the last one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

impl ListTrafficConfigsResponse {
    pub fn new(configs: Vec<TrafficConfig>, total: usize, offset: usize) -> Self {
        let page_size = configs.len();
        let end = offset + page_size;
        Self {
            items: configs.into_iter().map(Into::into).collect(),
            total,
            page_size,
            next_offset: (page_size > 0 && end < total).then_some(end),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListVariantsResponse {
    pub config_id: Uuid,
    pub variants: Vec<TrafficVariantResponse>,
    pub total: usize,
}

// --- Virtual models ---

#[derive(Debug, Deserialize)]
pub struct CreateVirtualModelRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl From<CreateVirtualModelRequest> for CreateVirtualModel {
    fn from(req: CreateVirtualModelRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddBackendRequest {
    pub ai_service_backend_name: String,
    #[serde(default)]
    pub ai_service_backend_namespace: Option<String>,
    #[serde(default)]
    pub model_name_override: Option<String>,
    pub weight: i32,
    #[serde(default)]
    pub priority: i32,
}

impl From<AddBackendRequest> for AddBackend {
    fn from(req: AddBackendRequest) -> Self {
        Self {
            backend_name: req.ai_service_backend_name,
            backend_namespace: req.ai_service_backend_namespace.filter(|ns| !ns.is_empty()),
            model_name_override: req.model_name_override.filter(|m| !m.is_empty()),
            weight: req.weight,
            priority: req.priority,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBackendRequest {
    pub weight: i32,
    #[serde(default)]
    pub priority: i32,
}

impl From<UpdateBackendRequest> for UpdateBackend {
    fn from(req: UpdateBackendRequest) -> Self {
        Self {
            weight: req.weight,
            priority: req.priority,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VirtualModelBackendResponse {
    pub id: Uuid,
    pub ai_service_backend_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_service_backend_namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
    pub weight: i32,
    pub priority: i32,
    pub status: String,
}

impl From<VirtualModelBackend> for VirtualModelBackendResponse {
    fn from(backend: VirtualModelBackend) -> Self {
        Self {
            id: backend.id,
            ai_service_backend_name: backend.backend_name,
            ai_service_backend_namespace: backend.backend_namespace,
            model_name_override: backend.model_name_override,
            weight: backend.weight,
            priority: backend.priority,
            status: backend.status.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VirtualModelResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_gateway_route_name: Option<String>,
    pub status: String,
    pub backends: Vec<VirtualModelBackendResponse>,
}

impl From<VirtualModel> for VirtualModelResponse {
    fn from(vm: VirtualModel) -> Self {
        Self {
            id: vm.id,
            created_at: vm.created_at,
            updated_at: vm.updated_at,
            name: vm.name,
            description: vm.description,
            ai_gateway_route_name: vm.gateway_route_name,
            status: vm.status.to_string(),
            backends: vm.backends.into_iter().map(Into::into).collect(),
        }
    }
}

/// `{items, total}` envelope shared by the unpaginated lists.
#[derive(Debug, Serialize)]
pub struct ItemList<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ItemList<T> {
    pub fn new<U: Into<T>>(items: Vec<U>) -> Self {
        let items: Vec<T> = items.into_iter().map(Into::into).collect();
        Self {
            total: items.len(),
            items,
        }
    }
}

// --- Upstream backends ---

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

impl NamespaceQuery {
    pub fn as_deref(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct BackendRefRequest {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl From<BackendRefRequest> for BackendRef {
    fn from(req: BackendRefRequest) -> Self {
        let mut backend_ref = BackendRef::envoy(req.name);
        backend_ref.namespace = req.namespace.filter(|ns| !ns.is_empty());
        backend_ref
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAiServiceBackendRequest {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub schema: String,
    pub backend_ref: BackendRefRequest,
    #[serde(default)]
    pub header_mutation: Option<HeaderMutation>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAiServiceBackendRequest {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub header_mutation: Option<HeaderMutation>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEnvoyBackendRequest {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub endpoints: Vec<BackendEndpoint>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEnvoyBackendRequest {
    #[serde(default)]
    pub endpoints: Option<Vec<BackendEndpoint>>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

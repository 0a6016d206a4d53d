//! Typed custom resources weir reads and writes.
//!
//! Schemas are owned by KServe and the Envoy AI Gateway; the structs here
//! model only the fields weir touches. Fields weir does not model are kept
//! in `extra` so a read-modify-replace round trip does not drop them.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Condition entry shared by the KServe and Gateway API status blocks.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl StatusCondition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

// --- KServe ---

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "serving.kserve.io",
    version = "v1beta1",
    kind = "InferenceService",
    namespaced,
    status = "InferenceServiceStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceSpec {
    pub predictor: PredictorSpec,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<PredictorModel>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictorModel {
    pub storage_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_format: Option<ModelFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ModelFormat {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
}

// --- Envoy AI Gateway ---

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "aigateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "AIGatewayRoute",
    namespaced,
    status = "AIGatewayRouteStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct AIGatewayRouteSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_refs: Vec<ParentRef>,
    #[serde(default)]
    pub rules: Vec<RouteRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub llm_request_costs: Vec<RequestCost>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ParentRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<RouteMatch>,
    #[serde(default)]
    pub backend_refs: Vec<RouteBackendRef>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RouteMatch {
    #[serde(default)]
    pub headers: Vec<HeaderMatch>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct HeaderMatch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBackendRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCost {
    pub metadata_key: String,
    #[serde(rename = "type")]
    pub cost_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cel: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct AIGatewayRouteStatus {
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "aigateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "AIServiceBackend",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct AIServiceBackendSpec {
    pub schema: VersionedSchema,
    pub backend_ref: BackendObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_mutation: Option<HeaderMutationSpec>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct VersionedSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct BackendObjectRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct HeaderMutationSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<HeaderValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct HeaderValue {
    pub name: String,
    pub value: String,
}

// --- Envoy Gateway ---

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "Backend",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Exactly one of `fqdn` or `ip` is set on a well-formed endpoint.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct EndpointSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<FqdnEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpEndpoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct FqdnEndpoint {
    pub hostname: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IpEndpoint {
    pub address: String,
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;
    use serde_json::json;

    #[test]
    fn test_resource_metadata() {
        assert_eq!(InferenceService::group(&()), "serving.kserve.io");
        assert_eq!(InferenceService::version(&()), "v1beta1");
        assert_eq!(InferenceService::plural(&()), "inferenceservices");

        assert_eq!(AIGatewayRoute::group(&()), "aigateway.envoyproxy.io");
        assert_eq!(AIGatewayRoute::kind(&()), "AIGatewayRoute");
        assert_eq!(AIGatewayRoute::plural(&()), "aigatewayroutes");

        assert_eq!(AIServiceBackend::plural(&()), "aiservicebackends");

        assert_eq!(Backend::group(&()), "gateway.envoyproxy.io");
        assert_eq!(Backend::plural(&()), "backends");
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "parentRefs": [{"name": "ai-gateway", "namespace": "envoy-gateway-system"}],
            "rules": [{
                "backendRefs": [{"name": "llama", "weight": 100}],
                "timeouts": {"request": "60s"}
            }],
            "filterConfig": {"type": "ExternalProcessor"}
        });
        let spec: AIGatewayRouteSpec = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(spec.rules[0].backend_refs[0].weight, Some(100));
        assert!(spec.extra.contains_key("filterConfig"));
        assert_eq!(serde_json::to_value(&spec).unwrap(), raw);
    }

    #[test]
    fn test_kserve_status_parses_knative_conditions() {
        let status: InferenceServiceStatus = serde_json::from_value(json!({
            "url": "http://llama.model-serving.example.com",
            "conditions": [
                {"type": "PredictorReady", "status": "True"},
                {"type": "Ready", "status": "False", "reason": "RevisionMissing", "message": "Revision not ready"}
            ],
            "modelStatus": {"states": {"activeModelState": "Loading"}}
        }))
        .unwrap();
        assert_eq!(status.conditions.len(), 2);
        assert!(!status.conditions[1].is_true());
        assert_eq!(status.conditions[1].message.as_deref(), Some("Revision not ready"));
    }
}

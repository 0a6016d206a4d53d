//! Envoy AI Gateway client.
//!
//! Gateway routes map to `AIGatewayRoute` objects with a single rule: a
//! header match on [`MODEL_HEADER`] and the weighted backend references.
//! Upstream providers are `AIServiceBackend` objects pointing at Envoy
//! `Backend` objects. Every object weir writes carries `managed-by=weir`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};
use weir_core::config::GatewayConfig;
use weir_core::domain::gateway::MODEL_HEADER;
use weir_core::domain::{
    AiServiceBackend, ApiSchema, BackendEndpoint, BackendRef, EnvoyBackend, GatewayRoute,
    HeaderMutation, HttpHeader, LlmRequestCost, LlmRequestCostKind, RouteStatus, WeightedBackend,
};
use weir_core::ports::AiGateway;
use weir_core::{RequestContext, Result, WeirError};

use crate::crd::{
    AIGatewayRoute, AIGatewayRouteSpec, AIServiceBackend, AIServiceBackendSpec, Backend,
    BackendObjectRef, BackendSpec, EndpointSpec, FqdnEndpoint, HeaderMatch, HeaderMutationSpec,
    HeaderValue, IpEndpoint, ParentRef, RequestCost, RouteBackendRef, RouteMatch, RouteRule,
    VersionedSchema,
};
use crate::error::{ENVOY_BACKEND, KubeError, ROUTE, SERVICE_BACKEND, gateway_error};

pub const LABEL_MANAGED_BY: &str = "managed-by";
pub const MANAGER: &str = "weir";

/// Attempts at a read-modify-replace before giving up on conflicts.
const REPLACE_ATTEMPTS: usize = 3;

/// Gateway API default when a backend reference omits its weight.
const DEFAULT_BACKEND_WEIGHT: i32 = 1;

#[derive(Clone)]
pub struct EnvoyAiGateway {
    client: Client,
    gateway: ParentRef,
}

impl EnvoyAiGateway {
    /// Routes attach to the Gateway `gateway_name` in `gateway_namespace`.
    pub fn new(
        client: Client,
        gateway_name: impl Into<String>,
        gateway_namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            gateway: ParentRef {
                name: gateway_name.into(),
                namespace: Some(gateway_namespace.into()),
            },
        }
    }

    /// Build the gateway client from configuration; `None` when disabled.
    pub async fn from_config(config: &GatewayConfig) -> Result<Option<Self>, KubeError> {
        if !config.enabled {
            return Ok(None);
        }
        let client = crate::client::connect(config.in_cluster, config.kubeconfig.as_deref()).await?;
        Ok(Some(Self::new(
            client,
            &config.gateway_name,
            &config.gateway_namespace,
        )))
    }

    fn routes(&self, namespace: &str) -> Api<AIGatewayRoute> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn service_backends(&self, namespace: &str) -> Api<AIServiceBackend> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn envoy_backends(&self, namespace: &str) -> Api<Backend> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn managed_labels(labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = labels.clone();
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGER.to_string());
    labels
}

// --- Routes ---

fn backend_ref(backend: &WeightedBackend) -> RouteBackendRef {
    RouteBackendRef {
        name: backend.name.clone(),
        namespace: backend.namespace.clone().filter(|ns| !ns.is_empty()),
        weight: Some(backend.weight),
        priority: (backend.priority > 0).then_some(backend.priority),
        model_name_override: backend.model_name_override.clone().filter(|m| !m.is_empty()),
    }
}

fn weighted_backend(backend: &RouteBackendRef) -> WeightedBackend {
    WeightedBackend {
        name: backend.name.clone(),
        namespace: backend.namespace.clone(),
        weight: backend.weight.unwrap_or(DEFAULT_BACKEND_WEIGHT),
        priority: backend.priority.unwrap_or(0),
        variant_tag: None,
        model_name_override: backend.model_name_override.clone(),
    }
}

fn request_cost(cost: &LlmRequestCost) -> RequestCost {
    let (cost_type, cel) = match &cost.kind {
        LlmRequestCostKind::InputToken => ("InputToken", None),
        LlmRequestCostKind::OutputToken => ("OutputToken", None),
        LlmRequestCostKind::TotalToken => ("TotalToken", None),
        LlmRequestCostKind::CachedInputToken => ("CachedInputToken", None),
        LlmRequestCostKind::Cel { expression } => ("CEL", Some(expression.clone())),
    };
    RequestCost {
        metadata_key: cost.metadata_key.clone(),
        cost_type: cost_type.to_string(),
        cel,
    }
}

/// Unknown cost types are dropped with a warning.
fn llm_request_cost(cost: &RequestCost) -> Option<LlmRequestCost> {
    let kind = match cost.cost_type.as_str() {
        "InputToken" => LlmRequestCostKind::InputToken,
        "OutputToken" => LlmRequestCostKind::OutputToken,
        "TotalToken" => LlmRequestCostKind::TotalToken,
        "CachedInputToken" => LlmRequestCostKind::CachedInputToken,
        "CEL" => LlmRequestCostKind::Cel {
            expression: cost.cel.clone().unwrap_or_default(),
        },
        other => {
            warn!(cost_type = other, metadata_key = %cost.metadata_key, "Ignoring unknown request cost type");
            return None;
        }
    };
    Some(LlmRequestCost {
        metadata_key: cost.metadata_key.clone(),
        kind,
    })
}

/// Build the `AIGatewayRoute` object for `route`, attached to `gateway`.
pub fn build_route(route: &GatewayRoute, gateway: &ParentRef) -> AIGatewayRoute {
    let matches = if route.model_name.is_empty() {
        Vec::new()
    } else {
        vec![RouteMatch {
            headers: vec![HeaderMatch {
                match_type: Some("Exact".to_string()),
                name: MODEL_HEADER.to_string(),
                value: route.model_name.clone(),
            }],
        }]
    };

    let spec = AIGatewayRouteSpec {
        parent_refs: vec![gateway.clone()],
        rules: vec![RouteRule {
            matches,
            backend_refs: route.backends.iter().map(backend_ref).collect(),
            ..Default::default()
        }],
        llm_request_costs: route.request_costs.iter().map(request_cost).collect(),
        ..Default::default()
    };

    let mut object = AIGatewayRoute::new(&route.name, spec);
    object.metadata.namespace = Some(route.namespace.clone());
    object.metadata.labels = Some(managed_labels(&route.labels));
    object
}

/// Read a route back. Backends and the model name come from the first
/// rule; variant tags are not stored on the object.
pub fn parse_route(object: &AIGatewayRoute) -> GatewayRoute {
    let rule = object.spec.rules.first();
    let model_name = rule
        .into_iter()
        .flat_map(|r| &r.matches)
        .flat_map(|m| &m.headers)
        .find(|h| h.name == MODEL_HEADER)
        .map(|h| h.value.clone())
        .unwrap_or_default();

    GatewayRoute {
        name: object.name_any(),
        namespace: object.namespace().unwrap_or_default(),
        model_name,
        backends: rule
            .map(|r| r.backend_refs.iter().map(weighted_backend).collect())
            .unwrap_or_default(),
        labels: object.labels().clone(),
        request_costs: object
            .spec
            .llm_request_costs
            .iter()
            .filter_map(llm_request_cost)
            .collect(),
    }
}

/// Ready when an `Accepted=True` condition is present.
pub fn route_status(object: &AIGatewayRoute) -> RouteStatus {
    let conditions = object
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    let accepted = conditions
        .iter()
        .find(|c| c.type_ == "Accepted" && c.is_true());

    RouteStatus {
        ready: accepted.is_some(),
        conditions: conditions
            .iter()
            .map(|c| {
                c.message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| c.type_.clone())
            })
            .collect(),
        last_updated: accepted.and_then(|c| c.last_transition_time.clone()),
    }
}

/// Replace the backend references of the route's first rule, creating the
/// rule if the route has none.
fn set_backends(object: &mut AIGatewayRoute, backends: &[WeightedBackend]) {
    let refs = backends.iter().map(backend_ref).collect();
    match object.spec.rules.first_mut() {
        Some(rule) => rule.backend_refs = refs,
        None => object.spec.rules.push(RouteRule {
            backend_refs: refs,
            ..Default::default()
        }),
    }
}

// --- AI service backends ---

pub fn build_service_backend(backend: &AiServiceBackend) -> AIServiceBackend {
    let header_mutation = backend
        .header_mutation
        .as_ref()
        .filter(|m| !m.is_empty())
        .map(|m| HeaderMutationSpec {
            set: m
                .set
                .iter()
                .map(|h| HeaderValue {
                    name: h.name.clone(),
                    value: h.value.clone(),
                })
                .collect(),
            remove: m.remove.clone(),
        });

    let spec = AIServiceBackendSpec {
        schema: VersionedSchema {
            name: backend.schema.as_str().to_string(),
            version: None,
        },
        backend_ref: BackendObjectRef {
            name: backend.backend_ref.name.clone(),
            namespace: backend.backend_ref.namespace.clone(),
            group: backend.backend_ref.group.clone(),
            kind: backend.backend_ref.kind.clone(),
        },
        header_mutation,
        ..Default::default()
    };

    let mut object = AIServiceBackend::new(&backend.name, spec);
    object.metadata.namespace = Some(backend.namespace.clone());
    object.metadata.labels = Some(managed_labels(&backend.labels));
    object
}

/// Fails with `InvalidSchema` when the object names a schema weir does not
/// know.
pub fn parse_service_backend(object: &AIServiceBackend) -> Result<AiServiceBackend> {
    let spec = &object.spec;
    Ok(AiServiceBackend {
        name: object.name_any(),
        namespace: object.namespace().unwrap_or_default(),
        schema: spec.schema.name.parse::<ApiSchema>()?,
        backend_ref: BackendRef {
            name: spec.backend_ref.name.clone(),
            namespace: spec.backend_ref.namespace.clone(),
            group: spec.backend_ref.group.clone(),
            kind: spec.backend_ref.kind.clone(),
        },
        header_mutation: spec.header_mutation.as_ref().map(|m| HeaderMutation {
            set: m
                .set
                .iter()
                .map(|h| HttpHeader {
                    name: h.name.clone(),
                    value: h.value.clone(),
                })
                .collect(),
            remove: m.remove.clone(),
        }),
        labels: object.labels().clone(),
    })
}

// --- Envoy backends ---

fn endpoint_spec(endpoint: &BackendEndpoint) -> EndpointSpec {
    match endpoint {
        BackendEndpoint::Fqdn { hostname, port } => EndpointSpec {
            fqdn: Some(FqdnEndpoint {
                hostname: hostname.clone(),
                port: *port,
            }),
            ip: None,
        },
        BackendEndpoint::Ip { address, port } => EndpointSpec {
            fqdn: None,
            ip: Some(IpEndpoint {
                address: address.clone(),
                port: *port,
            }),
        },
    }
}

/// Endpoint kinds weir does not model (e.g. unix sockets) are skipped.
fn backend_endpoint(spec: &EndpointSpec) -> Option<BackendEndpoint> {
    match (&spec.fqdn, &spec.ip) {
        (Some(fqdn), _) => Some(BackendEndpoint::Fqdn {
            hostname: fqdn.hostname.clone(),
            port: fqdn.port,
        }),
        (None, Some(ip)) => Some(BackendEndpoint::Ip {
            address: ip.address.clone(),
            port: ip.port,
        }),
        (None, None) => None,
    }
}

pub fn build_envoy_backend(backend: &EnvoyBackend) -> Backend {
    let spec = BackendSpec {
        endpoints: backend.endpoints.iter().map(endpoint_spec).collect(),
        ..Default::default()
    };
    let mut object = Backend::new(&backend.name, spec);
    object.metadata.namespace = Some(backend.namespace.clone());
    object.metadata.labels = Some(managed_labels(&backend.labels));
    object
}

pub fn parse_envoy_backend(object: &Backend) -> EnvoyBackend {
    EnvoyBackend {
        name: object.name_any(),
        namespace: object.namespace().unwrap_or_default(),
        endpoints: object.spec.endpoints.iter().filter_map(backend_endpoint).collect(),
        labels: object.labels().clone(),
    }
}

#[async_trait]
impl AiGateway for EnvoyAiGateway {
    async fn create_route(&self, ctx: &RequestContext, route: &GatewayRoute) -> Result<()> {
        let api = self.routes(&route.namespace);
        let object = build_route(route, &self.gateway);
        ctx.run(async {
            api.create(&PostParams::default(), &object)
                .await
                .map_err(|e| gateway_error(e, ROUTE, &format!("create route {}/{}", route.namespace, route.name)))
        })
        .await?;
        info!(route = %route.name, namespace = %route.namespace, backends = route.backends.len(), "Created AIGatewayRoute");
        Ok(())
    }

    async fn update_route(&self, ctx: &RequestContext, route: &GatewayRoute) -> Result<()> {
        let api = self.routes(&route.namespace);
        let action = format!("update route {}/{}", route.namespace, route.name);
        ctx.run(async {
            let existing = api
                .get(&route.name)
                .await
                .map_err(|e| gateway_error(e, ROUTE, &action))?;
            let mut object = build_route(route, &self.gateway);
            object.metadata.resource_version = existing.resource_version();
            object.spec.extra = existing.spec.extra;
            api.replace(&route.name, &PostParams::default(), &object)
                .await
                .map_err(|e| gateway_error(e, ROUTE, &action))
        })
        .await?;
        debug!(route = %route.name, namespace = %route.namespace, "Updated AIGatewayRoute");
        Ok(())
    }

    async fn delete_route(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()> {
        let api = self.routes(namespace);
        ctx.run(async {
            api.delete(name, &DeleteParams::default())
                .await
                .map_err(|e| gateway_error(e, ROUTE, &format!("delete route {namespace}/{name}")))
        })
        .await?;
        info!(route = name, namespace, "Deleted AIGatewayRoute");
        Ok(())
    }

    async fn get_route(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<GatewayRoute> {
        let api = self.routes(namespace);
        let object = ctx
            .run(async {
                api.get(name)
                    .await
                    .map_err(|e| gateway_error(e, ROUTE, &format!("get route {namespace}/{name}")))
            })
            .await?;
        Ok(parse_route(&object))
    }

    async fn route_status(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<RouteStatus> {
        let api = self.routes(namespace);
        let object = ctx
            .run(async {
                api.get_status(name)
                    .await
                    .map_err(|e| gateway_error(e, ROUTE, &format!("get route status {namespace}/{name}")))
            })
            .await?;
        Ok(route_status(&object))
    }

    async fn update_traffic_weights(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        route_name: &str,
        backends: &[WeightedBackend],
    ) -> Result<()> {
        let api = self.routes(namespace);
        let action = format!("update weights {namespace}/{route_name}");
        ctx.run(async {
            let mut attempt = 1;
            loop {
                let mut object = api
                    .get(route_name)
                    .await
                    .map_err(|e| gateway_error(e, ROUTE, &action))?;
                set_backends(&mut object, backends);
                match api.replace(route_name, &PostParams::default(), &object).await {
                    Ok(_) => return Ok(()),
                    Err(e) if crate::error::api_code(&e) == Some(409) && attempt < REPLACE_ATTEMPTS => {
                        debug!(route = route_name, attempt, "Route changed underneath; retrying");
                        attempt += 1;
                    }
                    Err(e) => return Err(WeirError::gateway(format!("{action}: {e}"))),
                }
            }
        })
        .await?;
        info!(route = route_name, namespace, backends = backends.len(), "Updated route weights");
        Ok(())
    }

    async fn create_service_backend(&self, ctx: &RequestContext, backend: &AiServiceBackend) -> Result<()> {
        let api = self.service_backends(&backend.namespace);
        let object = build_service_backend(backend);
        ctx.run(async {
            api.create(&PostParams::default(), &object).await.map_err(|e| {
                gateway_error(
                    e,
                    SERVICE_BACKEND,
                    &format!("create AIServiceBackend {}/{}", backend.namespace, backend.name),
                )
            })
        })
        .await?;
        info!(backend = %backend.name, namespace = %backend.namespace, schema = %backend.schema, "Created AIServiceBackend");
        Ok(())
    }

    async fn update_service_backend(&self, ctx: &RequestContext, backend: &AiServiceBackend) -> Result<()> {
        let api = self.service_backends(&backend.namespace);
        let action = format!("update AIServiceBackend {}/{}", backend.namespace, backend.name);
        ctx.run(async {
            let existing = api
                .get(&backend.name)
                .await
                .map_err(|e| gateway_error(e, SERVICE_BACKEND, &action))?;
            let mut object = build_service_backend(backend);
            object.metadata.resource_version = existing.resource_version();
            object.spec.extra = existing.spec.extra;
            api.replace(&backend.name, &PostParams::default(), &object)
                .await
                .map_err(|e| gateway_error(e, SERVICE_BACKEND, &action))
        })
        .await?;
        Ok(())
    }

    async fn delete_service_backend(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let api = self.service_backends(namespace);
        ctx.run(async {
            api.delete(name, &DeleteParams::default()).await.map_err(|e| {
                gateway_error(e, SERVICE_BACKEND, &format!("delete AIServiceBackend {namespace}/{name}"))
            })
        })
        .await?;
        info!(backend = name, namespace, "Deleted AIServiceBackend");
        Ok(())
    }

    async fn get_service_backend(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<AiServiceBackend> {
        let api = self.service_backends(namespace);
        let object = ctx
            .run(async {
                api.get(name).await.map_err(|e| {
                    gateway_error(e, SERVICE_BACKEND, &format!("get AIServiceBackend {namespace}/{name}"))
                })
            })
            .await?;
        parse_service_backend(&object)
    }

    async fn list_service_backends(
        &self,
        ctx: &RequestContext,
        namespace: &str,
    ) -> Result<Vec<AiServiceBackend>> {
        let api = self.service_backends(namespace);
        let list = ctx
            .run(async {
                api.list(&ListParams::default()).await.map_err(|e| {
                    gateway_error(e, SERVICE_BACKEND, &format!("list AIServiceBackends in {namespace}"))
                })
            })
            .await?;
        Ok(list
            .items
            .iter()
            .filter_map(|object| match parse_service_backend(object) {
                Ok(backend) => Some(backend),
                Err(e) => {
                    warn!(backend = %object.name_any(), namespace, error = %e, "Skipping AIServiceBackend");
                    None
                }
            })
            .collect())
    }

    async fn create_envoy_backend(&self, ctx: &RequestContext, backend: &EnvoyBackend) -> Result<()> {
        let api = self.envoy_backends(&backend.namespace);
        let object = build_envoy_backend(backend);
        ctx.run(async {
            api.create(&PostParams::default(), &object).await.map_err(|e| {
                gateway_error(
                    e,
                    ENVOY_BACKEND,
                    &format!("create Backend {}/{}", backend.namespace, backend.name),
                )
            })
        })
        .await?;
        info!(backend = %backend.name, namespace = %backend.namespace, endpoints = backend.endpoints.len(), "Created Envoy Backend");
        Ok(())
    }

    async fn update_envoy_backend(&self, ctx: &RequestContext, backend: &EnvoyBackend) -> Result<()> {
        let api = self.envoy_backends(&backend.namespace);
        let action = format!("update Backend {}/{}", backend.namespace, backend.name);
        ctx.run(async {
            let existing = api
                .get(&backend.name)
                .await
                .map_err(|e| gateway_error(e, ENVOY_BACKEND, &action))?;
            let mut object = build_envoy_backend(backend);
            object.metadata.resource_version = existing.resource_version();
            object.spec.extra = existing.spec.extra;
            api.replace(&backend.name, &PostParams::default(), &object)
                .await
                .map_err(|e| gateway_error(e, ENVOY_BACKEND, &action))
        })
        .await?;
        Ok(())
    }

    async fn delete_envoy_backend(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()> {
        let api = self.envoy_backends(namespace);
        ctx.run(async {
            api.delete(name, &DeleteParams::default()).await.map_err(|e| {
                gateway_error(e, ENVOY_BACKEND, &format!("delete Backend {namespace}/{name}"))
            })
        })
        .await?;
        info!(backend = name, namespace, "Deleted Envoy Backend");
        Ok(())
    }

    async fn get_envoy_backend(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<EnvoyBackend> {
        let api = self.envoy_backends(namespace);
        let object = ctx
            .run(async {
                api.get(name).await.map_err(|e| {
                    gateway_error(e, ENVOY_BACKEND, &format!("get Backend {namespace}/{name}"))
                })
            })
            .await?;
        Ok(parse_envoy_backend(&object))
    }

    async fn list_envoy_backends(&self, ctx: &RequestContext, namespace: &str) -> Result<Vec<EnvoyBackend>> {
        let api = self.envoy_backends(namespace);
        let list = ctx
            .run(async {
                api.list(&ListParams::default()).await.map_err(|e| {
                    gateway_error(e, ENVOY_BACKEND, &format!("list Backends in {namespace}"))
                })
            })
            .await?;
        Ok(list.items.iter().map(parse_envoy_backend).collect())
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{AIGatewayRouteStatus, StatusCondition};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn gateway() -> ParentRef {
        ParentRef {
            name: "ai-gateway".into(),
            namespace: Some("envoy-gateway-system".into()),
        }
    }

    fn canary_route() -> GatewayRoute {
        GatewayRoute::new("llama-route", "model-serving", "llama")
            .with_label("traffic-config-id", "cfg-1")
            .with_backends(vec![
                WeightedBackend::variant("llama", 80, "stable"),
                WeightedBackend::variant("llama-canary", 20, "canary"),
            ])
    }

    #[test]
    fn test_build_route_shape() {
        let object = build_route(&canary_route(), &gateway());
        assert_eq!(object.name_any(), "llama-route");
        assert_eq!(object.namespace().as_deref(), Some("model-serving"));
        assert_eq!(object.labels()[LABEL_MANAGED_BY], MANAGER);
        assert_eq!(object.labels()["traffic-config-id"], "cfg-1");

        assert_eq!(
            serde_json::to_value(&object.spec).unwrap(),
            json!({
                "parentRefs": [{"name": "ai-gateway", "namespace": "envoy-gateway-system"}],
                "rules": [{
                    "matches": [{"headers": [{"type": "Exact", "name": "x-ai-eg-model", "value": "llama"}]}],
                    "backendRefs": [
                        {"name": "llama", "weight": 80},
                        {"name": "llama-canary", "weight": 20}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_backend_ref_optional_fields() {
        let mut backend = WeightedBackend::variant("anthropic-svc", 40, "vm");
        backend.namespace = Some("llm".into());
        backend.priority = 2;
        backend.model_name_override = Some("claude-sonnet".into());
        let reference = backend_ref(&backend);
        assert_eq!(
            serde_json::to_value(&reference).unwrap(),
            json!({
                "name": "anthropic-svc",
                "namespace": "llm",
                "weight": 40,
                "priority": 2,
                "modelNameOverride": "claude-sonnet"
            })
        );

        backend.priority = 0;
        backend.model_name_override = Some(String::new());
        let reference = backend_ref(&backend);
        assert_eq!(reference.priority, None);
        assert_eq!(reference.model_name_override, None);
    }

    #[test]
    fn test_parse_route_reads_first_rule() {
        let mut route = canary_route();
        route.request_costs = vec![
            LlmRequestCost {
                metadata_key: "llm_total_token".into(),
                kind: LlmRequestCostKind::TotalToken,
            },
            LlmRequestCost {
                metadata_key: "weighted".into(),
                kind: LlmRequestCostKind::Cel {
                    expression: "input_tokens + output_tokens * 4".into(),
                },
            },
        ];
        let parsed = parse_route(&build_route(&route, &gateway()));

        assert_eq!(parsed.name, route.name);
        assert_eq!(parsed.model_name, "llama");
        assert_eq!(parsed.request_costs, route.request_costs);
        assert_eq!(
            parsed.backends.iter().map(|b| (b.name.as_str(), b.weight)).collect::<Vec<_>>(),
            vec![("llama", 80), ("llama-canary", 20)]
        );
        assert!(parsed.backends.iter().all(|b| b.variant_tag.is_none()));
        assert_eq!(parsed.labels[LABEL_MANAGED_BY], MANAGER);
    }

    #[test]
    fn test_route_without_model_name_has_no_match() {
        let route = GatewayRoute::new("catch-all", "model-serving", "");
        let object = build_route(&route, &gateway());
        assert!(object.spec.rules[0].matches.is_empty());
        assert_eq!(parse_route(&object).model_name, "");
    }

    #[test]
    fn test_parse_route_defaults_missing_weight() {
        let object: AIGatewayRoute = serde_json::from_value(json!({
            "apiVersion": "aigateway.envoyproxy.io/v1alpha1",
            "kind": "AIGatewayRoute",
            "metadata": {"name": "external", "namespace": "llm"},
            "spec": {"rules": [{"backendRefs": [{"name": "a"}, {"name": "b", "weight": 3}]}]}
        }))
        .unwrap();
        let route = parse_route(&object);
        assert_eq!(route.backends[0].weight, DEFAULT_BACKEND_WEIGHT);
        assert_eq!(route.backends[1].weight, 3);
    }

    #[test]
    fn test_set_backends_keeps_matches() {
        let mut object = build_route(&canary_route(), &gateway());
        set_backends(&mut object, &[WeightedBackend::variant("llama-canary", 100, "stable")]);
        let rule = &object.spec.rules[0];
        assert_eq!(rule.matches.len(), 1);
        assert_eq!(rule.backend_refs.len(), 1);
        assert_eq!(rule.backend_refs[0].weight, Some(100));

        object.spec.rules.clear();
        set_backends(&mut object, &[WeightedBackend::variant("llama", 100, "stable")]);
        assert_eq!(object.spec.rules.len(), 1);
    }

    #[test]
    fn test_route_status_accepted() {
        let mut object = build_route(&canary_route(), &gateway());
        assert_eq!(route_status(&object), RouteStatus::default());

        object.status = Some(AIGatewayRouteStatus {
            conditions: vec![
                StatusCondition {
                    type_: "Accepted".into(),
                    status: "True".into(),
                    message: Some("Route is accepted".into()),
                    last_transition_time: Some("2026-10-18T09:00:00Z".into()),
                    ..Default::default()
                },
                StatusCondition {
                    type_: "ResolvedRefs".into(),
                    status: "True".into(),
                    ..Default::default()
                },
            ],
        });
        let status = route_status(&object);
        assert!(status.ready);
        assert_eq!(status.conditions, vec!["Route is accepted", "ResolvedRefs"]);
        assert_eq!(status.last_updated.as_deref(), Some("2026-10-18T09:00:00Z"));

        object.status.as_mut().unwrap().conditions[0].status = "False".into();
        assert!(!route_status(&object).ready);
    }

    #[test]
    fn test_service_backend_conversion() {
        let backend = AiServiceBackend {
            name: "anthropic-svc".into(),
            namespace: "llm".into(),
            schema: ApiSchema::Anthropic,
            backend_ref: BackendRef::envoy("anthropic"),
            header_mutation: Some(HeaderMutation {
                set: vec![HttpHeader {
                    name: "anthropic-version".into(),
                    value: "2023-06-01".into(),
                }],
                remove: vec!["x-internal".into()],
            }),
            labels: BTreeMap::from([("provider".into(), "anthropic".into())]),
        };
        let object = build_service_backend(&backend);
        assert_eq!(
            serde_json::to_value(&object.spec).unwrap(),
            json!({
                "schema": {"name": "Anthropic"},
                "backendRef": {"name": "anthropic", "group": "gateway.envoyproxy.io", "kind": "Backend"},
                "headerMutation": {
                    "set": [{"name": "anthropic-version", "value": "2023-06-01"}],
                    "remove": ["x-internal"]
                }
            })
        );

        let parsed = parse_service_backend(&object).unwrap();
        assert_eq!(parsed.labels[LABEL_MANAGED_BY], MANAGER);
        assert_eq!(parsed.labels["provider"], "anthropic");
        assert_eq!(
            AiServiceBackend {
                labels: backend.labels.clone(),
                ..parsed
            },
            backend
        );
    }

    #[test]
    fn test_service_backend_unknown_schema() {
        let mut object = build_service_backend(&AiServiceBackend {
            name: "cohere".into(),
            namespace: "llm".into(),
            schema: ApiSchema::OpenAi,
            backend_ref: BackendRef::envoy("cohere"),
            header_mutation: None,
            labels: BTreeMap::new(),
        });
        assert!(object.spec.header_mutation.is_none());
        object.spec.schema.name = "Cohere".into();
        assert_eq!(
            parse_service_backend(&object).unwrap_err(),
            WeirError::InvalidSchema("Cohere".into())
        );
    }

    #[test]
    fn test_envoy_backend_conversion() {
        let backend = EnvoyBackend {
            name: "openai".into(),
            namespace: "llm".into(),
            endpoints: vec![
                BackendEndpoint::Fqdn {
                    hostname: "api.openai.com".into(),
                    port: 443,
                },
                BackendEndpoint::Ip {
                    address: "10.0.0.7".into(),
                    port: 8080,
                },
            ],
            labels: BTreeMap::new(),
        };
        let object = build_envoy_backend(&backend);
        assert_eq!(
            serde_json::to_value(&object.spec).unwrap(),
            json!({
                "endpoints": [
                    {"fqdn": {"hostname": "api.openai.com", "port": 443}},
                    {"ip": {"address": "10.0.0.7", "port": 8080}}
                ]
            })
        );
        let parsed = parse_envoy_backend(&object);
        assert_eq!(parsed.endpoints, backend.endpoints);
    }

    #[test]
    fn test_unmodelled_endpoint_skipped() {
        let object: Backend = serde_json::from_value(json!({
            "apiVersion": "gateway.envoyproxy.io/v1alpha1",
            "kind": "Backend",
            "metadata": {"name": "local", "namespace": "llm"},
            "spec": {"endpoints": [
                {"unix": {"path": "/var/run/llm.sock"}},
                {"fqdn": {"hostname": "llm.local", "port": 80}}
            ]}
        }))
        .unwrap();
        let parsed = parse_envoy_backend(&object);
        assert_eq!(parsed.endpoints.len(), 1);
        assert!(parsed.labels.is_empty());
    }
}

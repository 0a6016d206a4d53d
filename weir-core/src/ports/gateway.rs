//! AI gateway port: routes, upstream service backends, and network
//! backends.
//!
//! Implementations return the typed not-found and conflict sentinels
//! (`GatewayRouteNotFound`, `BackendNotFound`, `EnvoyBackendNotFound`, and
//! their `...Exists` counterparts) for missing or duplicate resources.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::domain::{AiServiceBackend, EnvoyBackend, GatewayRoute, RouteStatus, WeightedBackend};
use crate::error::{Result, WeirError};

#[async_trait]
pub trait AiGateway: Send + Sync {
    async fn create_route(&self, ctx: &RequestContext, route: &GatewayRoute) -> Result<()>;

    async fn update_route(&self, ctx: &RequestContext, route: &GatewayRoute) -> Result<()>;

    async fn delete_route(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()>;

    async fn get_route(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<GatewayRoute>;

    async fn route_status(&self, ctx: &RequestContext, namespace: &str, name: &str)
    -> Result<RouteStatus>;

    /// Replace the backend list of an existing route.
    async fn update_traffic_weights(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        route_name: &str,
        backends: &[WeightedBackend],
    ) -> Result<()>;

    async fn create_service_backend(&self, ctx: &RequestContext, backend: &AiServiceBackend) -> Result<()>;

    async fn update_service_backend(&self, ctx: &RequestContext, backend: &AiServiceBackend) -> Result<()>;

    async fn delete_service_backend(&self, ctx: &RequestContext, namespace: &str, name: &str)
    -> Result<()>;

    async fn get_service_backend(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<AiServiceBackend>;

    async fn list_service_backends(
        &self,
        ctx: &RequestContext,
        namespace: &str,
    ) -> Result<Vec<AiServiceBackend>>;

    async fn create_envoy_backend(&self, ctx: &RequestContext, backend: &EnvoyBackend) -> Result<()>;

    async fn update_envoy_backend(&self, ctx: &RequestContext, backend: &EnvoyBackend) -> Result<()>;

    async fn delete_envoy_backend(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()>;

    async fn get_envoy_backend(&self, ctx: &RequestContext, namespace: &str, name: &str)
    -> Result<EnvoyBackend>;

    async fn list_envoy_backends(&self, ctx: &RequestContext, namespace: &str)
    -> Result<Vec<EnvoyBackend>>;

    fn is_available(&self) -> bool;
}

/// Calls recorded by [`MockAiGateway`]. Reads are not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    CreateRoute { namespace: String, name: String },
    UpdateRoute { namespace: String, name: String },
    DeleteRoute { namespace: String, name: String },
    UpdateWeights {
        namespace: String,
        name: String,
        backends: Vec<WeightedBackend>,
    },
    CreateServiceBackend { namespace: String, name: String },
    UpdateServiceBackend { namespace: String, name: String },
    DeleteServiceBackend { namespace: String, name: String },
    CreateEnvoyBackend { namespace: String, name: String },
    UpdateEnvoyBackend { namespace: String, name: String },
    DeleteEnvoyBackend { namespace: String, name: String },
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
struct MockGatewayState {
    routes: BTreeMap<Key, GatewayRoute>,
    service_backends: BTreeMap<Key, AiServiceBackend>,
    envoy_backends: BTreeMap<Key, EnvoyBackend>,
    calls: Vec<GatewayCall>,
    fail_writes: bool,
}

impl MockGatewayState {
    fn check_writable(&self) -> Result<()> {
        if self.fail_writes {
            Err(WeirError::gateway("the server is currently unable to handle the request"))
        } else {
            Ok(())
        }
    }
}

/// In-process gateway for tests and local development.
#[derive(Debug)]
pub struct MockAiGateway {
    available: bool,
    state: Mutex<MockGatewayState>,
}

impl Default for MockAiGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAiGateway {
    pub fn new() -> Self {
        Self {
            available: true,
            state: Mutex::new(MockGatewayState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Make every mutating call fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn route(&self, namespace: &str, name: &str) -> Option<GatewayRoute> {
        self.state().routes.get(&key(namespace, name)).cloned()
    }

    pub fn route_names(&self) -> Vec<String> {
        self.state()
            .routes
            .keys()
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Register an upstream backend so virtual models can reference it.
    pub fn seed_service_backend(&self, backend: AiServiceBackend) {
        self.state()
            .service_backends
            .insert(key(&backend.namespace, &backend.name), backend);
    }
}

#[async_trait]
impl AiGateway for MockAiGateway {
    async fn create_route(&self, ctx: &RequestContext, route: &GatewayRoute) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::CreateRoute {
            namespace: route.namespace.clone(),
            name: route.name.clone(),
        });
        state.check_writable()?;
        let k = key(&route.namespace, &route.name);
        if state.routes.contains_key(&k) {
            return Err(WeirError::GatewayRouteExists);
        }
        state.routes.insert(k, route.clone());
        Ok(())
    }

    async fn update_route(&self, ctx: &RequestContext, route: &GatewayRoute) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::UpdateRoute {
            namespace: route.namespace.clone(),
            name: route.name.clone(),
        });
        state.check_writable()?;
        let existing = state
            .routes
            .get_mut(&key(&route.namespace, &route.name))
            .ok_or(WeirError::GatewayRouteNotFound)?;
        *existing = route.clone();
        Ok(())
    }

    async fn delete_route(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::DeleteRoute {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.check_writable()?;
        state
            .routes
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or(WeirError::GatewayRouteNotFound)
    }

    async fn get_route(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<GatewayRoute> {
        ctx.check()?;
        self.route(namespace, name).ok_or(WeirError::GatewayRouteNotFound)
    }

    async fn route_status(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<RouteStatus> {
        ctx.check()?;
        self.route(namespace, name)
            .map(|_| RouteStatus {
                ready: true,
                conditions: vec!["Accepted".to_string()],
                last_updated: None,
            })
            .ok_or(WeirError::GatewayRouteNotFound)
    }

    async fn update_traffic_weights(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        route_name: &str,
        backends: &[WeightedBackend],
    ) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::UpdateWeights {
            namespace: namespace.to_string(),
            name: route_name.to_string(),
            backends: backends.to_vec(),
        });
        state.check_writable()?;
        let route = state
            .routes
            .get_mut(&key(namespace, route_name))
            .ok_or(WeirError::GatewayRouteNotFound)?;
        route.backends = backends.to_vec();
        Ok(())
    }

    async fn create_service_backend(&self, ctx: &RequestContext, backend: &AiServiceBackend) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::CreateServiceBackend {
            namespace: backend.namespace.clone(),
            name: backend.name.clone(),
        });
        state.check_writable()?;
        let k = key(&backend.namespace, &backend.name);
        if state.service_backends.contains_key(&k) {
            return Err(WeirError::BackendAlreadyExists);
        }
        state.service_backends.insert(k, backend.clone());
        Ok(())
    }

    async fn update_service_backend(&self, ctx: &RequestContext, backend: &AiServiceBackend) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::UpdateServiceBackend {
            namespace: backend.namespace.clone(),
            name: backend.name.clone(),
        });
        state.check_writable()?;
        let existing = state
            .service_backends
            .get_mut(&key(&backend.namespace, &backend.name))
            .ok_or(WeirError::BackendNotFound)?;
        *existing = backend.clone();
        Ok(())
    }

    async fn delete_service_backend(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::DeleteServiceBackend {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.check_writable()?;
        state
            .service_backends
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or(WeirError::BackendNotFound)
    }

    async fn get_service_backend(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<AiServiceBackend> {
        ctx.check()?;
        self.state()
            .service_backends
            .get(&key(namespace, name))
            .cloned()
            .ok_or(WeirError::BackendNotFound)
    }

    async fn list_service_backends(
        &self,
        ctx: &RequestContext,
        namespace: &str,
    ) -> Result<Vec<AiServiceBackend>> {
        ctx.check()?;
        Ok(self
            .state()
            .service_backends
            .values()
            .filter(|b| b.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn create_envoy_backend(&self, ctx: &RequestContext, backend: &EnvoyBackend) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::CreateEnvoyBackend {
            namespace: backend.namespace.clone(),
            name: backend.name.clone(),
        });
        state.check_writable()?;
        let k = key(&backend.namespace, &backend.name);
        if state.envoy_backends.contains_key(&k) {
            return Err(WeirError::EnvoyBackendAlreadyExists);
        }
        state.envoy_backends.insert(k, backend.clone());
        Ok(())
    }

    async fn update_envoy_backend(&self, ctx: &RequestContext, backend: &EnvoyBackend) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::UpdateEnvoyBackend {
            namespace: backend.namespace.clone(),
            name: backend.name.clone(),
        });
        state.check_writable()?;
        let existing = state
            .envoy_backends
            .get_mut(&key(&backend.namespace, &backend.name))
            .ok_or(WeirError::EnvoyBackendNotFound)?;
        *existing = backend.clone();
        Ok(())
    }

    async fn delete_envoy_backend(&self, ctx: &RequestContext, namespace: &str, name: &str) -> Result<()> {
        ctx.check()?;
        let mut state = self.state();
        state.calls.push(GatewayCall::DeleteEnvoyBackend {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        state.check_writable()?;
        state
            .envoy_backends
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or(WeirError::EnvoyBackendNotFound)
    }

    async fn get_envoy_backend(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<EnvoyBackend> {
        ctx.check()?;
        self.state()
            .envoy_backends
            .get(&key(namespace, name))
            .cloned()
            .ok_or(WeirError::EnvoyBackendNotFound)
    }

    async fn list_envoy_backends(
        &self,
        ctx: &RequestContext,
        namespace: &str,
    ) -> Result<Vec<EnvoyBackend>> {
        ctx.check()?;
        Ok(self
            .state()
            .envoy_backends
            .values()
            .filter(|b| b.namespace == namespace)
            .cloned()
            .collect())
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

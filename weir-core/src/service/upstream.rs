//! Upstream backends on the AI gateway: `AIServiceBackend` resources (one
//! per LLM provider) and the Envoy `Backend` resources they point at.
//!
//! These are thin, validated pass-throughs. Nothing is persisted locally;
//! the gateway is the source of truth.

use std::sync::Arc;

use tracing::info;

use crate::context::RequestContext;
use crate::domain::{AiServiceBackend, EnvoyBackend};
use crate::error::{ErrorKind, Result, WeirError};
use crate::ports::AiGateway;

pub struct UpstreamService {
    gateway: Option<Arc<dyn AiGateway>>,
    default_namespace: String,
}

impl UpstreamService {
    pub fn new(gateway: Option<Arc<dyn AiGateway>>, default_namespace: impl Into<String>) -> Self {
        Self {
            gateway,
            default_namespace: default_namespace.into(),
        }
    }

    fn gateway(&self) -> Result<&Arc<dyn AiGateway>> {
        self.gateway
            .as_ref()
            .filter(|g| g.is_available())
            .ok_or(WeirError::AiGatewayNotAvailable)
    }

    /// Resolve an optional namespace argument.
    pub fn namespace<'a>(&'a self, namespace: Option<&'a str>) -> &'a str {
        namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.default_namespace)
    }

    // --- AI service backends ---

    pub async fn create_service_backend(
        &self,
        ctx: &RequestContext,
        mut backend: AiServiceBackend,
    ) -> Result<AiServiceBackend> {
        let gateway = self.gateway()?;
        backend.namespace = self.namespace(Some(backend.namespace.as_str())).to_string();
        backend.validate()?;
        gateway.create_service_backend(ctx, &backend).await?;
        info!(backend = %backend.name, namespace = %backend.namespace, schema = %backend.schema, "Created AI service backend");
        Ok(backend)
    }

    pub async fn update_service_backend(
        &self,
        ctx: &RequestContext,
        mut backend: AiServiceBackend,
    ) -> Result<AiServiceBackend> {
        let gateway = self.gateway()?;
        backend.namespace = self.namespace(Some(backend.namespace.as_str())).to_string();
        backend.validate()?;
        gateway.update_service_backend(ctx, &backend).await?;
        info!(backend = %backend.name, namespace = %backend.namespace, "Updated AI service backend");
        Ok(backend)
    }

    pub async fn delete_service_backend(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let gateway = self.gateway()?;
        let namespace = self.namespace(namespace);
        gateway.delete_service_backend(ctx, namespace, name).await?;
        info!(backend = name, namespace, "Deleted AI service backend");
        Ok(())
    }

    pub async fn get_service_backend(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<AiServiceBackend> {
        self.gateway()?
            .get_service_backend(ctx, self.namespace(namespace), name)
            .await
    }

    pub async fn list_service_backends(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
    ) -> Result<Vec<AiServiceBackend>> {
        self.gateway()?
            .list_service_backends(ctx, self.namespace(namespace))
            .await
    }

    pub async fn service_backend_exists(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        found(self.get_service_backend(ctx, namespace, name).await)
    }

    // --- Envoy backends ---

    pub async fn create_envoy_backend(
        &self,
        ctx: &RequestContext,
        mut backend: EnvoyBackend,
    ) -> Result<EnvoyBackend> {
        let gateway = self.gateway()?;
        backend.namespace = self.namespace(Some(backend.namespace.as_str())).to_string();
        backend.validate()?;
        gateway.create_envoy_backend(ctx, &backend).await?;
        info!(backend = %backend.name, namespace = %backend.namespace, endpoints = backend.endpoints.len(), "Created Envoy backend");
        Ok(backend)
    }

    pub async fn update_envoy_backend(
        &self,
        ctx: &RequestContext,
        mut backend: EnvoyBackend,
    ) -> Result<EnvoyBackend> {
        let gateway = self.gateway()?;
        backend.namespace = self.namespace(Some(backend.namespace.as_str())).to_string();
        backend.validate()?;
        gateway.update_envoy_backend(ctx, &backend).await?;
        info!(backend = %backend.name, namespace = %backend.namespace, "Updated Envoy backend");
        Ok(backend)
    }

    pub async fn delete_envoy_backend(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let gateway = self.gateway()?;
        let namespace = self.namespace(namespace);
        gateway.delete_envoy_backend(ctx, namespace, name).await?;
        info!(backend = name, namespace, "Deleted Envoy backend");
        Ok(())
    }

    pub async fn get_envoy_backend(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<EnvoyBackend> {
        self.gateway()?
            .get_envoy_backend(ctx, self.namespace(namespace), name)
            .await
    }

    pub async fn list_envoy_backends(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
    ) -> Result<Vec<EnvoyBackend>> {
        self.gateway()?
            .list_envoy_backends(ctx, self.namespace(namespace))
            .await
    }

    pub async fn envoy_backend_exists(
        &self,
        ctx: &RequestContext,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        found(self.get_envoy_backend(ctx, namespace, name).await)
    }
}

/// Fold a lookup into presence; not-found is an answer, not an error.
fn found<T>(lookup: Result<T>) -> Result<bool> {
    match lookup {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

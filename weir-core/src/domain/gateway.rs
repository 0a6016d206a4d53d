//! Value types exchanged with the AI gateway.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeirError};

/// Header the gateway route matches on to select a model.
pub const MODEL_HEADER: &str = "x-ai-eg-model";

/// One backend entry of a gateway route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedBackend {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub weight: i32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name_override: Option<String>,
}

impl WeightedBackend {
    /// Backend for a traffic variant.
    pub fn variant(name: &str, weight: i32, tag: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: None,
            weight,
            priority: 0,
            variant_tag: Some(tag.to_string()),
            model_name_override: None,
        }
    }
}

/// Cost accounting attached to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum LlmRequestCostKind {
    InputToken,
    OutputToken,
    TotalToken,
    CachedInputToken,
    #[serde(rename = "CEL")]
    Cel { expression: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmRequestCost {
    pub metadata_key: String,
    #[serde(flatten)]
    pub kind: LlmRequestCostKind,
}

/// Desired state of an `AIGatewayRoute`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatewayRoute {
    pub name: String,
    pub namespace: String,
    /// Value of the `x-ai-eg-model` header this route answers.
    pub model_name: String,
    #[serde(default)]
    pub backends: Vec<WeightedBackend>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_costs: Vec<LlmRequestCost>,
}

impl GatewayRoute {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_backends(mut self, backends: Vec<WeightedBackend>) -> Self {
        self.backends = backends;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteStatus {
    pub ready: bool,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// API dialect an upstream backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiSchema {
    #[serde(rename = "OpenAI")]
    OpenAi,
    Anthropic,
    #[serde(rename = "AWSBedrock")]
    AwsBedrock,
    #[serde(rename = "AzureOpenAI")]
    AzureOpenAi,
    #[serde(rename = "GCPVertexAI")]
    GcpVertexAi,
    #[serde(rename = "GCPAnthropic")]
    GcpAnthropic,
}

impl ApiSchema {
    pub const ALL: [ApiSchema; 6] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::AwsBedrock,
        Self::AzureOpenAi,
        Self::GcpVertexAi,
        Self::GcpAnthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::AwsBedrock => "AWSBedrock",
            Self::AzureOpenAi => "AzureOpenAI",
            Self::GcpVertexAi => "GCPVertexAI",
            Self::GcpAnthropic => "GCPAnthropic",
        }
    }
}

impl fmt::Display for ApiSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiSchema {
    type Err = WeirError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|schema| schema.as_str() == s)
            .ok_or_else(|| WeirError::InvalidSchema(s.to_string()))
    }
}

/// Reference from an AI service backend to the network backend behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl BackendRef {
    pub const DEFAULT_GROUP: &'static str = "gateway.envoyproxy.io";
    pub const DEFAULT_KIND: &'static str = "Backend";

    /// Reference to an Envoy `Backend`.
    pub fn envoy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            group: Some(Self::DEFAULT_GROUP.to_string()),
            kind: Some(Self::DEFAULT_KIND.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeaderMutation {
    #[serde(default)]
    pub set: Vec<HttpHeader>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl HeaderMutation {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// An upstream LLM provider as the gateway sees it (`AIServiceBackend`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiServiceBackend {
    pub name: String,
    pub namespace: String,
    pub schema: ApiSchema,
    pub backend_ref: BackendRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_mutation: Option<HeaderMutation>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl AiServiceBackend {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.backend_ref.name.trim().is_empty() {
            return Err(WeirError::InvalidBackendName);
        }
        Ok(())
    }
}

/// Network endpoint of an Envoy backend: a hostname or an IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendEndpoint {
    Fqdn { hostname: String, port: u16 },
    Ip { address: String, port: u16 },
}

impl BackendEndpoint {
    pub fn port(&self) -> u16 {
        match self {
            Self::Fqdn { port, .. } | Self::Ip { port, .. } => *port,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port() == 0 {
            return Err(WeirError::InvalidEndpoint("port must be between 1 and 65535".into()));
        }
        match self {
            Self::Fqdn { hostname, .. } if hostname.trim().is_empty() => {
                Err(WeirError::InvalidEndpoint("hostname is required".into()))
            }
            Self::Ip { address, .. } if address.parse::<IpAddr>().is_err() => Err(
                WeirError::InvalidEndpoint(format!("'{address}' is not an IP address")),
            ),
            _ => Ok(()),
        }
    }
}

/// Network-level backend (`gateway.envoyproxy.io/Backend`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvoyBackend {
    pub name: String,
    pub namespace: String,
    pub endpoints: Vec<BackendEndpoint>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl EnvoyBackend {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WeirError::InvalidBackendName);
        }
        if self.endpoints.is_empty() {
            return Err(WeirError::InvalidEndpoint("at least one endpoint is required".into()));
        }
        self.endpoints.iter().try_for_each(BackendEndpoint::validate)
    }
}

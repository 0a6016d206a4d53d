//! # weir kube
//!
//! Kubernetes adapters for the weir ports:
//!
//! - [`KServeRuntime`] implements `ServingRuntime` with KServe
//!   `InferenceService` objects.
//! - [`EnvoyAiGateway`] implements `AiGateway` with Envoy AI Gateway
//!   `AIGatewayRoute` and `AIServiceBackend` objects and Envoy Gateway
//!   `Backend` objects.
//!
//! API failures are translated into `WeirError` sentinels at this
//! boundary: 404 becomes the resource's not-found error, 409 on create its
//! already-exists error.

pub mod aigateway;
pub mod client;
pub mod crd;
pub mod error;
pub mod kserve;

pub use aigateway::EnvoyAiGateway;
pub use client::connect;
pub use error::KubeError;
pub use kserve::KServeRuntime;

//! Ports the services depend on. Adapters live in `weir-store` (SQLite)
//! and `weir-kube` (KServe, Envoy AI Gateway); in-process doubles live
//! next to each trait.

pub mod gateway;
pub mod repository;
pub mod runtime;

pub use gateway::{AiGateway, GatewayCall, MockAiGateway};
pub use repository::{
    InferenceServiceRepository, ModelVersionRepository, RegisteredModelRepository,
    ServingEnvironmentRepository, StoreHealth, TrafficConfigRepository, TrafficVariantRepository,
    VirtualModelRepository,
};
pub use runtime::{Deployment, MockServingRuntime, RuntimeCall, RuntimeStatus, ServingRuntime};

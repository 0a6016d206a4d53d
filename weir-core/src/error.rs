//! Error types for the weir control plane.
//!
//! Every service operation returns [`WeirError`]. Variants carry the exact
//! user-facing message and are grouped into coarse classes by [`ErrorKind`],
//! which the HTTP layer maps to status codes. Adapters (SQLite, Kubernetes)
//! translate their native failures into the sentinel variants at the
//! boundary so callers never see driver errors.

/// Coarse classification of a [`WeirError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    BusinessRule,
    Unavailable,
    Cancelled,
    Internal,
}

/// Top-level error type for weir operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeirError {
    // --- Not found ---
    #[error("traffic config not found")]
    TrafficConfigNotFound,

    #[error("traffic variant not found")]
    TrafficVariantNotFound,

    #[error("virtual model not found")]
    VirtualModelNotFound,

    #[error("backend not found")]
    BackendNotFound,

    #[error("envoy backend not found")]
    EnvoyBackendNotFound,

    #[error("gateway route not found")]
    GatewayRouteNotFound,

    #[error("inference service not found")]
    InferenceServiceNotFound,

    #[error("serving environment not found")]
    ServingEnvironmentNotFound,

    #[error("registered model not found")]
    RegisteredModelNotFound,

    #[error("model version not found")]
    ModelVersionNotFound,

    // --- Conflict ---
    #[error("traffic config already exists for this inference service")]
    TrafficConfigExists,

    #[error("canary variant already exists")]
    CanaryAlreadyExists,

    #[error("variant with this name already exists")]
    VariantAlreadyExists,

    #[error("virtual model with this name already exists")]
    VirtualModelExists,

    #[error("backend already exists in virtual model")]
    BackendAlreadyExists,

    #[error("envoy backend already exists")]
    EnvoyBackendAlreadyExists,

    #[error("gateway route already exists")]
    GatewayRouteExists,

    #[error("inference service with this name already exists")]
    InferenceServiceNameConflict,

    // --- Validation ---
    #[error("traffic weight must be between 0 and 100")]
    InvalidTrafficWeight,

    #[error("total variant weights cannot exceed 100")]
    WeightSumExceeds100,

    #[error("invalid variant name: {0}")]
    InvalidVariantName(String),

    #[error("invalid traffic strategy: {0}")]
    InvalidTrafficStrategy(String),

    #[error("backend name is required")]
    InvalidBackendName,

    #[error("priority must be >= 0")]
    InvalidPriority,

    #[error("virtual model name is required")]
    InvalidVirtualModelName,

    #[error("inference service ID is required")]
    InvalidInferenceServiceId,

    #[error("invalid API schema: {0}")]
    InvalidSchema(String),

    #[error("invalid backend endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("project ID is required (Project-ID header)")]
    MissingProjectId,

    // --- Business rules ---
    #[error("cannot delete stable variant")]
    CannotDeleteStable,

    #[error("cannot promote stable variant to itself")]
    CannotPromoteStable,

    #[error("cannot promote inactive variant")]
    CannotPromoteInactive,

    #[error("no stable variant configured")]
    NoStableVariant,

    #[error("model version is not ready for deployment")]
    VersionNotReady,

    #[error("serving environment has active deployments")]
    ServingEnvHasDeployments,

    // --- Unavailable ---
    #[error("AI gateway is not available")]
    AiGatewayNotAvailable,

    #[error("serving runtime is not available")]
    RuntimeNotAvailable,

    // --- Cancellation ---
    #[error("request cancelled or deadline exceeded")]
    Cancelled,

    // --- Internal ---
    #[error("repository error: {message}")]
    Repository { message: String },

    #[error("serving runtime error: {message}")]
    Runtime { message: String },

    #[error("gateway error: {message}")]
    Gateway { message: String },
}

impl WeirError {
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use WeirError::*;
        match self {
            TrafficConfigNotFound
            | TrafficVariantNotFound
            | VirtualModelNotFound
            | BackendNotFound
            | EnvoyBackendNotFound
            | GatewayRouteNotFound
            | InferenceServiceNotFound
            | ServingEnvironmentNotFound
            | RegisteredModelNotFound
            | ModelVersionNotFound => ErrorKind::NotFound,

            TrafficConfigExists
            | CanaryAlreadyExists
            | VariantAlreadyExists
            | VirtualModelExists
            | BackendAlreadyExists
            | EnvoyBackendAlreadyExists
            | GatewayRouteExists
            | InferenceServiceNameConflict => ErrorKind::Conflict,

            InvalidTrafficWeight
            | WeightSumExceeds100
            | InvalidVariantName(_)
            | InvalidTrafficStrategy(_)
            | InvalidBackendName
            | InvalidPriority
            | InvalidVirtualModelName
            | InvalidInferenceServiceId
            | InvalidSchema(_)
            | InvalidEndpoint(_)
            | MissingProjectId => ErrorKind::Validation,

            CannotDeleteStable
            | CannotPromoteStable
            | CannotPromoteInactive
            | NoStableVariant
            | VersionNotReady
            | ServingEnvHasDeployments => ErrorKind::BusinessRule,

            AiGatewayNotAvailable | RuntimeNotAvailable => ErrorKind::Unavailable,

            Cancelled => ErrorKind::Cancelled,

            Repository { .. } | Runtime { .. } | Gateway { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Convenience alias used across the workspace.
pub type Result<T, E = WeirError> = std::result::Result<T, E>;

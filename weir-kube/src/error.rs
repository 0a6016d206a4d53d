//! Error types for the Kubernetes adapters, and their translation into
//! [`WeirError`] sentinels at the port boundary.

use thiserror::Error;
use weir_core::WeirError;

#[derive(Error, Debug)]
pub enum KubeError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Invalid kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("In-cluster configuration unavailable: {0}")]
    InCluster(#[from] kube::config::InClusterError),

    #[error("Could not infer Kubernetes configuration: {0}")]
    Infer(#[from] kube::config::InferConfigError),
}

/// Status code of an API error response, if the error is one.
pub(crate) fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

/// Sentinels an adapter substitutes for 404 and 409 responses.
#[derive(Debug, Clone)]
pub(crate) struct Sentinels {
    pub not_found: WeirError,
    pub exists: WeirError,
}

pub(crate) const ROUTE: Sentinels = Sentinels {
    not_found: WeirError::GatewayRouteNotFound,
    exists: WeirError::GatewayRouteExists,
};

pub(crate) const SERVICE_BACKEND: Sentinels = Sentinels {
    not_found: WeirError::BackendNotFound,
    exists: WeirError::BackendAlreadyExists,
};

pub(crate) const ENVOY_BACKEND: Sentinels = Sentinels {
    not_found: WeirError::EnvoyBackendNotFound,
    exists: WeirError::EnvoyBackendAlreadyExists,
};

/// Translate a gateway API failure. `action` names the call for the
/// fallback message, e.g. `"create route llm/vm-1a2b3c4d"`.
pub(crate) fn gateway_error(err: kube::Error, sentinels: Sentinels, action: &str) -> WeirError {
    match api_code(&err) {
        Some(404) => sentinels.not_found,
        Some(409) => sentinels.exists,
        _ => WeirError::gateway(format!("{action}: {err}")),
    }
}

/// Translate a serving-runtime API failure. Only 404 has a sentinel; the
/// runtime port reports every other failure as a runtime error.
pub(crate) fn runtime_error(err: kube::Error, action: &str) -> WeirError {
    match api_code(&err) {
        Some(404) => WeirError::InferenceServiceNotFound,
        _ => WeirError::runtime(format!("{action}: {err}")),
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("simulated {reason}"),
        reason: reason.to_string(),
        code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_sentinels() {
        assert_eq!(
            gateway_error(api_error(404, "NotFound"), ROUTE, "get route"),
            WeirError::GatewayRouteNotFound
        );
        assert_eq!(
            gateway_error(api_error(409, "AlreadyExists"), SERVICE_BACKEND, "create"),
            WeirError::BackendAlreadyExists
        );
        assert_eq!(
            gateway_error(api_error(404, "NotFound"), ENVOY_BACKEND, "delete"),
            WeirError::EnvoyBackendNotFound
        );
    }

    #[test]
    fn test_other_codes_keep_context() {
        let err = gateway_error(api_error(500, "InternalError"), ROUTE, "update route llm/r");
        match err {
            WeirError::Gateway { message } => {
                assert!(message.starts_with("update route llm/r: "));
                assert!(message.contains("simulated InternalError"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_runtime_error_mapping() {
        assert_eq!(
            runtime_error(api_error(404, "NotFound"), "undeploy"),
            WeirError::InferenceServiceNotFound
        );
        assert!(matches!(
            runtime_error(api_error(403, "Forbidden"), "deploy"),
            WeirError::Runtime { .. }
        ));
    }
}

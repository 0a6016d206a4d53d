//! Domain model: traffic configs, virtual models, registry records, and the
//! gateway-facing value types shared with the adapters.

pub mod gateway;
pub mod serving;
pub mod traffic;
pub mod virtual_model;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use gateway::{
    AiServiceBackend, ApiSchema, BackendEndpoint, BackendRef, EnvoyBackend, GatewayRoute,
    HeaderMutation, HttpHeader, LlmRequestCost, LlmRequestCostKind, RouteStatus, WeightedBackend,
};
pub use serving::{
    InferenceService, InferenceServiceState, ModelVersion, RegisteredModel, ServingEnvironment,
    VersionStatus,
};
pub use traffic::{
    TrafficConfig, TrafficConfigFilter, TrafficStrategy, TrafficVariant, VariantStatus,
};
pub use virtual_model::{VirtualModel, VirtualModelBackend};

/// Lowest and highest legal traffic weight.
pub const MIN_WEIGHT: i32 = 0;
pub const MAX_WEIGHT: i32 = 100;

/// Reject weights outside `[0, 100]`.
pub fn validate_weight(weight: i32) -> crate::Result<()> {
    if (MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        Ok(())
    } else {
        Err(crate::WeirError::InvalidTrafficWeight)
    }
}

/// Status shared by traffic configs, virtual models, and their backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// First eight characters of an id, used to derive gateway route names.
pub(crate) fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_weight_bounds() {
        assert!(validate_weight(0).is_ok());
        assert!(validate_weight(100).is_ok());
        assert_eq!(
            validate_weight(-1).unwrap_err(),
            crate::WeirError::InvalidTrafficWeight
        );
        assert_eq!(
            validate_weight(101).unwrap_err(),
            crate::WeirError::InvalidTrafficWeight
        );
    }

    #[test]
    fn test_record_status_round_trip() {
        assert_eq!("active".parse::<RecordStatus>().unwrap(), RecordStatus::Active);
        assert_eq!(RecordStatus::Inactive.to_string(), "inactive");
        assert!("paused".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_short_id() {
        let id = uuid::Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        assert_eq!(short_id(&id), "0f8fad5b");
    }
}

//! Traffic configs and their weighted variants.
//!
//! A [`TrafficConfig`] owns the traffic split for one inference service.
//! Each [`TrafficVariant`] names a model version, a weight in `[0, 100]`,
//! and the runtime resource serving it. Exactly one variant is called
//! `stable`; the active weights of a config never sum past 100.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gateway::WeightedBackend;
use super::{MAX_WEIGHT, RecordStatus, short_id, validate_weight};
use crate::error::{Result, WeirError};

pub const STABLE_VARIANT: &str = "stable";
pub const CANARY_VARIANT: &str = "canary";
pub const OLD_STABLE_PREFIX: &str = "old-stable-";

/// Bounds applied to the initial canary weight.
pub const CANARY_MIN_WEIGHT: i32 = 10;
pub const CANARY_MAX_WEIGHT: i32 = 50;

/// Clamp a requested initial canary weight into `[10, 50]`.
pub fn clamp_canary_weight(requested: i32) -> i32 {
    requested.clamp(CANARY_MIN_WEIGHT, CANARY_MAX_WEIGHT)
}

/// Check a user-supplied variant name.
///
/// Names end up inside runtime resource names (`<isvc>-<variant>`), so they
/// follow DNS label rules. `stable`, `canary` and the `old-stable-` prefix
/// are reserved for the canary workflow.
pub fn validate_variant_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(WeirError::InvalidVariantName(format!("'{name}' {reason}")));
    if name.is_empty() || name.len() > 63 {
        return invalid("must be 1-63 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("may only contain lowercase letters, digits, and '-'");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return invalid("must start and end with a letter or digit");
    }
    if name == STABLE_VARIANT || name == CANARY_VARIANT {
        return invalid("is reserved");
    }
    if name.starts_with(OLD_STABLE_PREFIX) {
        return invalid("uses the reserved 'old-stable-' prefix");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficStrategy {
    #[default]
    Canary,
    AbTest,
    Shadow,
    BlueGreen,
}

impl TrafficStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canary => "canary",
            Self::AbTest => "ab_test",
            Self::Shadow => "shadow",
            Self::BlueGreen => "blue_green",
        }
    }
}

impl fmt::Display for TrafficStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficStrategy {
    type Err = WeirError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "canary" => Ok(Self::Canary),
            "ab_test" => Ok(Self::AbTest),
            "shadow" => Ok(Self::Shadow),
            "blue_green" => Ok(Self::BlueGreen),
            other => Err(WeirError::InvalidTrafficStrategy(other.to_string())),
        }
    }
}

/// Lifecycle of a variant.
///
/// `Pending -> Active` on the first positive weight, `Active -> Inactive` on
/// rollback, demotion, or a weight of zero set through a plain update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    #[default]
    Pending,
    Active,
    Promoting,
    Draining,
    Inactive,
}

impl VariantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Promoting => "promoting",
            Self::Draining => "draining",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for VariantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "promoting" => Ok(Self::Promoting),
            "draining" => Ok(Self::Draining),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown variant status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficVariant {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub traffic_config_id: Uuid,
    pub variant_name: String,
    pub model_version_id: Uuid,
    pub weight: i32,
    pub runtime_resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_revision: Option<String>,
    pub status: VariantStatus,
    /// Joined from the model version on reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version_name: Option<String>,
}

impl TrafficVariant {
    pub fn new(
        traffic_config_id: Uuid,
        model_version_id: Uuid,
        variant_name: impl Into<String>,
        weight: i32,
    ) -> Result<Self> {
        let variant_name = variant_name.into();
        if variant_name.is_empty() {
            return Err(WeirError::InvalidVariantName("name is required".into()));
        }
        validate_weight(weight)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            traffic_config_id,
            variant_name,
            model_version_id,
            weight,
            runtime_resource_name: String::new(),
            runtime_revision: None,
            status: VariantStatus::Pending,
            model_version_name: None,
        })
    }

    pub fn with_runtime_resource(mut self, name: impl Into<String>) -> Self {
        self.runtime_resource_name = name.into();
        self
    }

    pub fn set_weight(&mut self, weight: i32) -> Result<()> {
        validate_weight(weight)?;
        self.weight = weight;
        self.touch();
        Ok(())
    }

    /// Set the weight and derive the status: positive weights activate,
    /// zero deactivates.
    pub fn apply_weight(&mut self, weight: i32) -> Result<()> {
        self.set_weight(weight)?;
        if weight > 0 {
            self.status = VariantStatus::Active;
        } else {
            self.status = VariantStatus::Inactive;
        }
        Ok(())
    }

    pub fn activate(&mut self) {
        self.status = VariantStatus::Active;
        self.touch();
    }

    /// Inactive variants never carry weight.
    pub fn deactivate(&mut self) {
        self.status = VariantStatus::Inactive;
        self.weight = 0;
        self.touch();
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.variant_name = name.into();
        self.touch();
    }

    pub fn is_active(&self) -> bool {
        self.status == VariantStatus::Active
    }

    pub fn is_stable(&self) -> bool {
        self.variant_name == STABLE_VARIANT
    }

    /// Active with positive weight, i.e. present in the gateway route.
    pub fn is_routed(&self) -> bool {
        self.is_active() && self.weight > 0
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub project_id: Uuid,
    pub inference_service_id: Uuid,
    pub strategy: TrafficStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_route_name: Option<String>,
    pub status: RecordStatus,
    #[serde(default)]
    pub variants: Vec<TrafficVariant>,
    /// Joined from the inference service on reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_service_name: Option<String>,
}

impl TrafficConfig {
    pub fn new(project_id: Uuid, inference_service_id: Uuid, strategy: TrafficStrategy) -> Result<Self> {
        if project_id.is_nil() {
            return Err(WeirError::MissingProjectId);
        }
        if inference_service_id.is_nil() {
            return Err(WeirError::InvalidInferenceServiceId);
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            project_id,
            inference_service_id,
            strategy,
            gateway_route_name: None,
            status: RecordStatus::Active,
            variants: Vec::new(),
            inference_service_name: None,
        })
    }

    pub fn variant(&self, name: &str) -> Option<&TrafficVariant> {
        self.variants.iter().find(|v| v.variant_name == name)
    }

    pub fn variant_mut(&mut self, name: &str) -> Option<&mut TrafficVariant> {
        self.variants.iter_mut().find(|v| v.variant_name == name)
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variant(name).is_some()
    }

    pub fn stable(&self) -> Option<&TrafficVariant> {
        self.variant(STABLE_VARIANT)
    }

    pub fn has_active_canary(&self) -> bool {
        self.variant(CANARY_VARIANT).is_some_and(TrafficVariant::is_active)
    }

    /// Sum of the weights of active variants.
    pub fn total_weight(&self) -> i32 {
        self.variants
            .iter()
            .filter(|v| v.is_active())
            .map(|v| v.weight)
            .sum()
    }

    /// Active weight carried by variants other than the named ones.
    pub fn weight_excluding(&self, names: &[&str]) -> i32 {
        self.variants
            .iter()
            .filter(|v| v.is_active() && !names.contains(&v.variant_name.as_str()))
            .map(|v| v.weight)
            .sum()
    }

    pub fn validate_weights(&self) -> Result<()> {
        if self.total_weight() > MAX_WEIGHT {
            Err(WeirError::WeightSumExceeds100)
        } else {
            Ok(())
        }
    }

    /// Backends the gateway route should carry: active variants with a
    /// positive weight, tagged by variant name.
    pub fn weighted_backends(&self) -> Vec<WeightedBackend> {
        self.variants
            .iter()
            .filter(|v| v.is_routed())
            .map(|v| WeightedBackend::variant(&v.runtime_resource_name, v.weight, &v.variant_name))
            .collect()
    }

    pub fn default_route_name(&self) -> String {
        format!("traffic-{}", short_id(&self.id))
    }

    /// Name for the demoted stable variant. A same-second collision gets a
    /// numeric suffix.
    pub fn next_old_stable_name(&self, epoch_secs: i64) -> String {
        let base = format!("{OLD_STABLE_PREFIX}{epoch_secs}");
        if !self.has_variant(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !self.has_variant(candidate))
            .unwrap_or(base)
    }

    /// First of `base`, `base-2`, `base-3`, ... not served to a variant
    /// other than `owner`. Promotion hands a variant's resource over to
    /// `stable`, so the plain name can already be taken.
    pub fn free_resource_name(&self, base: &str, owner: Option<Uuid>) -> String {
        let taken = |candidate: &str| {
            self.variants
                .iter()
                .any(|v| Some(v.id) != owner && v.runtime_resource_name == candidate)
        };
        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Whether `variant`'s runtime resource may be torn down. The inference
    /// service's own deployment and resources still serving another
    /// variant are never released.
    pub fn can_release_resource(&self, variant: &TrafficVariant, isvc_name: &str) -> bool {
        let resource = variant.runtime_resource_name.as_str();
        !resource.is_empty()
            && resource != isvc_name
            && !self
                .variants
                .iter()
                .any(|v| v.id != variant.id && v.runtime_resource_name == resource)
    }
}

/// Listing filter for traffic configs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficConfigFilter {
    #[serde(default)]
    pub inference_service_id: Option<Uuid>,
    #[serde(default)]
    pub strategy: Option<TrafficStrategy>,
    #[serde(default)]
    pub status: Option<RecordStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl TrafficConfigFilter {
    pub fn matches(&self, config: &TrafficConfig) -> bool {
        self.inference_service_id
            .is_none_or(|id| config.inference_service_id == id)
            && self.strategy.is_none_or(|s| config.strategy == s)
            && self.status.is_none_or(|s| config.status == s)
    }
}

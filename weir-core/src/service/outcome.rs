//! Two-phase results: the persisted value plus what happened to the
//! external systems that mirror it.
//!
//! Persistence failures abort an operation and surface as errors. Once the
//! database has committed, runtime and gateway side effects are reported
//! here instead, so callers can tell "saved and routed" apart from "saved,
//! gateway sync failed".

use serde::{Deserialize, Serialize};

use crate::error::WeirError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ExternalEffect {
    Applied,
    /// Not attempted: the adapter is unavailable or nothing needed doing.
    #[default]
    Skipped,
    Failed(String),
}

impl ExternalEffect {
    pub fn failed(err: &WeirError) -> Self {
        Self::Failed(err.to_string())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Short form used in response headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
        }
    }

    /// Combine two effects of the same kind: a failure wins, then an
    /// applied change.
    pub fn and(self, other: ExternalEffect) -> ExternalEffect {
        match (self, other) {
            (f @ Self::Failed(_), _) | (_, f @ Self::Failed(_)) => f,
            (Self::Applied, _) | (_, Self::Applied) => Self::Applied,
            _ => Self::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub runtime: ExternalEffect,
    pub gateway: ExternalEffect,
}

impl SyncReport {
    pub fn gateway(gateway: ExternalEffect) -> Self {
        Self {
            runtime: ExternalEffect::Skipped,
            gateway,
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.runtime.is_failed() && !self.gateway.is_failed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub sync: SyncReport,
}

impl<T> Outcome<T> {
    pub fn new(value: T, sync: SyncReport) -> Self {
        Self { value, sync }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            sync: self.sync,
        }
    }
}

//! # weir core
//!
//! Traffic and virtual-model control plane for model serving.
//!
//! - [`service::TrafficService`] runs canary rollouts, A/B variants,
//!   promotion, and rollback for one inference service at a time.
//! - [`service::VirtualModelService`] maps a public model name onto
//!   weighted, prioritised upstream backends.
//! - [`service::UpstreamService`] manages the gateway's upstream backends.
//!
//! The database is the source of truth. The serving runtime and the AI
//! gateway are mirrors reached through [`ports`], and each mutation reports
//! how those mirrors were updated in a [`service::SyncReport`].

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod factory;
pub mod ports;
pub mod service;
pub mod store;

pub use config::{WeirConfig, load_config};
pub use context::RequestContext;
pub use error::{ErrorKind, Result, WeirError};
pub use factory::{Repositories, Services};
pub use service::{ExternalEffect, Outcome, SyncReport};

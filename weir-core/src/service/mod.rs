//! Application services. Each owns the ports it needs and a keyed lock
//! serialising mutations per aggregate.

pub mod lock;
pub mod outcome;
pub mod traffic;
pub mod upstream;
pub mod virtual_model;

pub use lock::KeyedLock;
pub use outcome::{ExternalEffect, Outcome, SyncReport};
pub use traffic::{AddVariant, CreateTrafficConfig, StartCanary, TrafficService};
pub use upstream::UpstreamService;
pub use virtual_model::{AddBackend, CreateVirtualModel, UpdateBackend, VirtualModelService};

//! Service registry core
//!
//! This library provides:
//! - Instance records with lease-based liveness
//! - A monotonic lease clock
//! - A sharded instance store with per-key locking
//! - The service registry (register, heartbeat, status, deregister, queries)
//! - A background eviction sweeper for expired leases

pub mod clock;
pub mod error;
pub mod instance;
pub mod registry;
pub mod store;
pub mod sweeper;

pub use clock::LeaseClock;
pub use error::{RegistryError, Result};
pub use instance::{InstanceAddress, InstanceKey, InstanceRecord, InstanceStatus};
pub use registry::{RegistrySettings, ServiceRegistry, ServiceSummary};
pub use store::InstanceStore;
pub use sweeper::{EvictionSweeper, SweepReport};

//! Versioned configuration distribution
//!
//! This library provides:
//! - Immutable, versioned configuration snapshots per (application, profile)
//! - In-memory and file-backed snapshot stores
//! - The distributor that serializes publishes per key and serves reads
//! - Seeding from a directory of YAML property files

pub mod distributor;
pub mod error;
pub mod file_store;
pub mod repository;
pub mod snapshot;
pub mod store;

pub use distributor::{ConfigDistributor, HealthStatus, KeySummary};
pub use error::{ConfigError, Result, StoreError, StoreResult};
pub use file_store::FileSnapshotStore;
pub use repository::{ConfigRepository, SeedReport};
pub use snapshot::{properties_digest, ConfigKey, ConfigSnapshot, Properties};
pub use store::{MemorySnapshotStore, SnapshotStore};

//! Config server: versioned configuration over HTTP

pub mod api;
pub mod settings;

pub use settings::ConfigServerSettings;

use anyhow::Result;
use config_core::{ConfigDistributor, FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
use platform_http::{HttpServer, MetricsCollector};
use std::sync::Arc;
use tracing::info;

pub const SERVER_NAME: &str = "config-server";

pub fn build_server(distributor: Arc<ConfigDistributor>) -> Result<HttpServer<ConfigDistributor>> {
    let metrics = MetricsCollector::new()?;
    Ok(HttpServer::new(SERVER_NAME, distributor, api::routes(), metrics))
}

/// File-backed store when `data_dir` is set, in-memory otherwise
pub fn open_store(settings: &ConfigServerSettings) -> Result<Arc<dyn SnapshotStore>> {
    match &settings.data_dir {
        Some(dir) => {
            let store = FileSnapshotStore::open(dir.clone(), settings.max_versions)?;
            info!("Using file snapshot store at {}", store.root().display());
            Ok(Arc::new(store))
        }
        None => {
            info!("Using in-memory snapshot store");
            Ok(Arc::new(MemorySnapshotStore::with_retention(settings.max_versions)))
        }
    }
}

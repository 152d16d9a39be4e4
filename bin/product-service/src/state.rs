//! Shared handler state: the catalog plus the distributed configuration

use crate::catalog::Catalog;
use config_core::Properties;
use platform_client::{ConfigClient, Result as ClientResult};
use std::collections::BTreeSet;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const MAX_STOCK_PROPERTY: &str = "inventory.max-stock";

/// Where the service pulls its (application, profile) document from
#[derive(Clone, Debug)]
pub struct ConfigSource {
    pub client: ConfigClient,
    pub application: String,
    pub profile: String,
}

#[derive(Debug, Default)]
struct LoadedConfig {
    version: Option<u64>,
    properties: Properties,
}

pub struct AppState {
    pub catalog: Catalog,
    source: Option<ConfigSource>,
    config: RwLock<LoadedConfig>,
}

impl AppState {
    pub fn new(catalog: Catalog, source: Option<ConfigSource>) -> Self {
        Self {
            catalog,
            source,
            config: RwLock::new(LoadedConfig::default()),
        }
    }

    pub fn with_properties(catalog: Catalog, properties: Properties) -> Self {
        Self {
            catalog,
            source: None,
            config: RwLock::new(LoadedConfig {
                version: None,
                properties,
            }),
        }
    }

    pub async fn config_version(&self) -> Option<u64> {
        self.config.read().await.version
    }

    pub async fn property(&self, name: &str) -> Option<serde_json::Value> {
        self.config.read().await.properties.get(name).cloned()
    }

    /// `inventory.max-stock` as an integer; numeric strings are accepted
    pub async fn max_stock(&self) -> Option<i64> {
        match self.property(MAX_STOCK_PROPERTY).await? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Fetch the latest snapshot and swap it in; returns the keys that changed
    pub async fn refresh(&self) -> ClientResult<Vec<String>> {
        let Some(source) = &self.source else {
            debug!("No config source configured, nothing to refresh");
            return Ok(Vec::new());
        };

        let snapshot = source
            .client
            .get_latest(&source.application, &source.profile)
            .await?;

        let mut config = self.config.write().await;
        let changed = changed_keys(&config.properties, &snapshot.properties);
        if config.version != Some(snapshot.version) {
            info!(
                "Loaded {}/{} version {} ({} keys changed)",
                source.application,
                source.profile,
                snapshot.version,
                changed.len()
            );
        }
        config.version = Some(snapshot.version);
        config.properties = snapshot.properties;
        Ok(changed)
    }
}

fn changed_keys(old: &Properties, new: &Properties) -> Vec<String> {
    let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    names
        .into_iter()
        .filter(|name| old.get(*name) != new.get(*name))
        .cloned()
        .collect()
}

//! Client for the config server HTTP API

use crate::error::check;
use crate::{http_client, trim_base_url, Result};
use config_core::{ConfigSnapshot, Properties};
use serde::Deserialize;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct ConfigClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PublishResponse {
    version: u64,
}

impl ConfigClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: trim_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_latest(&self, application: &str, profile: &str) -> Result<ConfigSnapshot> {
        let url = format!("{}/config/{}/{}", self.base_url, application, profile);
        let response = self.client.get(&url).send().await?;
        let snapshot: ConfigSnapshot = check(response).await?.json().await?;
        debug!("Fetched {}/{} version {}", application, profile, snapshot.version);
        Ok(snapshot)
    }

    pub async fn get_version(
        &self,
        application: &str,
        profile: &str,
        version: u64,
    ) -> Result<ConfigSnapshot> {
        let url = format!(
            "{}/config/{}/{}/{}",
            self.base_url, application, profile, version
        );
        let response = self.client.get(&url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Publish `properties` as a new version, returning the version number
    pub async fn publish(
        &self,
        application: &str,
        profile: &str,
        properties: &Properties,
    ) -> Result<u64> {
        let url = format!("{}/config/{}/{}", self.base_url, application, profile);
        let response = self.client.post(&url).json(properties).send().await?;
        let published: PublishResponse = check(response).await?.json().await?;
        Ok(published.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use config_core::{ConfigDistributor, MemorySnapshotStore};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    async fn start_config_server() -> (String, oneshot::Sender<()>) {
        let distributor = Arc::new(ConfigDistributor::new(Arc::new(MemorySnapshotStore::new())));
        let server = Arc::new(config_server::build_server(distributor).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve(listener, async {
            let _ = rx.await;
        }));
        (format!("http://{}", addr), tx)
    }

    fn props(value: i64) -> Properties {
        let mut properties = Properties::new();
        properties.insert("a".to_string(), json!(value));
        properties
    }

    #[tokio::test]
    async fn test_publish_then_fetch_latest_and_pinned() {
        let (base_url, _shutdown) = start_config_server().await;
        let client = ConfigClient::new(&base_url).unwrap();

        assert_eq!(client.publish("product-service", "dev", &props(1)).await.unwrap(), 1);
        assert_eq!(client.publish("product-service", "dev", &props(2)).await.unwrap(), 2);

        let latest = client.get_latest("product-service", "dev").await.unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.properties["a"], 2);

        let pinned = client.get_version("product-service", "dev", 1).await.unwrap();
        assert_eq!(pinned.properties, props(1));
    }

    #[tokio::test]
    async fn test_missing_key_and_version() {
        let (base_url, _shutdown) = start_config_server().await;
        let client = ConfigClient::new(&base_url).unwrap();

        assert!(client.get_latest("nope", "default").await.unwrap_err().is_not_found());

        client.publish("svc", "default", &props(1)).await.unwrap();
        assert!(client.get_version("svc", "default", 7).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_unexpected_status() {
        let (base_url, _shutdown) = start_config_server().await;
        let client = ConfigClient::new(&base_url).unwrap();

        match client.publish("bad$name", "default", &props(1)).await {
            Err(ClientError::UnexpectedStatus { status, .. }) => assert_eq!(status, 400),
            other => panic!("expected 400, got {:?}", other),
        }
    }
}

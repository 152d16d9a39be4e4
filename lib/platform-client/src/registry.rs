//! Client for the service registry HTTP API

use crate::error::check;
use crate::{http_client, trim_base_url, Result};
use rand::seq::SliceRandom;
use registry_core::{InstanceAddress, InstanceRecord, InstanceStatus};
use serde_json::json;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: trim_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn instance_url(&self, service: &str, instance_id: &str) -> String {
        format!("{}/registry/{}/{}", self.base_url, service, instance_id)
    }

    pub async fn register(
        &self,
        service: &str,
        instance_id: &str,
        address: &InstanceAddress,
    ) -> Result<InstanceRecord> {
        let url = self.instance_url(service, instance_id);
        let response = self.client.post(&url).json(address).send().await?;
        let record = check(response).await?.json().await?;
        debug!("Registered {}/{} at {}", service, instance_id, address);
        Ok(record)
    }

    pub async fn heartbeat(&self, service: &str, instance_id: &str) -> Result<InstanceRecord> {
        let url = format!("{}/heartbeat", self.instance_url(service, instance_id));
        let response = self.client.put(&url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn set_status(
        &self,
        service: &str,
        instance_id: &str,
        status: InstanceStatus,
    ) -> Result<InstanceRecord> {
        let url = format!("{}/status", self.instance_url(service, instance_id));
        let response = self
            .client
            .put(&url)
            .json(&json!({ "status": status }))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn deregister(&self, service: &str, instance_id: &str) -> Result<()> {
        let url = self.instance_url(service, instance_id);
        let response = self.client.delete(&url).send().await?;
        check(response).await?;
        debug!("Deregistered {}/{}", service, instance_id);
        Ok(())
    }

    /// Live instances of `service`
    pub async fn list_instances(&self, service: &str) -> Result<Vec<InstanceRecord>> {
        let url = format!("{}/registry/{}", self.base_url, service);
        let response = self.client.get(&url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Pick a random live instance of `service` whose status is UP
    pub async fn resolve(&self, service: &str) -> Result<Option<InstanceRecord>> {
        let up: Vec<InstanceRecord> = self
            .list_instances(service)
            .await?
            .into_iter()
            .filter(|record| record.status == InstanceStatus::Up)
            .collect();
        Ok(up.choose(&mut rand::thread_rng()).cloned())
    }
}

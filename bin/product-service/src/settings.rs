use crate::catalog::{sample_products, ProductDto};
use anyhow::{bail, Result};
use platform_http::settings::{env_override, env_value, load_yaml};
use platform_http::ServerSettings;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8081;
const SETTINGS_FILE_ENV: &str = "PRODUCT_SERVICE_CONFIG";
const ENV_PREFIX: &str = "PRODUCT_SERVICE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductServiceSettings {
    pub server: ServerSettings,
    /// Name registered with the registry and the config application name
    pub service_name: String,
    /// Generated at startup when unset
    pub instance_id: Option<String>,
    /// Host other services should use to reach this instance
    pub advertise_host: String,
    pub registry_url: Option<String>,
    pub config_url: Option<String>,
    pub profile: String,
    /// Refuse to start when the config server cannot be reached
    pub fail_fast: bool,
    pub heartbeat_secs: u64,
    pub products: Vec<ProductDto>,
}

impl Default for ProductServiceSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            service_name: "product-service".to_string(),
            instance_id: None,
            advertise_host: "localhost".to_string(),
            registry_url: None,
            config_url: None,
            profile: "default".to_string(),
            fail_fast: false,
            heartbeat_secs: 30,
            products: sample_products(),
        }
    }
}

impl ProductServiceSettings {
    pub fn load() -> Result<Self> {
        let mut settings: Self = load_yaml(SETTINGS_FILE_ENV)?;
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        self.server.apply_env(ENV_PREFIX)?;
        env_override("PRODUCT_SERVICE_NAME", &mut self.service_name)?;
        if let Some(id) = env_value("PRODUCT_SERVICE_INSTANCE_ID")? {
            self.instance_id = Some(id);
        }
        env_override("PRODUCT_SERVICE_ADVERTISE_HOST", &mut self.advertise_host)?;
        if let Some(url) = env_value("PRODUCT_SERVICE_REGISTRY_URL")? {
            self.registry_url = Some(url);
        }
        if let Some(url) = env_value("PRODUCT_SERVICE_CONFIG_URL")? {
            self.config_url = Some(url);
        }
        env_override("PRODUCT_SERVICE_PROFILE", &mut self.profile)?;
        env_override("PRODUCT_SERVICE_FAIL_FAST", &mut self.fail_fast)?;
        env_override("PRODUCT_SERVICE_HEARTBEAT_SECS", &mut self.heartbeat_secs)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            bail!("service_name must not be empty");
        }
        if self.heartbeat_secs == 0 {
            bail!("heartbeat_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn instance_id(&self) -> String {
        self.instance_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.service_name, uuid::Uuid::new_v4()))
    }
}

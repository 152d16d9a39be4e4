use anyhow::{bail, Result};
use platform_http::settings::{env_value, load_yaml};
use platform_http::ServerSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8888;
const SETTINGS_FILE_ENV: &str = "CONFIG_SERVER_CONFIG";
const ENV_PREFIX: &str = "CONFIG_SERVER";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigServerSettings {
    pub server: ServerSettings,
    /// Snapshot directory; in-memory when unset
    pub data_dir: Option<PathBuf>,
    /// Versions kept per key; unlimited when unset
    pub max_versions: Option<usize>,
    /// Directory of YAML files published at startup
    pub config_repo: Option<PathBuf>,
}

impl ConfigServerSettings {
    /// Settings file named by `CONFIG_SERVER_CONFIG`, then `CONFIG_SERVER_*` overrides
    pub fn load() -> Result<Self> {
        let mut settings: Self = load_yaml(SETTINGS_FILE_ENV)?;
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        self.server.apply_env(ENV_PREFIX)?;
        if let Some(dir) = env_value("CONFIG_SERVER_DATA_DIR")? {
            self.data_dir = Some(dir);
        }
        if let Some(max) = env_value("CONFIG_SERVER_MAX_VERSIONS")? {
            self.max_versions = Some(max);
        }
        if let Some(dir) = env_value("CONFIG_SERVER_REPO")? {
            self.config_repo = Some(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_versions == Some(0) {
            bail!("max_versions must be at least 1");
        }
        Ok(())
    }
}

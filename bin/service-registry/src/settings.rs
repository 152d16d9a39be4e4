use anyhow::{bail, Result};
use platform_http::settings::{env_override, env_value, load_yaml};
use platform_http::ServerSettings;
use registry_core::RegistrySettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8761;
const SETTINGS_FILE_ENV: &str = "REGISTRY_CONFIG";
const ENV_PREFIX: &str = "REGISTRY";

/// Settings file for the registry server, e.g.
///
/// ```yaml
/// server:
///   listen_addr: 0.0.0.0:8761
///   log_format: json
/// lease_secs: 90
/// sweep_interval_ms: 30000
/// sweep_concurrency: 4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryServiceSettings {
    pub server: ServerSettings,
    pub lease_secs: u64,
    /// Unset means a third of the lease
    pub sweep_interval_ms: Option<u64>,
    pub sweep_concurrency: usize,
}

impl Default for RegistryServiceSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            lease_secs: 90,
            sweep_interval_ms: None,
            sweep_concurrency: 4,
        }
    }
}

impl RegistryServiceSettings {
    /// Settings file named by `REGISTRY_CONFIG`, then `REGISTRY_*` overrides
    pub fn load() -> Result<Self> {
        let mut settings: Self = load_yaml(SETTINGS_FILE_ENV)?;
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        self.server.apply_env(ENV_PREFIX)?;
        env_override("REGISTRY_LEASE_SECS", &mut self.lease_secs)?;
        if let Some(ms) = env_value("REGISTRY_SWEEP_INTERVAL_MS")? {
            self.sweep_interval_ms = Some(ms);
        }
        env_override("REGISTRY_SWEEP_CONCURRENCY", &mut self.sweep_concurrency)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.lease_secs == 0 {
            bail!("lease_secs must be greater than zero");
        }
        if self.sweep_interval_ms == Some(0) {
            bail!("sweep_interval_ms must be greater than zero");
        }
        if self.sweep_concurrency == 0 {
            bail!("sweep_concurrency must be at least 1");
        }
        Ok(())
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            lease_duration: Duration::from_secs(self.lease_secs),
            sweep_interval: self.sweep_interval_ms.map(Duration::from_millis),
            sweep_concurrency: self.sweep_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RegistryServiceSettings::default();
        assert_eq!(settings.server.listen_addr(DEFAULT_PORT).port(), 8761);
        let registry = settings.registry_settings();
        assert_eq!(registry, RegistrySettings::default());
        assert_eq!(registry.effective_sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_yaml() {
        let settings: RegistryServiceSettings =
            serde_yaml::from_str("lease_secs: 10\nsweep_interval_ms: 500\n").unwrap();
        assert_eq!(settings.sweep_concurrency, 4);
        let registry = settings.registry_settings();
        assert_eq!(registry.lease_duration, Duration::from_secs(10));
        assert_eq!(registry.effective_sweep_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let settings = RegistryServiceSettings {
            lease_secs: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = RegistryServiceSettings {
            sweep_concurrency: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}

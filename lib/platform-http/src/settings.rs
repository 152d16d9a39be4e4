//! YAML settings files with environment overrides

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::server::DEFAULT_MAX_BODY_BYTES;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format '{}'", other)),
        }
    }
}

/// The `server` section shared by every binary's settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Unset means `0.0.0.0` on the binary's default port
    pub listen_addr: Option<SocketAddr>,
    pub log_format: LogFormat,
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: None,
            log_format: LogFormat::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerSettings {
    pub fn listen_addr(&self, default_port: u16) -> SocketAddr {
        self.listen_addr
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, default_port)))
    }

    /// Apply `{prefix}_LISTEN_ADDR` and `{prefix}_LOG_FORMAT`
    pub fn apply_env(&mut self, prefix: &str) -> Result<()> {
        if let Some(addr) = env_value(&format!("{}_LISTEN_ADDR", prefix))? {
            self.listen_addr = Some(addr);
        }
        env_override(&format!("{}_LOG_FORMAT", prefix), &mut self.log_format)?;
        Ok(())
    }
}

/// Parse `name` when it is set to a non-empty value
pub fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse()
                .map_err(|e| anyhow!("invalid value for {}: {}", name, e))?;
            debug!("Applied override from {}", name);
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}

/// Replace `target` with the parsed value of `name` when it is set.
///
/// Returns whether an override was applied.
pub fn env_override<T>(name: &str, target: &mut T) -> Result<bool>
where
    T: FromStr,
    T::Err: Display,
{
    match env_value(name)? {
        Some(value) => {
            *target = value;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Load settings from the YAML file named by `env_var`, or defaults when it is unset
pub fn load_yaml<T: DeserializeOwned + Default>(env_var: &str) -> Result<T> {
    match std::env::var(env_var) {
        Ok(path) if !path.trim().is_empty() => load_yaml_file(path.trim()),
        _ => {
            info!("{} not set, using default settings", env_var);
            Ok(T::default())
        }
    }
}

pub fn load_yaml_file<T: DeserializeOwned + Default>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    let settings = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    info!("Loaded settings from {}", path.display());
    Ok(settings)
}

//! Instance records and their identity
use crate::{RegistryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lifecycle status reported by (or assigned to) an instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Starting,
    Up,
    Down,
    OutOfService,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
            InstanceStatus::OutOfService => "OUT_OF_SERVICE",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network address an instance can be reached at
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceAddress {
    pub host: String,
    pub port: u16,
}

impl InstanceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(RegistryError::InvalidAddress("host must not be empty".to_string()));
        }
        Ok(Self { host, port })
    }

    /// Base URL for plain HTTP calls to this instance
    pub fn http_url(&self) -> String {
        format!("http://{}", self)
    }
}

impl fmt::Display for InstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for InstanceAddress {
    type Err = RegistryError;

    /// Parses "host:port" or "[v6-host]:port"
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| RegistryError::InvalidAddress(format!("missing port in '{}'", s)))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| RegistryError::InvalidAddress(format!("bad port in '{}'", s)))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        InstanceAddress::new(host, port)
    }
}

/// Store key: normalized service name plus instance id
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub service: String,
    pub instance_id: String,
}

impl InstanceKey {
    pub fn new(service: &str, instance_id: &str) -> Result<Self> {
        let service = normalize_service_name(service)?;
        let instance_id = instance_id.trim();
        if instance_id.is_empty() {
            return Err(RegistryError::InvalidRequest(
                "instance id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            service,
            instance_id: instance_id.to_string(),
        })
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.instance_id)
    }
}

/// Service names compare case-insensitively
pub fn normalize_service_name(service: &str) -> Result<String> {
    let service = service.trim();
    if service.is_empty() {
        return Err(RegistryError::InvalidRequest(
            "service name must not be empty".to_string(),
        ));
    }
    Ok(service.to_lowercase())
}

/// A registered service instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub service_name: String,
    pub instance_id: String,
    pub address: InstanceAddress,
    pub status: InstanceStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            service: self.service_name.clone(),
            instance_id: self.instance_id.clone(),
        }
    }

    /// True once more than `lease` has passed since the last heartbeat
    pub fn is_expired_at(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        match now.signed_duration_since(self.last_heartbeat_at).to_std() {
            Ok(elapsed) => elapsed > lease,
            // Heartbeat stamped after `now`
            Err(_) => false,
        }
    }

    /// Status as seen by readers: an expired lease reads as DOWN
    pub fn effective_status_at(&self, now: DateTime<Utc>, lease: Duration) -> InstanceStatus {
        if self.is_expired_at(now, lease) {
            InstanceStatus::Down
        } else {
            self.status
        }
    }
}

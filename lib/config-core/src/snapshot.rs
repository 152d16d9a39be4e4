//! Configuration snapshots

use crate::{ConfigError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Property map of a snapshot
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Identifies a configuration document: application name plus profile
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigKey {
    pub application: String,
    pub profile: String,
}

impl ConfigKey {
    pub fn new(application: &str, profile: &str) -> Result<Self> {
        Ok(Self {
            application: validate_identifier("application", application)?,
            profile: validate_identifier("profile", profile)?,
        })
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application, self.profile)
    }
}

/// Identifiers double as directory names in the file store
fn validate_identifier(kind: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidRequest(format!("{} must not be empty", kind)));
    }
    if value == "." || value == ".." {
        return Err(ConfigError::InvalidRequest(format!("{} '{}' is reserved", kind, value)));
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(ConfigError::InvalidRequest(format!(
            "{} '{}' may only contain ASCII letters, digits, '-', '_' and '.'",
            kind, value
        )));
    }
    Ok(value.to_string())
}

/// One immutable version of a configuration document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub application: String,
    pub profile: String,
    pub version: u64,
    pub properties: Properties,
    pub digest: String,
    pub published_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    pub fn new(key: &ConfigKey, version: u64, properties: Properties, published_at: DateTime<Utc>) -> Self {
        let digest = properties_digest(&properties);
        Self {
            application: key.application.clone(),
            profile: key.profile.clone(),
            version,
            properties,
            digest,
            published_at,
        }
    }

    pub fn key(&self) -> ConfigKey {
        ConfigKey {
            application: self.application.clone(),
            profile: self.profile.clone(),
        }
    }
}

/// Hex SHA-256 over the canonical JSON encoding of `properties`
pub fn properties_digest(properties: &Properties) -> String {
    let encoded = serde_json::to_vec(properties).unwrap_or_default();
    hex::encode(Sha256::digest(&encoded))
}

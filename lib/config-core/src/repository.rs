//! Seeding from a directory of YAML property files
//!
//! File naming:
//! - `application.yml` holds defaults shared by every application
//! - `application-{profile}.yml` holds shared defaults for one profile
//! - `{app}.yml` is the `default` profile of `{app}`
//! - `{app}-{profile}.yml` overrides `{app}.yml` for `{profile}`, including
//!   `{app}-default.yml`
//!
//! Later layers win: shared, app, shared profile, app profile. Nested
//! mappings flatten to dotted keys and sequences to `key[i]`.

use crate::{ConfigDistributor, ConfigError, ConfigKey, Properties, Result};
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const SHARED_APPLICATION: &str = "application";
const DEFAULT_PROFILE: &str = "default";

/// Outcome of seeding a distributor from a repository
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Keys that received a new version
    pub published: Vec<ConfigKey>,
    /// Keys whose latest version already matched the files
    pub unchanged: Vec<ConfigKey>,
}

/// Parsed contents of a config repository directory
#[derive(Debug, Default)]
pub struct ConfigRepository {
    /// File stem -> flattened properties
    files: BTreeMap<String, Properties>,
}

impl ConfigRepository {
    /// Read every `.yml`/`.yaml` file directly inside `dir`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| {
            ConfigError::InvalidRepository(format!("{}: {}", dir.display(), e))
        })?;

        let mut files = BTreeMap::new();
        for entry in entries {
            let path = entry
                .map_err(|e| ConfigError::InvalidRepository(e.to_string()))?
                .path();
            let Some(stem) = yaml_stem(&path) else {
                continue;
            };
            let contents = fs::read_to_string(&path).map_err(|e| {
                ConfigError::InvalidRepository(format!("{}: {}", path.display(), e))
            })?;
            let properties = parse_yaml(&contents).map_err(|e| {
                ConfigError::InvalidRepository(format!("{}: {}", path.display(), e))
            })?;
            debug!("Loaded {} properties from {}", properties.len(), path.display());
            files.insert(stem, properties);
        }
        Ok(Self { files })
    }

    /// Build a repository from already-parsed files, keyed by file stem
    pub fn from_files(files: BTreeMap<String, Properties>) -> Self {
        Self { files }
    }

    /// Resolve every (application, profile) document the files describe.
    ///
    /// Every application gets its `default` profile, each profile it has a
    /// file for, and each profile with a shared `application-{profile}` file.
    pub fn documents(&self) -> Result<BTreeMap<ConfigKey, Properties>> {
        let stems: BTreeSet<&str> = self.files.keys().map(String::as_str).collect();
        let shared_prefix = format!("{}-", SHARED_APPLICATION);

        let shared_profiles: BTreeSet<&str> = stems
            .iter()
            .filter_map(|stem| stem.strip_prefix(shared_prefix.as_str()))
            .filter(|profile| !profile.is_empty())
            .collect();

        let mut profiles: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for stem in stems.iter().copied() {
            if stem == SHARED_APPLICATION || stem.starts_with(&shared_prefix) {
                continue;
            }
            match split_profile(stem, &stems) {
                Some((app, profile)) => {
                    profiles.entry(app).or_default().insert(profile);
                }
                None => {
                    let app_profiles = profiles.entry(stem).or_default();
                    app_profiles.insert(DEFAULT_PROFILE);
                    app_profiles.extend(shared_profiles.iter().copied());
                }
            }
        }

        let mut documents = BTreeMap::new();
        for (app, app_profiles) in profiles {
            for profile in app_profiles {
                let key = ConfigKey::new(app, profile)?;
                documents.insert(key, self.merge(app, profile));
            }
        }
        Ok(documents)
    }

    fn merge(&self, app: &str, profile: &str) -> Properties {
        let layers = [
            SHARED_APPLICATION.to_string(),
            app.to_string(),
            format!("{}-{}", SHARED_APPLICATION, profile),
            format!("{}-{}", app, profile),
        ];

        let mut merged = Properties::new();
        for layer in &layers {
            if let Some(properties) = self.files.get(layer) {
                merged.extend(properties.clone());
            }
        }
        merged
    }

    /// Publish every document whose content differs from the latest version
    pub async fn seed(&self, distributor: &ConfigDistributor) -> Result<SeedReport> {
        let mut report = SeedReport::default();
        for (key, properties) in self.documents()? {
            match distributor
                .publish_if_changed(&key.application, &key.profile, properties)
                .await?
            {
                Some(snapshot) => {
                    info!("Seeded {} at version {}", key, snapshot.version);
                    report.published.push(key);
                }
                None => report.unchanged.push(key),
            }
        }
        Ok(report)
    }
}

fn yaml_stem(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml") | Some("yaml") => path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string),
        _ => None,
    }
}

/// `{app}-{profile}` where `{app}` is itself a file stem; the longest app wins
fn split_profile<'a>(stem: &'a str, stems: &BTreeSet<&str>) -> Option<(&'a str, &'a str)> {
    stem.match_indices('-')
        .map(|(i, _)| (&stem[..i], &stem[i + 1..]))
        .filter(|(app, profile)| !profile.is_empty() && stems.contains(app))
        .last()
}

/// Parse a YAML document into flattened properties
pub fn parse_yaml(contents: &str) -> std::result::Result<Properties, serde_yaml::Error> {
    let value: YamlValue = serde_yaml::from_str(contents)?;
    let mut properties = Properties::new();
    flatten(None, &value, &mut properties);
    Ok(properties)
}

fn flatten(prefix: Option<&str>, value: &YamlValue, out: &mut Properties) {
    match value {
        YamlValue::Mapping(mapping) => {
            for (k, v) in mapping {
                let Some(k) = scalar_key(k) else {
                    continue;
                };
                let key = match prefix {
                    Some(p) => format!("{}.{}", p, k),
                    None => k,
                };
                flatten(Some(&key), v, out);
            }
        }
        YamlValue::Sequence(items) => {
            let prefix = prefix.unwrap_or_default();
            for (i, item) in items.iter().enumerate() {
                flatten(Some(&format!("{}[{}]", prefix, i)), item, out);
            }
        }
        YamlValue::Tagged(tagged) => flatten(prefix, &tagged.value, out),
        leaf => {
            // An empty document yields no properties
            if let Some(key) = prefix {
                out.insert(key.to_string(), yaml_leaf(leaf));
            }
        }
    }
}

fn scalar_key(key: &YamlValue) -> Option<String> {
    match key {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn yaml_leaf(value: &YamlValue) -> serde_json::Value {
    match value {
        YamlValue::Null => serde_json::Value::Null,
        YamlValue::Bool(b) => serde_json::Value::Bool(*b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        YamlValue::String(s) => serde_json::Value::String(s.clone()),
        // Collections are flattened before reaching here
        _ => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySnapshotStore;
    use serde_json::json;
    use std::sync::Arc;

    fn props(value: serde_json::Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    fn key(app: &str, profile: &str) -> ConfigKey {
        ConfigKey::new(app, profile).unwrap()
    }

    #[test]
    fn test_flatten_nested_yaml() {
        let yaml = r#"
server:
  port: 8081
spring:
  application:
    name: product-service
eureka:
  client:
    enabled: true
ratio: 0.5
empty: ~
routes:
  - id: products
    uri: lb://product-service
  - id: inventory
"#;
        let properties = parse_yaml(yaml).unwrap();
        assert_eq!(properties["server.port"], json!(8081));
        assert_eq!(properties["spring.application.name"], json!("product-service"));
        assert_eq!(properties["eureka.client.enabled"], json!(true));
        assert_eq!(properties["ratio"], json!(0.5));
        assert_eq!(properties["empty"], json!(null));
        assert_eq!(properties["routes[0].id"], json!("products"));
        assert_eq!(properties["routes[0].uri"], json!("lb://product-service"));
        assert_eq!(properties["routes[1].id"], json!("inventory"));
    }

    #[test]
    fn test_empty_document() {
        assert!(parse_yaml("").unwrap().is_empty());
        assert!(parse_yaml("# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_documents_resolve_profiles_and_layers() {
        let mut files = BTreeMap::new();
        files.insert("application".to_string(), props(json!({"shared": 1, "log.level": "info"})));
        files.insert("application-prod".to_string(), props(json!({"log.level": "warn"})));
        files.insert("product-service".to_string(), props(json!({"server.port": 8081, "shared": 2})));
        files.insert("product-service-prod".to_string(), props(json!({"server.port": 80})));
        files.insert("api-gateway".to_string(), props(json!({"server.port": 8080})));

        let documents = ConfigRepository::from_files(files).documents().unwrap();
        let keys: Vec<_> = documents.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                key("api-gateway", "default"),
                key("api-gateway", "prod"),
                key("product-service", "default"),
                key("product-service", "prod"),
            ]
        );

        assert_eq!(
            documents[&key("product-service", "default")],
            props(json!({"shared": 2, "log.level": "info", "server.port": 8081}))
        );
        assert_eq!(
            documents[&key("product-service", "prod")],
            props(json!({"shared": 2, "log.level": "warn", "server.port": 80}))
        );
        assert_eq!(
            documents[&key("api-gateway", "default")],
            props(json!({"shared": 1, "log.level": "info", "server.port": 8080}))
        );
        assert_eq!(
            documents[&key("api-gateway", "prod")],
            props(json!({"shared": 1, "log.level": "warn", "server.port": 8080}))
        );
    }

    #[test]
    fn test_app_default_file_layers_over_base() {
        let mut files = BTreeMap::new();
        files.insert("application-default".to_string(), props(json!({"c": 3, "b": 0})));
        files.insert("product-service".to_string(), props(json!({"a": 1, "b": 1})));
        files.insert("product-service-default".to_string(), props(json!({"b": 2})));

        let documents = ConfigRepository::from_files(files).documents().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[&key("product-service", "default")],
            props(json!({"a": 1, "b": 2, "c": 3}))
        );
    }

    #[test]
    fn test_hyphenated_names_without_base_are_applications() {
        let mut files = BTreeMap::new();
        files.insert("inventory-service".to_string(), Properties::new());
        let documents = ConfigRepository::from_files(files).documents().unwrap();
        assert!(documents.contains_key(&key("inventory-service", "default")));
    }

    #[test]
    fn test_longest_base_wins() {
        let stems: BTreeSet<&str> = ["product", "product-service", "product-service-dev"]
            .into_iter()
            .collect();
        assert_eq!(
            split_profile("product-service-dev", &stems),
            Some(("product-service", "dev"))
        );
    }

    #[test]
    fn test_load_from_directory() {
        let dir = std::env::temp_dir().join(format!("config-repo-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("product-service.yml"), "server:\n  port: 8081\n").unwrap();
        fs::write(dir.join("inventory-service.yaml"), "server:\n  port: 8082\n").unwrap();
        fs::write(dir.join("README.md"), "not config").unwrap();

        let documents = ConfigRepository::load(&dir).unwrap().documents().unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(
            documents[&key("inventory-service", "default")]["server.port"],
            json!(8082)
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_rejects_bad_yaml() {
        let dir = std::env::temp_dir().join(format!("config-repo-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("broken.yml"), "a: [1, 2\n").unwrap();

        assert!(matches!(
            ConfigRepository::load(&dir),
            Err(ConfigError::InvalidRepository(_))
        ));
        assert!(matches!(
            ConfigRepository::load(dir.join("missing")),
            Err(ConfigError::InvalidRepository(_))
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let mut files = BTreeMap::new();
        files.insert("product-service".to_string(), props(json!({"a": 1})));
        files.insert("api-gateway".to_string(), props(json!({"b": 2})));
        let repository = ConfigRepository::from_files(files);
        let distributor = ConfigDistributor::new(Arc::new(MemorySnapshotStore::new()));

        let first = repository.seed(&distributor).await.unwrap();
        assert_eq!(first.published.len(), 2);
        assert!(first.unchanged.is_empty());

        let second = repository.seed(&distributor).await.unwrap();
        assert!(second.published.is_empty());
        assert_eq!(second.unchanged.len(), 2);
        assert_eq!(
            distributor.get_latest("product-service", "default").unwrap().version,
            1
        );
    }
}

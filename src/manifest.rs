// src/manifest.rs

//! Parser for deployment manifest TOML files.
//!
//! A manifest declares the packages and OSGi configurations one `apply`
//! run converges, plus shared instance defaults. Attribute names and
//! defaults mirror the single-resource CLI flags.

use crate::crx::Instance;
use crate::error::{Error, Result};
use crate::osgi::{OsgiConfig, PropertySet, PropertyValue};
use crate::pkg::stability::HealthcheckConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// The main deployment manifest
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Shared connection defaults for all declared resources
    #[serde(default)]
    pub defaults: ConnectionDefaults,

    /// Packages to converge, in declaration order
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageEntry>,

    /// OSGi configurations to converge, in declaration order
    #[serde(default, rename = "osgi_config")]
    pub osgi_configs: Vec<OsgiConfigEntry>,
}

/// Instance address and credentials, overridable per resource
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionDefaults {
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// One declared package resource
#[derive(Debug, Clone, Deserialize)]
pub struct PackageEntry {
    /// Artifact location: a URL or a local path
    pub source: String,

    /// Lifecycle action to converge towards
    #[serde(default)]
    pub action: PackageAction,

    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// Credentials for fetching the artifact itself, if any
    #[serde(default)]
    pub http_user: Option<String>,
    #[serde(default)]
    pub http_pass: Option<String>,

    #[serde(default)]
    pub recursive_install: bool,

    #[serde(default)]
    pub rescue_mode: bool,
    #[serde(default = "default_same_state_barrier")]
    pub same_state_barrier: u32,
    #[serde(default = "default_error_state_barrier")]
    pub error_state_barrier: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_sleep_time")]
    pub sleep_time: u64,
}

fn default_same_state_barrier() -> u32 {
    6
}

fn default_error_state_barrier() -> u32 {
    6
}

fn default_max_attempts() -> u32 {
    60
}

fn default_sleep_time() -> u64 {
    10
}

/// Package lifecycle actions a manifest may declare
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageAction {
    Upload,
    Install,
    #[default]
    Deploy,
    Uninstall,
    Delete,
}

/// One declared OSGi configuration resource
#[derive(Debug, Clone, Deserialize)]
pub struct OsgiConfigEntry {
    pub pid: String,
    #[serde(default)]
    pub factory_pid: Option<String>,
    #[serde(default)]
    pub append: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, toml::Value>,

    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Manifest {
    /// Parse a manifest from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ManifestError(e.to_string()))
    }

    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ManifestError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Resolve the target instance for a resource, entry overriding
    /// defaults
    fn resolve_instance(
        &self,
        what: &str,
        instance: &Option<String>,
        username: &Option<String>,
        password: &Option<String>,
    ) -> Result<Instance> {
        let url = instance
            .as_deref()
            .or(self.defaults.instance.as_deref())
            .ok_or_else(|| Error::ManifestError(format!("{what}: no instance declared")))?;
        let username = username
            .as_deref()
            .or(self.defaults.username.as_deref())
            .ok_or_else(|| Error::ManifestError(format!("{what}: no username declared")))?;
        let password = password
            .as_deref()
            .or(self.defaults.password.as_deref())
            .ok_or_else(|| Error::ManifestError(format!("{what}: no password declared")))?;
        Ok(Instance::new(url, username, password))
    }

    /// Target instance for a package entry
    pub fn package_instance(&self, entry: &PackageEntry) -> Result<Instance> {
        self.resolve_instance(&entry.source, &entry.instance, &entry.username, &entry.password)
    }

    /// Target instance for an OSGi config entry
    pub fn osgi_instance(&self, entry: &OsgiConfigEntry) -> Result<Instance> {
        self.resolve_instance(&entry.pid, &entry.instance, &entry.username, &entry.password)
    }
}

impl PackageEntry {
    pub fn healthcheck(&self) -> HealthcheckConfig {
        HealthcheckConfig {
            rescue_mode: self.rescue_mode,
            same_state_barrier: self.same_state_barrier,
            error_state_barrier: self.error_state_barrier,
            max_attempts: self.max_attempts,
            sleep_secs: self.sleep_time,
        }
    }
}

impl OsgiConfigEntry {
    /// Convert the declared TOML properties into a reconciler property
    /// set
    pub fn property_set(&self) -> Result<PropertySet> {
        let mut set = PropertySet::new();
        for (key, value) in &self.properties {
            set.insert(key.clone(), toml_property(key, value)?);
        }
        Ok(set)
    }

    pub fn to_config(&self) -> Result<OsgiConfig> {
        Ok(OsgiConfig {
            pid: self.pid.clone(),
            factory_pid: self.factory_pid.clone(),
            properties: self.property_set()?,
            append: self.append,
        })
    }
}

fn toml_scalar(key: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        other => Err(Error::ManifestError(format!(
            "Property {key} has unsupported value: {other}"
        ))),
    }
}

fn toml_property(key: &str, value: &toml::Value) -> Result<PropertyValue> {
    match value {
        toml::Value::Array(items) => {
            let items = items
                .iter()
                .map(|v| toml_scalar(key, v))
                .collect::<Result<Vec<_>>>()?;
            Ok(PropertyValue::List(items))
        }
        other => Ok(PropertyValue::Scalar(toml_scalar(key, other)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
instance = "http://localhost:4502"
username = "admin"
password = "admin"

[[package]]
source = "https://repo.example.com/app-1.0.0.zip"
action = "deploy"
recursive_install = true

[[package]]
source = "/srv/artifacts/hotfix-2.1.0.zip"
action = "install"
instance = "http://publish:4503"
rescue_mode = true
max_attempts = 30

[[osgi_config]]
pid = "com.example.Service"
append = true

[osgi_config.properties]
enabled = true
hosts = ["a", "b"]
threshold = 5
"#;

    #[test]
    fn test_parse_manifest() {
        let m = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(m.packages.len(), 2);
        assert_eq!(m.osgi_configs.len(), 1);
        assert_eq!(m.packages[0].action, PackageAction::Deploy);
        assert!(m.packages[0].recursive_install);
    }

    #[test]
    fn test_healthcheck_defaults() {
        let m = Manifest::parse(SAMPLE).unwrap();
        let hc = m.packages[0].healthcheck();
        assert!(!hc.rescue_mode);
        assert_eq!(hc.same_state_barrier, 6);
        assert_eq!(hc.error_state_barrier, 6);
        assert_eq!(hc.max_attempts, 60);
        assert_eq!(hc.sleep_secs, 10);

        let hc = m.packages[1].healthcheck();
        assert!(hc.rescue_mode);
        assert_eq!(hc.max_attempts, 30);
    }

    #[test]
    fn test_instance_override() {
        let m = Manifest::parse(SAMPLE).unwrap();
        let default = m.package_instance(&m.packages[0]).unwrap();
        assert_eq!(default.url, "http://localhost:4502");
        let overridden = m.package_instance(&m.packages[1]).unwrap();
        assert_eq!(overridden.url, "http://publish:4503");
        assert_eq!(overridden.username, "admin");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let m = Manifest::parse(
            r#"
[[package]]
source = "/srv/app.zip"
"#,
        )
        .unwrap();
        let err = m.package_instance(&m.packages[0]).unwrap_err();
        assert!(matches!(err, Error::ManifestError(_)));
    }

    #[test]
    fn test_property_conversion() {
        let m = Manifest::parse(SAMPLE).unwrap();
        let set = m.osgi_configs[0].property_set().unwrap();
        assert_eq!(
            set.get("enabled"),
            Some(&PropertyValue::Scalar("true".to_string()))
        );
        assert_eq!(
            set.get("threshold"),
            Some(&PropertyValue::Scalar("5".to_string()))
        );
        assert_eq!(
            set.get("hosts"),
            Some(&PropertyValue::List(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = Manifest::parse(
            r#"
[[package]]
source = "/srv/app.zip"
action = "explode"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ManifestError(_)));
    }
}

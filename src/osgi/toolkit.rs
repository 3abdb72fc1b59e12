// src/osgi/toolkit.rs

//! CQ Unix Toolkit client
//!
//! OSGi configuration is read and written through the toolkit's `cqcfgls`
//! and `cqcfg` commands rather than raw HTTP. Any non-zero exit is fatal
//! for the config action that triggered it.

use crate::crx::Instance;
use crate::error::{Error, Result};
use crate::osgi::config::{PropertySet, PropertyValue};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Default location of the CQ Unix Toolkit scripts
pub const DEFAULT_TOOLKIT_DIR: &str = "/opt/scripts/cq-unix-toolkit";

/// Operations the config reconciler needs from the toolkit
pub trait ConfigToolClient {
    /// List all OSGi configuration pids, one per line
    fn list(&self, instance: &Instance) -> Result<String>;

    /// Fetch the properties of one configuration
    fn properties(&self, instance: &Instance, pid: &str) -> Result<PropertySet>;

    /// Write properties for one configuration (creates it if needed)
    fn set_properties(&self, instance: &Instance, pid: &str, properties: &PropertySet)
        -> Result<()>;
}

/// Subprocess-backed [`ConfigToolClient`]
pub struct ToolkitClient {
    install_dir: PathBuf,
}

impl ToolkitClient {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    fn tool(&self, name: &str) -> PathBuf {
        self.install_dir.join(name)
    }

    fn run(&self, tool: &Path, args: &[String]) -> Result<String> {
        debug!("Executing {} {}", tool.display(), args.join(" "));

        let output = Command::new(tool).args(args).output().map_err(|e| {
            Error::ToolInvocation(format!("Failed to run {}: {e}", tool.display()))
        })?;

        if !output.status.success() {
            return Err(Error::ToolInvocation(format!(
                "{} failed: {}",
                tool.display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn auth_args(instance: &Instance) -> Vec<String> {
        vec![
            "-i".to_string(),
            instance.url.clone(),
            "-u".to_string(),
            instance.username.clone(),
            "-p".to_string(),
            instance.password.clone(),
        ]
    }
}

impl ConfigToolClient for ToolkitClient {
    fn list(&self, instance: &Instance) -> Result<String> {
        self.run(&self.tool("cqcfgls"), &Self::auth_args(instance))
    }

    fn properties(&self, instance: &Instance, pid: &str) -> Result<PropertySet> {
        let mut args = Self::auth_args(instance);
        args.push("-j".to_string());
        args.push(pid.to_string());

        let stdout = self.run(&self.tool("cqcfg"), &args)?;
        parse_properties_json(&stdout, pid)
    }

    fn set_properties(
        &self,
        instance: &Instance,
        pid: &str,
        properties: &PropertySet,
    ) -> Result<()> {
        let mut args = Self::auth_args(instance);
        for (key, value) in properties {
            match value {
                PropertyValue::Scalar(v) => {
                    args.push("-s".to_string());
                    args.push(key.clone());
                    args.push("-v".to_string());
                    args.push(v.clone());
                }
                PropertyValue::List(items) => {
                    for item in items {
                        args.push("-s".to_string());
                        args.push(key.clone());
                        args.push("-v".to_string());
                        args.push(item.clone());
                    }
                }
            }
        }
        args.push(pid.to_string());

        self.run(&self.tool("cqcfg"), &args)?;
        Ok(())
    }
}

/// Parse `cqcfg -j` output into a [`PropertySet`].
///
/// Each property carries either a `value` (scalar) or a `values` array.
pub fn parse_properties_json(json: &str, pid: &str) -> Result<PropertySet> {
    let parsed: Value = serde_json::from_str(json)
        .map_err(|e| Error::ToolInvocation(format!("Bad JSON for {pid}: {e}")))?;

    let properties = parsed
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::ToolInvocation(format!("No properties object for {pid}")))?;

    let mut set = PropertySet::new();
    for (key, entry) in properties {
        if let Some(values) = entry.get("values").and_then(Value::as_array) {
            let items = values.iter().map(value_to_string).collect();
            set.insert(key.clone(), PropertyValue::List(items));
        } else if let Some(value) = entry.get("value") {
            set.insert(key.clone(), PropertyValue::Scalar(value_to_string(value)));
        }
    }

    Ok(set)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

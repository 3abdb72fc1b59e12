// src/osgi/config.rs

//! OSGi configuration reconciliation
//!
//! A much simpler reconciler than the package lifecycle: fetch the
//! current property set, compare it to the declared one (order and
//! duplicates never matter), and rewrite it when they diverge. With
//! `append`, declared list properties are unioned into the current ones
//! instead of replacing them.

use crate::action::ActionOutcome;
use crate::crx::Instance;
use crate::error::Result;
use crate::osgi::toolkit::ConfigToolClient;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{error, info};

/// One OSGi property: a scalar or a multi-valued list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Scalar(String),
    List(Vec<String>),
}

/// Ordered key/value property map of one configuration
pub type PropertySet = BTreeMap<String, PropertyValue>;

/// A declared OSGi configuration resource
#[derive(Debug, Clone)]
pub struct OsgiConfig {
    pub pid: String,
    pub factory_pid: Option<String>,
    pub properties: PropertySet,
    /// Union list properties into the current config instead of
    /// replacing the whole set
    pub append: bool,
}

/// Sort and dedup every list property
fn sanitize_lists(mut set: PropertySet) -> PropertySet {
    for value in set.values_mut() {
        if let PropertyValue::List(items) = value {
            items.sort();
            items.dedup();
        }
    }
    set
}

/// Merge desired properties over current ones.
///
/// List properties are unioned; scalars are overwritten by the desired
/// value.
pub fn merged_properties(current: &PropertySet, desired: &PropertySet) -> PropertySet {
    let mut merged = current.clone();
    for (key, value) in desired {
        match (merged.get(key), value) {
            (Some(PropertyValue::List(old)), PropertyValue::List(new)) => {
                let mut union = old.clone();
                union.extend(new.iter().cloned());
                union.sort();
                union.dedup();
                merged.insert(key.clone(), PropertyValue::List(union));
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// The effective property set a config write would produce
pub fn sanitized_properties(
    desired: &PropertySet,
    current: &PropertySet,
    append: bool,
) -> PropertySet {
    if append {
        sanitize_lists(merged_properties(current, desired))
    } else {
        sanitize_lists(desired.clone())
    }
}

/// Whether the current config already satisfies the declared one.
///
/// Equality is order- and duplicate-insensitive on list properties.
pub fn validate_properties(desired: &PropertySet, current: &PropertySet, append: bool) -> bool {
    sanitized_properties(desired, current, append) == sanitize_lists(current.clone())
}

/// Pids of all instances created from a factory configuration
pub fn factory_instances(config_list: &str, factory_pid: &str) -> Vec<String> {
    // Suffix matches instances only, never the factory pid itself
    let pattern = format!(r"{}\..+", regex::escape(factory_pid));
    let re = Regex::new(&pattern).expect("factory pid pattern is always valid");

    config_list
        .lines()
        .flat_map(|line| re.find_iter(line).map(|m| m.as_str().to_string()))
        .collect()
}

/// Reconciles declared OSGi configurations through a toolkit client
pub struct ConfigReconciler<'a, T: ConfigToolClient> {
    client: &'a T,
}

impl<'a, T: ConfigToolClient> ConfigReconciler<'a, T> {
    pub fn new(client: &'a T) -> Self {
        Self { client }
    }

    /// Whether the pid shows up in the instance's config listing
    fn exists(&self, instance: &Instance, pid: &str) -> Result<bool> {
        let listing = self.client.list(instance)?;
        Ok(listing
            .lines()
            .any(|line| line.split_whitespace().any(|token| token == pid)))
    }

    /// Converge one configuration towards its declared properties.
    ///
    /// An absent config is reported as an error and left untouched: a
    /// missing pid usually means a missing bundle, and silently creating
    /// an orphan config would hide that.
    pub fn create(&self, instance: &Instance, config: &OsgiConfig) -> Result<ActionOutcome> {
        if !self.exists(instance, &config.pid)? {
            let msg = format!("OSGi config {} does not exist", config.pid);
            error!("{msg}");
            if let Some(factory_pid) = &config.factory_pid {
                let siblings = factory_instances(&self.client.list(instance)?, factory_pid);
                info!(
                    "Factory {} currently has {} instance(s)",
                    factory_pid,
                    siblings.len()
                );
            }
            return Ok(ActionOutcome::PreconditionFailed(msg));
        }

        let current = self.client.properties(instance, &config.pid)?;

        if validate_properties(&config.properties, &current, config.append) {
            info!("OSGi config {} is already in valid state", config.pid);
            return Ok(ActionOutcome::UpToDate);
        }

        info!("Updating OSGi config {}", config.pid);
        let effective = sanitized_properties(&config.properties, &current, config.append);
        self.client
            .set_properties(instance, &config.pid, &effective)?;
        Ok(ActionOutcome::Performed)
    }
}

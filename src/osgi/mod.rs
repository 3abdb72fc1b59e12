// src/osgi/mod.rs

//! OSGi configuration management

pub mod config;
pub mod toolkit;

pub use config::{
    factory_instances, merged_properties, sanitized_properties, validate_properties,
    ConfigReconciler, OsgiConfig, PropertySet, PropertyValue,
};
pub use toolkit::{ConfigToolClient, ToolkitClient, DEFAULT_TOOLKIT_DIR};

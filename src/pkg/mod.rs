// src/pkg/mod.rs

//! Package lifecycle reconciliation
//!
//! The core of the crate: descriptor extraction, remote state
//! resolution, the bundle stability monitor, and the controller that
//! drives the five package actions.

pub mod descriptor;
pub mod lifecycle;
pub mod stability;
pub mod state;

pub use descriptor::{PackageDescriptor, PackageMetadataReader, VaultDescriptorReader};
pub use lifecycle::PackageLifecycleController;
pub use stability::{await_stability, HealthcheckConfig, MonitorRun, StabilityVerdict};
pub use state::{resolve_state, PackageState, PackageStateResolver, RemotePackageRecord};

// src/lib.rs

//! crxpkg
//!
//! Declarative package and OSGi configuration deployer for CRX-based
//! content servers (AEM/CQ style instances).
//!
//! # Architecture
//!
//! - State lives on the server: every reconciliation pass rebuilds the
//!   package state from the package manager listing, nothing persists
//!   locally between runs
//! - Idempotent actions: upload/install/deploy/uninstall/delete check
//!   preconditions first and perform at most one mutating call sequence
//! - Stability gating: install paths only succeed once the OSGi bundle
//!   status has settled (or rescue mode accepts repeated poll failures)
//! - Narrow seams: the CRX HTTP client, the descriptor reader and the
//!   config toolkit are traits, swappable with fakes in tests

pub mod action;
pub mod crx;
mod error;
pub mod manifest;
pub mod osgi;
pub mod pkg;

pub use action::ActionOutcome;
pub use crx::{crx_path, CrxClient, HttpCrxClient, Instance};
pub use error::{Error, Result};
pub use manifest::{Manifest, PackageAction};
pub use osgi::{ConfigReconciler, ConfigToolClient, OsgiConfig, PropertySet, PropertyValue};
pub use pkg::{
    await_stability, HealthcheckConfig, PackageDescriptor, PackageLifecycleController,
    PackageMetadataReader, PackageState, RemotePackageRecord, StabilityVerdict,
    VaultDescriptorReader,
};

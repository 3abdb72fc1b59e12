// src/pkg/lifecycle.rs

//! Package lifecycle actions
//!
//! Orchestrates upload/install/deploy/uninstall/delete against a CRX
//! instance. Every action re-resolves the package state first and
//! performs at most one mutating call sequence, so re-running a declared
//! action is always safe. Install paths only report success once the
//! bundle stability check reaches a terminal non-fatal state.

use crate::action::ActionOutcome;
use crate::crx::{crx_path, CrxClient, Instance};
use crate::error::{Error, Result};
use crate::pkg::descriptor::PackageDescriptor;
use crate::pkg::stability::{await_stability, HealthcheckConfig, StabilityVerdict};
use crate::pkg::state::{PackageState, PackageStateResolver, RemotePackageRecord};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Drives the five package actions for one descriptor/instance pair
pub struct PackageLifecycleController<'a, C: CrxClient> {
    client: &'a C,
    instance: Instance,
    descriptor: PackageDescriptor,
    local_path: PathBuf,
    healthcheck: HealthcheckConfig,
    recursive_install: bool,
}

impl<'a, C: CrxClient> PackageLifecycleController<'a, C> {
    pub fn new(
        client: &'a C,
        instance: Instance,
        descriptor: PackageDescriptor,
        local_path: PathBuf,
        healthcheck: HealthcheckConfig,
        recursive_install: bool,
    ) -> Self {
        Self {
            client,
            instance,
            descriptor,
            local_path,
            healthcheck,
            recursive_install,
        }
    }

    fn resolve(&self) -> Result<PackageState> {
        PackageStateResolver::new(self.client).resolve(&self.instance, &self.descriptor)
    }

    /// Install the matched record and wait for the bundles to settle
    fn trigger_install(&self, record: &RemotePackageRecord) -> Result<()> {
        info!("Installing package {}", self.descriptor.name);
        self.client.install(
            &self.instance,
            &crx_path(&record.group, &record.download_name),
            self.recursive_install,
        )?;
        self.monitor_stability()
    }

    fn monitor_stability(&self) -> Result<()> {
        let verdict = await_stability(
            || self.client.fetch_bundle_status(&self.instance),
            &self.healthcheck,
        )?;
        if verdict == StabilityVerdict::RescuedAfterErrors {
            warn!(
                "Package {} converged in rescue mode; bundle state is unverified",
                self.descriptor.name
            );
        }
        Ok(())
    }

    /// Upload the local artifact unless the exact version is already there
    pub fn upload(&self) -> Result<ActionOutcome> {
        let state = self.resolve()?;
        if state.uploaded {
            info!("Package {} is already uploaded", self.descriptor.name);
            return Ok(ActionOutcome::UpToDate);
        }

        info!("Uploading package {}", self.descriptor.name);
        self.client.upload(&self.instance, &self.local_path)?;
        Ok(ActionOutcome::Performed)
    }

    /// Install an already-uploaded package
    pub fn install(&self) -> Result<ActionOutcome> {
        let state = self.resolve()?;
        match (state.matched, state.installed) {
            (None, _) => {
                let msg = format!(
                    "Can't install package {}: not uploaded",
                    self.descriptor.name
                );
                error!("{msg}");
                Ok(ActionOutcome::PreconditionFailed(msg))
            }
            (Some(_), true) => {
                info!("Package {} is already installed", self.descriptor.name);
                Ok(ActionOutcome::UpToDate)
            }
            (Some(record), false) => {
                self.trigger_install(&record)?;
                Ok(ActionOutcome::Performed)
            }
        }
    }

    /// Upload and install in one pass.
    ///
    /// A never-uploaded package is uploaded first, then state is
    /// re-resolved: the remote record's group and download name only
    /// exist after the upload, and install is never attempted without
    /// them.
    pub fn deploy(&self) -> Result<ActionOutcome> {
        let state = self.resolve()?;
        match (state.matched, state.installed) {
            (Some(_), true) => {
                info!(
                    "Package {} is already uploaded and installed",
                    self.descriptor.name
                );
                Ok(ActionOutcome::UpToDate)
            }
            (Some(record), false) => {
                self.trigger_install(&record)?;
                Ok(ActionOutcome::Performed)
            }
            (None, _) => {
                info!("Uploading and installing package {}", self.descriptor.name);
                self.client.upload(&self.instance, &self.local_path)?;

                let state = self.resolve()?;
                match state.matched {
                    Some(record) => {
                        self.trigger_install(&record)?;
                        Ok(ActionOutcome::Performed)
                    }
                    None => Err(Error::RemoteUnavailable(format!(
                        "Package {} v{} is not listed after upload",
                        self.descriptor.name, self.descriptor.version
                    ))),
                }
            }
        }
    }

    /// Uninstall an installed package and wait for the bundles to settle
    pub fn uninstall(&self) -> Result<ActionOutcome> {
        let state = self.resolve()?;
        match (state.matched, state.installed) {
            (None, _) => {
                let msg = format!(
                    "Can't uninstall package {}: not uploaded",
                    self.descriptor.name
                );
                error!("{msg}");
                Ok(ActionOutcome::PreconditionFailed(msg))
            }
            (Some(_), false) => {
                warn!("Package {} is already uninstalled", self.descriptor.name);
                Ok(ActionOutcome::UpToDate)
            }
            (Some(record), true) => {
                info!("Uninstalling package {}", self.descriptor.name);
                self.client.uninstall(
                    &self.instance,
                    &crx_path(&record.group, &record.download_name),
                )?;
                self.monitor_stability()?;
                Ok(ActionOutcome::Performed)
            }
        }
    }

    /// Delete an uploaded package from the package store
    pub fn delete(&self) -> Result<ActionOutcome> {
        let state = self.resolve()?;
        match state.matched {
            None => {
                warn!("Package {} is already deleted", self.descriptor.name);
                Ok(ActionOutcome::UpToDate)
            }
            Some(record) => {
                info!("Deleting package {}", self.descriptor.name);
                self.client.delete(
                    &self.instance,
                    &crx_path(&record.group, &record.download_name),
                )?;
                Ok(ActionOutcome::Performed)
            }
        }
    }
}

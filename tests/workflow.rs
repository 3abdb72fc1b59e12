// tests/workflow.rs

//! End-to-end lifecycle flows against an in-memory CRX instance.
//!
//! The fake client keeps a real package store: uploads add records,
//! installs stamp lastUnpacked, deletes remove records. Actions are
//! exercised in the sequences an operator would run them in.

use crxpkg::pkg::stability::HealthcheckConfig;
use crxpkg::{
    ActionOutcome, CrxClient, Instance, PackageDescriptor, PackageLifecycleController,
    RemotePackageRecord, Result,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// In-memory package store behaving like a CRX package manager
struct InMemoryCrx {
    records: RefCell<Vec<RemotePackageRecord>>,
    /// Identity of the package the next upload lands as
    pending_upload: RemotePackageRecord,
    mutations: RefCell<Vec<String>>,
}

impl InMemoryCrx {
    fn new(pending_upload: RemotePackageRecord) -> Self {
        Self {
            records: RefCell::new(Vec::new()),
            pending_upload,
            mutations: RefCell::new(Vec::new()),
        }
    }

    fn with_records(self, records: Vec<RemotePackageRecord>) -> Self {
        *self.records.borrow_mut() = records;
        self
    }

    fn mutations(&self) -> Vec<String> {
        self.mutations.borrow().clone()
    }
}

impl CrxClient for InMemoryCrx {
    fn list_packages(&self, _instance: &Instance) -> Result<Vec<RemotePackageRecord>> {
        Ok(self.records.borrow().clone())
    }

    fn upload(&self, _instance: &Instance, _local_path: &Path) -> Result<()> {
        self.mutations.borrow_mut().push("upload".to_string());
        self.records.borrow_mut().push(self.pending_upload.clone());
        Ok(())
    }

    fn install(&self, _instance: &Instance, remote_path: &str, _recursive: bool) -> Result<()> {
        self.mutations
            .borrow_mut()
            .push(format!("install {remote_path}"));
        for record in self.records.borrow_mut().iter_mut() {
            if remote_path.ends_with(&record.download_name) {
                record.last_unpacked = Some("2024-06-01T12:00:00".to_string());
            }
        }
        Ok(())
    }

    fn uninstall(&self, _instance: &Instance, remote_path: &str) -> Result<()> {
        self.mutations
            .borrow_mut()
            .push(format!("uninstall {remote_path}"));
        for record in self.records.borrow_mut().iter_mut() {
            if remote_path.ends_with(&record.download_name) {
                record.last_unpacked = None;
            }
        }
        Ok(())
    }

    fn delete(&self, _instance: &Instance, remote_path: &str) -> Result<()> {
        self.mutations
            .borrow_mut()
            .push(format!("delete {remote_path}"));
        self.records
            .borrow_mut()
            .retain(|r| !remote_path.ends_with(&r.download_name));
        Ok(())
    }

    fn fetch_bundle_status(&self, _instance: &Instance) -> Result<String> {
        Ok("all-bundles-active".to_string())
    }
}

fn record(version: &str, unpacked: Option<&str>) -> RemotePackageRecord {
    RemotePackageRecord {
        name: "webapp".to_string(),
        group: "acme".to_string(),
        version: version.to_string(),
        download_name: format!("webapp-{version}.zip"),
        last_unpacked: unpacked.map(|s| s.to_string()),
    }
}

fn controller(client: &InMemoryCrx) -> PackageLifecycleController<'_, InMemoryCrx> {
    PackageLifecycleController::new(
        client,
        Instance::new("http://localhost:4502", "admin", "admin"),
        PackageDescriptor {
            name: "webapp".to_string(),
            group: "acme".to_string(),
            version: "2.0.0".to_string(),
        },
        PathBuf::from("/tmp/webapp-2.0.0.zip"),
        HealthcheckConfig {
            rescue_mode: false,
            same_state_barrier: 2,
            error_state_barrier: 2,
            max_attempts: 10,
            sleep_secs: 0,
        },
        false,
    )
}

#[test]
fn deploy_from_scratch_then_converge() {
    let client = InMemoryCrx::new(record("2.0.0", None));
    let ctl = controller(&client);

    // First pass does the full upload + install sequence
    assert_eq!(ctl.deploy().unwrap(), ActionOutcome::Performed);
    assert_eq!(
        client.mutations(),
        vec!["upload", "install /etc/packages/acme/webapp-2.0.0.zip"]
    );

    // Second pass finds the declared state and touches nothing
    assert_eq!(ctl.deploy().unwrap(), ActionOutcome::UpToDate);
    assert_eq!(client.mutations().len(), 2);
}

#[test]
fn upload_then_install_separately() {
    let client = InMemoryCrx::new(record("2.0.0", None));
    let ctl = controller(&client);

    assert!(matches!(
        ctl.install().unwrap(),
        ActionOutcome::PreconditionFailed(_)
    ));
    assert_eq!(ctl.upload().unwrap(), ActionOutcome::Performed);
    assert_eq!(ctl.install().unwrap(), ActionOutcome::Performed);
    assert_eq!(ctl.install().unwrap(), ActionOutcome::UpToDate);
}

#[test]
fn upgrade_over_older_installed_version() {
    // 1.0.0 is installed; deploying 2.0.0 must upload and install it
    let client = InMemoryCrx::new(record("2.0.0", None))
        .with_records(vec![record("1.0.0", Some("2023-01-01T00:00:00"))]);
    let ctl = controller(&client);

    assert_eq!(ctl.deploy().unwrap(), ActionOutcome::Performed);
    assert_eq!(
        client.mutations(),
        vec!["upload", "install /etc/packages/acme/webapp-2.0.0.zip"]
    );

    // The fresh unpack now outranks the old one
    assert_eq!(ctl.deploy().unwrap(), ActionOutcome::UpToDate);
}

#[test]
fn uninstall_then_delete() {
    let client = InMemoryCrx::new(record("2.0.0", None))
        .with_records(vec![record("2.0.0", Some("2024-01-01T00:00:00"))]);
    let ctl = controller(&client);

    assert_eq!(ctl.uninstall().unwrap(), ActionOutcome::Performed);
    assert_eq!(ctl.uninstall().unwrap(), ActionOutcome::UpToDate);
    assert_eq!(ctl.delete().unwrap(), ActionOutcome::Performed);
    assert_eq!(ctl.delete().unwrap(), ActionOutcome::UpToDate);

    assert_eq!(
        client.mutations(),
        vec![
            "uninstall /etc/packages/acme/webapp-2.0.0.zip",
            "delete /etc/packages/acme/webapp-2.0.0.zip"
        ]
    );
}

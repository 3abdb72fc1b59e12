// src/pkg/state.rs

//! Package state resolution
//!
//! Computes the uploaded/installed status of a package from the server's
//! package listing and the local descriptor. The listing is the only
//! authoritative source; state is recomputed from scratch on every
//! reconciliation pass.

use crate::crx::{CrxClient, Instance};
use crate::error::{Error, Result};
use crate::pkg::descriptor::PackageDescriptor;
use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::debug;

/// One entry from the package manager listing.
///
/// Several records may share name+group when older uploads of the same
/// package are still present; they differ by version. A record counts as
/// installed iff `lastUnpacked` is set and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemotePackageRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "downloadName", default)]
    pub download_name: String,
    #[serde(rename = "lastUnpacked", default)]
    pub last_unpacked: Option<String>,
}

impl RemotePackageRecord {
    /// Whether this record has ever been unpacked on the instance
    pub fn ever_installed(&self) -> bool {
        self.last_unpacked
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }
}

/// Derived state of one package, recomputed each pass.
///
/// Invariants: `installed` implies `uploaded`; `matched` is set iff a
/// remote record exists with exactly the descriptor's name, group and
/// version, and `uploaded == matched.is_some()`.
#[derive(Debug, Clone)]
pub struct PackageState {
    pub uploaded: bool,
    pub installed: bool,
    pub matched: Option<RemotePackageRecord>,
}

/// Parse a `lastUnpacked` timestamp.
///
/// CRX emits RFC 2822 dates; RFC 3339 and bare ISO are accepted as well.
/// The value is server-generated, so a parse failure is a hard error
/// rather than a silent miscompare.
fn parse_last_unpacked(value: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(value) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    Err(Error::MetadataParse(format!(
        "Unparsable lastUnpacked timestamp: {value}"
    )))
}

/// Compute [`PackageState`] from a listing and a descriptor.
///
/// Pure over its inputs; the listing order is preserved while scanning,
/// and ties on `lastUnpacked` keep the first-seen candidate.
pub fn resolve_state(
    records: &[RemotePackageRecord],
    descriptor: &PackageDescriptor,
) -> Result<PackageState> {
    // Records sharing the descriptor's identity, any version
    let uploaded_set: Vec<&RemotePackageRecord> = records
        .iter()
        .filter(|r| r.name == descriptor.name && r.group == descriptor.group)
        .collect();
    debug!("Found {} uploaded package(s)", uploaded_set.len());

    // The package counts as uploaded only at the exact desired version
    let matched = uploaded_set
        .iter()
        .find(|r| r.version == descriptor.version)
        .map(|r| (*r).clone());

    if matched.is_none() {
        // Not uploaded at this version; installed status is irrelevant
        return Ok(PackageState {
            uploaded: false,
            installed: false,
            matched: None,
        });
    }

    let installed_set: Vec<&RemotePackageRecord> = uploaded_set
        .iter()
        .filter(|r| r.ever_installed())
        .copied()
        .collect();
    debug!("Found {} ever installed package(s)", installed_set.len());

    if installed_set.is_empty() {
        return Ok(PackageState {
            uploaded: true,
            installed: false,
            matched,
        });
    }

    // The package may have been upgraded or downgraded before, so the
    // freshest unpack decides which version is actually live
    let mut newest = installed_set[0];
    let mut newest_ts = parse_last_unpacked(newest.last_unpacked.as_deref().unwrap_or(""))?;
    for record in &installed_set[1..] {
        let ts = parse_last_unpacked(record.last_unpacked.as_deref().unwrap_or(""))?;
        if newest_ts < ts {
            newest = record;
            newest_ts = ts;
        }
    }

    let installed = newest.version == descriptor.version;
    Ok(PackageState {
        uploaded: true,
        installed,
        matched,
    })
}

/// Resolves package state against a live instance
pub struct PackageStateResolver<'a, C: CrxClient> {
    client: &'a C,
}

impl<'a, C: CrxClient> PackageStateResolver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Fetch the listing and compute the package's current state
    pub fn resolve(
        &self,
        instance: &Instance,
        descriptor: &PackageDescriptor,
    ) -> Result<PackageState> {
        let records = self.client.list_packages(instance)?;
        let state = resolve_state(&records, descriptor)?;
        debug!(
            "Uploaded? {} Installed? {}",
            state.uploaded, state.installed
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        name: &str,
        group: &str,
        version: &str,
        last_unpacked: Option<&str>,
    ) -> RemotePackageRecord {
        RemotePackageRecord {
            name: name.to_string(),
            group: group.to_string(),
            version: version.to_string(),
            download_name: format!("{name}-{version}.zip"),
            last_unpacked: last_unpacked.map(|s| s.to_string()),
        }
    }

    fn descriptor(version: &str) -> PackageDescriptor {
        PackageDescriptor {
            name: "app".to_string(),
            group: "example".to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_empty_listing_not_uploaded() {
        let state = resolve_state(&[], &descriptor("1.0.0")).unwrap();
        assert!(!state.uploaded);
        assert!(!state.installed);
        assert!(state.matched.is_none());
    }

    #[test]
    fn test_other_version_only_not_uploaded() {
        let records = vec![record("app", "example", "0.9.0", None)];
        let state = resolve_state(&records, &descriptor("1.0.0")).unwrap();
        assert!(!state.uploaded);
        assert!(state.matched.is_none());
    }

    #[test]
    fn test_uploaded_not_installed() {
        let records = vec![record("app", "example", "1.0.0", None)];
        let state = resolve_state(&records, &descriptor("1.0.0")).unwrap();
        assert!(state.uploaded);
        assert!(!state.installed);
        assert_eq!(state.matched.unwrap().version, "1.0.0");
    }

    #[test]
    fn test_empty_last_unpacked_counts_as_never_installed() {
        let records = vec![record("app", "example", "1.0.0", Some(""))];
        let state = resolve_state(&records, &descriptor("1.0.0")).unwrap();
        assert!(state.uploaded);
        assert!(!state.installed);
    }

    #[test]
    fn test_newest_unpack_wins() {
        let records = vec![
            record("app", "example", "1.0.0", Some("2020-01-01T00:00:00")),
            record("app", "example", "1.1.0", Some("2021-06-01T00:00:00")),
        ];

        // Descriptor matches the freshest unpack: installed
        let state = resolve_state(&records, &descriptor("1.1.0")).unwrap();
        assert!(state.uploaded);
        assert!(state.installed);

        // Descriptor matches the stale unpack: uploaded but not installed
        let state = resolve_state(&records, &descriptor("1.0.0")).unwrap();
        assert!(state.uploaded);
        assert!(!state.installed);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let records = vec![
            record("app", "example", "1.0.0", Some("2021-06-01T00:00:00")),
            record("app", "example", "1.1.0", Some("2021-06-01T00:00:00")),
        ];
        let state = resolve_state(&records, &descriptor("1.0.0")).unwrap();
        assert!(state.installed);
    }

    #[test]
    fn test_installed_implies_uploaded() {
        // Same name+group installed at another version does not make the
        // desired version uploaded, let alone installed
        let records = vec![record("app", "example", "0.9.0", Some("2020-01-01T00:00:00"))];
        let state = resolve_state(&records, &descriptor("1.0.0")).unwrap();
        assert!(!state.uploaded);
        assert!(!state.installed);
    }

    #[test]
    fn test_foreign_packages_ignored() {
        let records = vec![
            record("other", "example", "1.0.0", Some("2020-01-01T00:00:00")),
            record("app", "elsewhere", "1.0.0", None),
        ];
        let state = resolve_state(&records, &descriptor("1.0.0")).unwrap();
        assert!(!state.uploaded);
    }

    #[test]
    fn test_rfc2822_last_unpacked() {
        let records = vec![
            record("app", "example", "1.0.0", Some("Wed, 2 Mar 2016 11:41:43 +0100")),
            record("app", "example", "1.1.0", Some("Thu, 3 Mar 2016 09:00:00 +0100")),
        ];
        let state = resolve_state(&records, &descriptor("1.1.0")).unwrap();
        assert!(state.installed);
    }

    #[test]
    fn test_malformed_timestamp_fails_fast() {
        let records = vec![record("app", "example", "1.0.0", Some("yesterday-ish"))];
        let err = resolve_state(&records, &descriptor("1.0.0")).unwrap_err();
        assert!(matches!(err, Error::MetadataParse(_)));
    }
}

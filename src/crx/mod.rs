// src/crx/mod.rs

//! CRX Package Manager access
//!
//! Address/credential handling and the HTTP client used to talk to a
//! CRX-based instance (package manager servlets and the OSGi console).

pub mod client;

pub use client::{CrxClient, HttpCrxClient};

/// Root of the package store inside the repository
pub const PACKAGE_ROOT: &str = "/etc/packages";

/// A target instance: base URL plus the credentials every call uses
#[derive(Debug, Clone)]
pub struct Instance {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Instance {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: trim_trailing_slash(url.into()),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build a full URL for a path on this instance
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

/// Repository path of an uploaded package.
///
/// Install/uninstall/delete target this path; it must match what the
/// package manager reports (group may itself contain slashes).
pub fn crx_path(group: &str, download_name: &str) -> String {
    format!("{}/{}/{}", PACKAGE_ROOT, group, download_name)
}

// src/crx/client.rs

//! HTTP client for CRX Package Manager operations
//!
//! Provides a wrapper around blocking reqwest for listing, uploading and
//! (un)installing packages, fetching the OSGi bundle status, and
//! downloading package artifacts with retry support.

use crate::crx::Instance;
use crate::error::{Error, Result};
use crate::pkg::state::RemotePackageRecord;
use indicatif::ProgressBar;
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed artifact downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Package manager servlet paths
const LIST_PATH: &str = "/crx/packmgr/list.jsp";
const SERVICE_PATH: &str = "/crx/packmgr/service.jsp";
const SCRIPT_PATH: &str = "/crx/packmgr/service/script.html";

/// Felix web console bundle listing
const BUNDLES_PATH: &str = "/system/console/bundles/.json";

/// Operations the reconciliation core needs from a CRX instance.
///
/// The lifecycle controller and state resolver are generic over this
/// trait so tests can substitute a fake without a live server.
pub trait CrxClient {
    /// Fetch the full package listing, in server order
    fn list_packages(&self, instance: &Instance) -> Result<Vec<RemotePackageRecord>>;

    /// Upload a local package archive. Single attempt; failures propagate.
    fn upload(&self, instance: &Instance, local_path: &Path) -> Result<()>;

    /// Install an uploaded package at its repository path
    fn install(&self, instance: &Instance, remote_path: &str, recursive: bool) -> Result<()>;

    /// Uninstall an installed package
    fn uninstall(&self, instance: &Instance, remote_path: &str) -> Result<()>;

    /// Delete an uploaded package
    fn delete(&self, instance: &Instance, remote_path: &str) -> Result<()>;

    /// Fetch the aggregate bundle status as a raw snapshot string.
    ///
    /// The stability monitor compares snapshots byte-for-byte, so no
    /// parsing happens here.
    fn fetch_bundle_status(&self, instance: &Instance) -> Result<String>;
}

/// Shape of the list.jsp response
#[derive(Debug, Deserialize)]
struct PackageListing {
    #[serde(default)]
    results: Vec<RemotePackageRecord>,
}

/// Blocking HTTP implementation of [`CrxClient`]
pub struct HttpCrxClient {
    client: Client,
    max_retries: u32,
}

impl HttpCrxClient {
    /// Create a new client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// POST a package manager command against a repository path
    fn service_command(
        &self,
        instance: &Instance,
        remote_path: &str,
        cmd: &str,
        recursive: bool,
    ) -> Result<()> {
        let url = format!("{}{}", instance.endpoint(SCRIPT_PATH), remote_path);
        debug!("Package manager command {} on {}", cmd, url);

        let mut form: Vec<(&str, &str)> = vec![("cmd", cmd)];
        if recursive {
            form.push(("recursive", "true"));
        }

        let response = self
            .client
            .post(&url)
            .basic_auth(&instance.username, Some(&instance.password))
            .form(&form)
            .send()
            .map_err(|e| Error::RemoteUnavailable(format!("{cmd} request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        Ok(())
    }

    /// Download a package artifact to the specified path with retry support
    ///
    /// Writes to a temp file first and renames atomically, so a partial
    /// download never masquerades as a cached artifact.
    pub fn download_artifact(
        &self,
        url: &str,
        dest_path: &Path,
        auth: Option<(&str, &str)>,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::IoError(format!("Failed to create directory {}: {e}", parent.display()))
            })?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.get(url);
            if let Some((user, pass)) = auth {
                request = request.basic_auth(user, Some(pass));
            }

            match request.send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let total_size = response.content_length().unwrap_or(0);

                    let temp_path = dest_path.with_extension("tmp");
                    let mut file = File::create(&temp_path).map_err(|e| {
                        Error::IoError(format!("Failed to create file {}: {e}", temp_path.display()))
                    })?;

                    let downloaded = stream_response_to_file(
                        response,
                        &mut file,
                        total_size,
                        progress_bar,
                    )?;

                    if let Some(pb) = progress_bar {
                        pb.finish_with_message("done");
                    }

                    info!("Downloaded {} bytes", downloaded);

                    fs::rename(&temp_path, dest_path).map_err(|e| {
                        Error::IoError(format!(
                            "Failed to move {} to {}: {e}",
                            temp_path.display(),
                            dest_path.display()
                        ))
                    })?;

                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl CrxClient for HttpCrxClient {
    fn list_packages(&self, instance: &Instance) -> Result<Vec<RemotePackageRecord>> {
        let url = instance.endpoint(LIST_PATH);
        debug!("Fetching package listing from {}", url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&instance.username, Some(&instance.password))
            .send()
            .map_err(|e| Error::RemoteUnavailable(format!("Listing request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let listing: PackageListing = response.json().map_err(|e| {
            Error::RemoteUnavailable(format!("Failed to parse package listing: {e}"))
        })?;

        debug!("Listing contains {} package(s)", listing.results.len());
        Ok(listing.results)
    }

    fn upload(&self, instance: &Instance, local_path: &Path) -> Result<()> {
        let url = instance.endpoint(SERVICE_PATH);
        info!("Uploading {} to {}", local_path.display(), url);

        let form = multipart::Form::new()
            .text("force", "true")
            .file("file", local_path)
            .map_err(|e| {
                Error::IoError(format!("Failed to read {}: {e}", local_path.display()))
            })?;

        let response = self
            .client
            .post(&url)
            .basic_auth(&instance.username, Some(&instance.password))
            .multipart(form)
            .send()
            .map_err(|e| Error::RemoteUnavailable(format!("Upload request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        Ok(())
    }

    fn install(&self, instance: &Instance, remote_path: &str, recursive: bool) -> Result<()> {
        self.service_command(instance, remote_path, "install", recursive)
    }

    fn uninstall(&self, instance: &Instance, remote_path: &str) -> Result<()> {
        self.service_command(instance, remote_path, "uninstall", false)
    }

    fn delete(&self, instance: &Instance, remote_path: &str) -> Result<()> {
        self.service_command(instance, remote_path, "delete", false)
    }

    fn fetch_bundle_status(&self, instance: &Instance) -> Result<String> {
        let url = instance.endpoint(BUNDLES_PATH);
        debug!("Fetching bundle status from {}", url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&instance.username, Some(&instance.password))
            .send()
            .map_err(|e| Error::RemoteUnavailable(format!("Bundle status request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        response
            .text()
            .map_err(|e| Error::RemoteUnavailable(format!("Failed to read bundle status: {e}")))
    }
}

/// Stream HTTP response to file with optional progress tracking
///
/// Always streams data in chunks, never buffering the entire response in
/// memory.
fn stream_response_to_file(
    mut response: reqwest::blocking::Response,
    file: &mut File,
    total_size: u64,
    progress_bar: Option<&ProgressBar>,
) -> Result<u64> {
    if let Some(pb) = progress_bar {
        if total_size > 0 {
            pb.set_length(total_size);
        }
    }

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        let bytes_read = response
            .read(&mut buffer)
            .map_err(|e| Error::IoError(format!("Failed to read response: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| Error::IoError(format!("Failed to write data: {e}")))?;

        downloaded += bytes_read as u64;

        if let Some(pb) = progress_bar {
            pb.set_position(downloaded);
        }
    }

    file.flush()
        .map_err(|e| Error::IoError(format!("Failed to flush download: {e}")))?;

    Ok(downloaded)
}

// src/commands.rs
//! Command handlers for the crxpkg CLI

use crate::cli::{ConnectionArgs, HealthcheckArgs, SourceArgs};
use anyhow::{bail, Context, Result};
use crxpkg::osgi::{ConfigReconciler, OsgiConfig, PropertySet, PropertyValue, ToolkitClient};
use crxpkg::pkg::{
    HealthcheckConfig, PackageLifecycleController, PackageMetadataReader, VaultDescriptorReader,
};
use crxpkg::{ActionOutcome, Error, HttpCrxClient, Instance, Manifest, PackageAction};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{error, info, warn};

impl ConnectionArgs {
    fn to_instance(&self) -> Instance {
        Instance::new(&self.instance, &self.username, &self.password)
    }
}

impl HealthcheckArgs {
    fn to_config(&self) -> HealthcheckConfig {
        HealthcheckConfig {
            rescue_mode: self.rescue_mode,
            same_state_barrier: self.same_state_barrier,
            error_state_barrier: self.error_state_barrier,
            max_attempts: self.max_attempts,
            sleep_secs: self.sleep_time,
        }
    }
}

/// Run one package lifecycle action from CLI arguments
pub fn package_action(
    action: PackageAction,
    source: &SourceArgs,
    connection: &ConnectionArgs,
    healthcheck: Option<&HealthcheckArgs>,
    recursive: bool,
) -> Result<()> {
    let client = HttpCrxClient::new()?;
    let local_path = materialize_artifact(
        &client,
        &source.source,
        source.http_user.as_deref(),
        source.http_pass.as_deref(),
        source.cache_dir.as_deref().map(PathBuf::from),
    )?;

    let healthcheck = healthcheck
        .map(HealthcheckArgs::to_config)
        .unwrap_or_else(default_healthcheck);

    let outcome = run_action(
        &client,
        action,
        connection.to_instance(),
        local_path,
        healthcheck,
        recursive,
    )?;

    finish_single(outcome)
}

/// Default polling policy when an action has no healthcheck flags
fn default_healthcheck() -> HealthcheckConfig {
    HealthcheckConfig {
        rescue_mode: false,
        same_state_barrier: 6,
        error_state_barrier: 6,
        max_attempts: 60,
        sleep_secs: 10,
    }
}

fn run_action(
    client: &HttpCrxClient,
    action: PackageAction,
    instance: Instance,
    local_path: PathBuf,
    healthcheck: HealthcheckConfig,
    recursive: bool,
) -> Result<ActionOutcome> {
    let descriptor = VaultDescriptorReader.read_descriptor(&local_path)?;
    info!(
        "Converging package {} v{} towards {:?}",
        descriptor.name, descriptor.version, action
    );

    let controller = PackageLifecycleController::new(
        client,
        instance,
        descriptor,
        local_path,
        healthcheck,
        recursive,
    );

    let outcome = match action {
        PackageAction::Upload => controller.upload()?,
        PackageAction::Install => controller.install()?,
        PackageAction::Deploy => controller.deploy()?,
        PackageAction::Uninstall => controller.uninstall()?,
        PackageAction::Delete => controller.delete()?,
    };
    Ok(outcome)
}

fn finish_single(outcome: ActionOutcome) -> Result<()> {
    match outcome {
        ActionOutcome::Performed => {
            info!("Converged");
            Ok(())
        }
        ActionOutcome::UpToDate => {
            info!("Already up to date");
            Ok(())
        }
        ActionOutcome::PreconditionFailed(msg) => bail!(msg),
    }
}

/// Ensure the package artifact exists locally, downloading it if the
/// source is a URL
fn materialize_artifact(
    client: &HttpCrxClient,
    source: &str,
    http_user: Option<&str>,
    http_pass: Option<&str>,
    cache_dir: Option<PathBuf>,
) -> Result<PathBuf> {
    if !is_url(source) {
        return Ok(PathBuf::from(source));
    }

    let cache_dir = match cache_dir {
        Some(dir) => dir,
        None => dirs::cache_dir()
            .context("No cache directory available; pass --cache-dir")?
            .join("crxpkg"),
    };
    let dest = cache_dir.join(artifact_basename(source)?);

    let bar = ProgressBar::new(0).with_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} {msg}")
            .expect("progress template is valid"),
    );
    let auth = match (http_user, http_pass) {
        (Some(user), Some(pass)) => Some((user, pass)),
        _ => None,
    };
    client.download_artifact(source, &dest, auth, Some(&bar))?;
    Ok(dest)
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Filename component of an artifact URL
fn artifact_basename(source: &str) -> Result<String> {
    let url = url::Url::parse(source).with_context(|| format!("Invalid source URL {source}"))?;
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(|name| name.to_string())
        .with_context(|| format!("Source URL {source} has no filename"))
}

/// Parse repeated `key=value` flags into a property set; a repeated key
/// becomes a list property
fn parse_property_flags(flags: &[String]) -> Result<PropertySet> {
    let mut set = PropertySet::new();
    for flag in flags {
        let (key, value) = flag
            .split_once('=')
            .with_context(|| format!("Property '{flag}' is not KEY=VALUE"))?;
        match set.remove(key) {
            None => {
                set.insert(key.to_string(), PropertyValue::Scalar(value.to_string()));
            }
            Some(PropertyValue::Scalar(first)) => {
                set.insert(
                    key.to_string(),
                    PropertyValue::List(vec![first, value.to_string()]),
                );
            }
            Some(PropertyValue::List(mut items)) => {
                items.push(value.to_string());
                set.insert(key.to_string(), PropertyValue::List(items));
            }
        }
    }
    Ok(set)
}

/// Converge a single OSGi configuration from CLI arguments
pub fn config_action(
    pid: &str,
    factory_pid: Option<&str>,
    append: bool,
    properties: &[String],
    toolkit_dir: &str,
    connection: &ConnectionArgs,
) -> Result<()> {
    let tool = ToolkitClient::new(toolkit_dir);
    let config = OsgiConfig {
        pid: pid.to_string(),
        factory_pid: factory_pid.map(|s| s.to_string()),
        properties: parse_property_flags(properties)?,
        append,
    };

    let outcome = ConfigReconciler::new(&tool).create(&connection.to_instance(), &config)?;
    finish_single(outcome)
}

/// Converge every resource declared in a manifest.
///
/// Per-resource failures are reported and skipped; stability timeouts
/// and toolkit failures abort the whole run.
pub fn apply(manifest_path: &str, cache_dir: Option<&str>, toolkit_dir: &str) -> Result<()> {
    let manifest = Manifest::load(std::path::Path::new(manifest_path))?;
    let client = HttpCrxClient::new()?;
    let tool = ToolkitClient::new(toolkit_dir);

    let mut failures = 0usize;

    for entry in &manifest.packages {
        let result = (|| -> Result<ActionOutcome> {
            let instance = manifest.package_instance(entry)?;
            let local_path = materialize_artifact(
                &client,
                &entry.source,
                entry.http_user.as_deref(),
                entry.http_pass.as_deref(),
                cache_dir.map(PathBuf::from),
            )?;
            run_action(
                &client,
                entry.action,
                instance,
                local_path,
                entry.healthcheck(),
                entry.recursive_install,
            )
        })();

        match result {
            Ok(ActionOutcome::PreconditionFailed(_)) => failures += 1,
            Ok(_) => {}
            Err(e) => {
                if is_fatal(&e) {
                    return Err(e);
                }
                error!("Package {} failed: {e:#}", entry.source);
                failures += 1;
            }
        }
    }

    for entry in &manifest.osgi_configs {
        let result = (|| -> Result<ActionOutcome> {
            let instance = manifest.osgi_instance(entry)?;
            let config = entry.to_config()?;
            Ok(ConfigReconciler::new(&tool).create(&instance, &config)?)
        })();

        match result {
            Ok(ActionOutcome::PreconditionFailed(_)) => failures += 1,
            Ok(_) => {}
            Err(e) => {
                if is_fatal(&e) {
                    return Err(e);
                }
                error!("OSGi config {} failed: {e:#}", entry.pid);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        warn!("{failures} resource(s) did not converge");
        bail!("{failures} resource(s) did not converge");
    }
    info!("All resources converged");
    Ok(())
}

/// Errors that must abort a manifest run instead of skipping to the
/// next resource
fn is_fatal(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<Error>(),
        Some(Error::StabilityTimeout(_)) | Some(Error::ToolInvocation(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_basename() {
        assert_eq!(
            artifact_basename("https://repo.example.com/path/app-1.0.0.zip").unwrap(),
            "app-1.0.0.zip"
        );
        assert!(artifact_basename("https://repo.example.com/").is_err());
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("http://repo/pkg.zip"));
        assert!(is_url("https://repo/pkg.zip"));
        assert!(!is_url("/srv/artifacts/pkg.zip"));
    }

    #[test]
    fn test_parse_property_flags() {
        let set = parse_property_flags(&[
            "mode=fast".to_string(),
            "hosts=a".to_string(),
            "hosts=b".to_string(),
        ])
        .unwrap();
        assert_eq!(
            set.get("mode"),
            Some(&PropertyValue::Scalar("fast".to_string()))
        );
        assert_eq!(
            set.get("hosts"),
            Some(&PropertyValue::List(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn test_parse_property_flags_rejects_bare_key() {
        assert!(parse_property_flags(&["oops".to_string()]).is_err());
    }
}

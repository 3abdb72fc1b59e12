// src/cli.rs
//! CLI definitions for crxpkg
//!
//! This module contains all command-line interface definitions using
//! clap. The actual command implementations are in the `commands`
//! module.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "crxpkg")]
#[command(version)]
#[command(about = "Package and OSGi configuration deployer for CRX-based servers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Target instance address and credentials
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Instance base URL
    #[arg(short, long, default_value = "http://localhost:4502")]
    pub instance: String,

    /// Instance username
    #[arg(short, long, default_value = "admin")]
    pub username: String,

    /// Instance password
    #[arg(short, long, default_value = "admin")]
    pub password: String,
}

/// Artifact location and fetch credentials
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Package artifact: a URL or a local path
    pub source: String,

    /// HTTP user for fetching the artifact
    #[arg(long)]
    pub http_user: Option<String>,

    /// HTTP password for fetching the artifact
    #[arg(long)]
    pub http_pass: Option<String>,

    /// Directory for downloaded artifacts (default: user cache dir)
    #[arg(long)]
    pub cache_dir: Option<String>,
}

/// Bundle stability polling policy
#[derive(Args, Debug)]
pub struct HealthcheckArgs {
    /// Accept repeated status poll failures as a degraded success
    #[arg(long)]
    pub rescue_mode: bool,

    /// Consecutive identical bundle snapshots required
    #[arg(long, default_value_t = 6)]
    pub same_state_barrier: u32,

    /// Consecutive poll failures tolerated before rescue
    #[arg(long, default_value_t = 6)]
    pub error_state_barrier: u32,

    /// Total poll attempts before aborting
    #[arg(long, default_value_t = 60)]
    pub max_attempts: u32,

    /// Seconds to sleep between polls
    #[arg(long, default_value_t = 10)]
    pub sleep_time: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a package to the instance
    Upload {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Install an already-uploaded package
    Install {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        healthcheck: HealthcheckArgs,

        /// Install subpackages recursively
        #[arg(long)]
        recursive: bool,
    },

    /// Upload and install in one pass
    Deploy {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        healthcheck: HealthcheckArgs,

        /// Install subpackages recursively
        #[arg(long)]
        recursive: bool,
    },

    /// Uninstall an installed package
    Uninstall {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        healthcheck: HealthcheckArgs,
    },

    /// Delete an uploaded package from the package store
    Delete {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Converge one OSGi configuration
    Config {
        /// Configuration pid
        pid: String,

        /// Factory pid this config belongs to, if any
        #[arg(long)]
        factory_pid: Option<String>,

        /// Union list properties instead of replacing the set
        #[arg(long)]
        append: bool,

        /// Property as key=value; repeat a key for list values
        #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
        properties: Vec<String>,

        /// CQ Unix Toolkit installation directory
        #[arg(long, default_value = crxpkg::osgi::DEFAULT_TOOLKIT_DIR)]
        toolkit_dir: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Converge every resource declared in a manifest
    Apply {
        /// Manifest TOML file
        manifest: String,

        /// Directory for downloaded artifacts (default: user cache dir)
        #[arg(long)]
        cache_dir: Option<String>,

        /// CQ Unix Toolkit installation directory
        #[arg(long, default_value = crxpkg::osgi::DEFAULT_TOOLKIT_DIR)]
        toolkit_dir: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

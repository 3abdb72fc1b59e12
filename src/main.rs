// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use crxpkg::PackageAction;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload { source, connection } => {
            commands::package_action(PackageAction::Upload, &source, &connection, None, false)
        }
        Commands::Install {
            source,
            connection,
            healthcheck,
            recursive,
        } => commands::package_action(
            PackageAction::Install,
            &source,
            &connection,
            Some(&healthcheck),
            recursive,
        ),
        Commands::Deploy {
            source,
            connection,
            healthcheck,
            recursive,
        } => commands::package_action(
            PackageAction::Deploy,
            &source,
            &connection,
            Some(&healthcheck),
            recursive,
        ),
        Commands::Uninstall {
            source,
            connection,
            healthcheck,
        } => commands::package_action(
            PackageAction::Uninstall,
            &source,
            &connection,
            Some(&healthcheck),
            false,
        ),
        Commands::Delete { source, connection } => {
            commands::package_action(PackageAction::Delete, &source, &connection, None, false)
        }
        Commands::Config {
            pid,
            factory_pid,
            append,
            properties,
            toolkit_dir,
            connection,
        } => commands::config_action(
            &pid,
            factory_pid.as_deref(),
            append,
            &properties,
            &toolkit_dir,
            &connection,
        ),
        Commands::Apply {
            manifest,
            cache_dir,
            toolkit_dir,
        } => commands::apply(&manifest, cache_dir.as_deref(), &toolkit_dir),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "crxpkg",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

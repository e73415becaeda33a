//! Command-line host for hotbind plugins.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hotbind_core::config::{HostConfig, env_vars};
use hotbind_core::manifest::build_registry;
use hotbind_core::{LoadReport, PluginLoader, UnloadReport};

mod watcher;

use watcher::ModuleWatcher;

/// hotbind - Load, check and hot reload native plugins.
#[derive(Parser, Debug)]
#[command(name = "hotbind")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Host configuration file.
    #[arg(short, long, global = true, default_value = "hotbind.toml")]
    config: PathBuf,

    /// Plugin directory, overriding the config file and HOTBIND_PLUGIN_DIR.
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Load every declared plugin once, print the report and unload again.
    Check {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Load plugins and reload them whenever their module files change.
    Watch,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(args.verbose);

    let config = load_config(&args.config, args.dir.as_deref())?;

    match args.command {
        Command::Check { json } => run_check(&config, json),
        Command::Watch => run_watch(&config).await,
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "hotbind=debug,hotbind_core=debug"
    } else {
        "hotbind=info,hotbind_core=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Read the host config and apply environment and command-line overrides,
/// in that order.
fn load_config(path: &Path, dir: Option<&Path>) -> Result<HostConfig> {
    let mut config = HostConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;

    config.loader = config.loader.with_env();
    if let Some(dir) = dir {
        config.loader.base_directory = dir.to_path_buf();
    }

    if config.plugins.is_empty() {
        anyhow::bail!("{} declares no plugins", path.display());
    }
    Ok(config)
}

fn run_check(config: &HostConfig, json: bool) -> Result<ExitCode> {
    let registry = build_registry(&config.plugins)?;
    let mut loader = PluginLoader::native(registry);

    let report = loader.init_with_config(&config.loader)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    log_unload(&loader.dispose());

    let unbound = report.unbound_slots().count();
    if unbound > 0 {
        tracing::warn!("{} declared function(s) are unbound", unbound);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_watch(config: &HostConfig) -> Result<ExitCode> {
    let registry = build_registry(&config.plugins)?;
    let declared: Vec<String> = registry
        .descriptors()
        .iter()
        .map(|d| d.logical_name().to_string())
        .collect();

    let mut loader = PluginLoader::native(registry);
    loader.on_bound().subscribe(|_| tracing::debug!("Plugin bindings ready"));

    let report = loader.init_with_config(&config.loader)?;
    print_summary(&report);

    let locator = config.loader.locator();
    if !locator.base_directory().is_dir() {
        anyhow::bail!(
            "plugin directory {} does not exist",
            locator.base_directory().display()
        );
    }
    let mut watcher = ModuleWatcher::new(locator, declared, config.debounce())?;

    loop {
        tokio::select! {
            change = watcher.next_change() => {
                let Some(changed) = change else {
                    tracing::warn!("File watcher stopped");
                    break;
                };
                tracing::info!(
                    "Module change detected: {}",
                    changed.into_iter().collect::<Vec<_>>().join(", ")
                );

                match loader.reload() {
                    Ok((unloaded, loaded)) => {
                        log_unload(&unloaded);
                        print_summary(&loaded);
                    }
                    Err(e) => tracing::error!("Reload failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, unloading plugins");
                break;
            }
        }
    }

    log_unload(&loader.dispose());
    Ok(ExitCode::SUCCESS)
}

fn print_summary(report: &LoadReport) {
    print!("{}", report);
    tracing::info!(
        "{} of {} plugins loaded, {} unbound function(s)",
        report.loaded_count(),
        report.plugins.len(),
        report.unbound_slots().count()
    );
}

fn log_unload(report: &UnloadReport) {
    for failure in &report.failures {
        tracing::warn!("{}", failure);
    }
}

//! kubernator - a declarative, pluggable Kubernetes provisioner.
//!
//! Walks a directory tree, gathers resource manifests and CRDs through the
//! `k8s` plugin, and reconciles them against a live cluster in a single
//! synchronous pass (`SPEC_FULL.md` §1, §6).

mod config;
mod error;
mod exit_codes;
mod logging;

use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use console::style;
use kubernator_core::Context;
use kubernator_kube::K8sPlugin;
use kubernator_walker::{PluginRegistry, Walker};
use serde_json::json;

use config::RootConfig;
use error::{AppError, Result};
use logging::{LogFormat, Verbosity};

#[derive(Parser)]
#[command(name = "kubernator")]
#[command(author, version, about = "Declarative, pluggable Kubernetes provisioner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory to walk.
    #[arg(short = 'p', long = "path", global = true, default_value = ".")]
    path: PathBuf,

    /// Output log format.
    #[arg(long = "log-format", global = true, value_enum, default_value = "human")]
    log_format: LogFormat,

    /// Mirror logs to a file in addition to stderr.
    #[arg(long = "log-file", global = true)]
    log_file: Option<PathBuf>,

    /// Log verbosity threshold.
    #[arg(short = 'v', long = "verbosity", global = true, value_enum, default_value = "info")]
    verbosity: Verbosity,

    /// Serialized dump format.
    #[arg(short = 'o', long = "output", global = true)]
    output_format: Option<String>,

    /// Field-validation strictness: ignore, warn, or strict.
    #[arg(long = "field-validation", global = true)]
    field_validation: Option<String>,

    /// Treat accumulated field-validation warnings as fatal.
    #[arg(long = "warn-fatal", global = true)]
    warn_fatal: bool,

    /// Confirm a destructive pass (a real, non-dump, non-dry-run apply).
    #[arg(long = "yes", global = true)]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the desired state and serialize it instead of issuing it.
    Dump {
        /// Write the dump to a file instead of stdout.
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,
    },
    /// Reconcile the resolved desired state against the live cluster.
    Apply {
        /// Issue calls with the server-side dry-run flag set rather than persist them.
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let _guard = logging::init(cli.log_format, cli.verbosity, cli.log_file.as_deref());

    let exit_code = match run(cli) {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };
    std::process::exit(exit_code);
}

fn report_error(err: &AppError) {
    tracing::error!(target: "kubernator_cli", "{err}");
    eprintln!("{} {err}", style("error:").red().bold());
}

/// An `apply` that both persists and skips the dry-run probe requires `--yes`.
fn needs_confirmation(dry_run: bool, yes: bool) -> bool {
    !dry_run && !yes
}

fn run(cli: Cli) -> Result<()> {
    let root_config = RootConfig::load(&cli.path)?;

    let (dump, dry_run, dump_file) = match &cli.command {
        Commands::Dump { file } => (true, false, file.clone()),
        Commands::Apply { dry_run } => {
            let dry_run = RootConfig::override_bool(root_config.dry_run, Some(*dry_run)).unwrap_or(false);
            if needs_confirmation(dry_run, cli.yes) {
                return Err(AppError::usage(
                    "refusing to apply without --yes: this issues real create/patch/delete calls against the cluster",
                ));
            }
            (false, dry_run, None)
        }
    };

    let warn_fatal = RootConfig::override_bool(root_config.warn_fatal, Some(cli.warn_fatal)).unwrap_or(false);
    let field_validation = RootConfig::override_string(&root_config.field_validation, &cli.field_validation);
    let output_format = RootConfig::override_string(&root_config.output_format, &cli.output_format)
        .unwrap_or_else(|| "json-pretty".to_string());

    let plugin_config = json!({
        "dry_run": dry_run,
        "dump": dump,
        "output_format": output_format,
        "field_validation": field_validation,
        "warn_fatal": warn_fatal,
        "dump_file": dump_file.as_ref().map(|p| p.display().to_string()),
    });

    let mut registry = PluginRegistry::new();
    registry.register("k8s", move |config| {
        Ok(Box::new(K8sPlugin::new(config)?) as Box<dyn kubernator_walker::Plugin>)
    });

    let root_ctx = Rc::new(Context::root());
    let mut walker = Walker::new(registry);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to start the current-thread runtime")
        .block_on(async {
            walker.register_plugin("k8s", plugin_config, &root_ctx).await?;
            walker.run(&cli.path, root_ctx).await
        })?;

    Ok(())
}

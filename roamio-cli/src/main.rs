//! Roamio CLI - keeps a Norg workspace index in sync with disk
//!
//! This is the main entry point for users interacting with Roamio.
//! It provides commands for writing the config, running the daemon,
//! running a single reconciliation pass and inspecting the index.

use clap::{Parser, Subcommand};
use colored::Colorize;
use roamio_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "roamio")]
#[command(author = "Roamio Contributors")]
#[command(version)]
#[command(about = "Keeps an index of your Norg notes in sync with the filesystem", long_about = None)]
struct Cli {
    /// Name of the config file under <config_dir>/roamio/
    #[arg(short, long, global = true, default_value = roamio_core::config::DEFAULT_CONFIG_NAME)]
    config: String,

    /// Workspace directory (overrides workspace.root)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config template if there isn't one yet
    Init,

    /// Watch the workspace and keep the index in sync
    Run,

    /// Reconcile the index once and exit
    Reconcile,

    /// Show index location and statistics
    Status {
        /// List every indexed id
        #[arg(long)]
        files: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let overrides = commands::Overrides {
        dir: cli.dir,
        verbose: cli.verbose,
        no_color: cli.no_color,
    };

    let result = match cli.command {
        Commands::Init => {
            init_logging(cli.verbose, !cli.no_color);
            commands::init(&cli.config)
        }
        Commands::Run => match setup(&cli.config, &overrides) {
            Ok(config) => commands::run(&config).await,
            Err(e) => Err(e),
        },
        Commands::Reconcile => match setup(&cli.config, &overrides) {
            Ok(config) => commands::reconcile(&config).await,
            Err(e) => Err(e),
        },
        Commands::Status { files } => {
            setup(&cli.config, &overrides).and_then(|config| commands::status(&config, files))
        }
    };

    if let Err(e) = result {
        fail(e);
    }
}

/// Loads the config and sets up logging from it.
fn setup(name: &str, overrides: &commands::Overrides) -> commands::Result<Config> {
    let config = commands::load_config(name, overrides)?;
    init_logging(config.logging.verbosity, config.logging.color);
    tracing::info!("Loaded config {}", config.source.display());
    Ok(config)
}

/// Errors always get through; warnings and info only when verbose.
fn init_logging(verbose: bool, color: bool) {
    let default_filter = if verbose { "info" } else { "error" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(color),
        )
        .with(filter)
        .init();
}

fn fail(e: Box<dyn std::error::Error>) -> ! {
    eprintln!("{} {}", "error:".red().bold(), e);
    std::process::exit(1);
}

//! CLI command implementations.

use colored::Colorize;
use roamio_core::{Config, RecordKind, WorkspaceSettings};
use roamio_index::{IndexStore, JsonIndexStore, LoadState};
use roamio_watcher::{ChangeListener, ReconcileError, ReconcileReport, Reconciler, WatchContext};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Command-line flags that override the config file.
pub struct Overrides {
    pub dir: Option<PathBuf>,
    pub verbose: bool,
    pub no_color: bool,
}

/// Loads the named config (writing a template on first run) and applies overrides.
///
/// Runs before logging is set up, so the first-run notice is printed.
pub fn load_config(name: &str, overrides: &Overrides) -> Result<Config> {
    let path = Config::path_for(name)?;
    let (config, created) = load_config_at(&path, overrides)?;

    if created {
        println!(
            "{} No config found, wrote a template to {}",
            "⚠".yellow(),
            path.display()
        );
        println!("  Set {} to your notes directory", "workspace.root".cyan());
    }

    Ok(config)
}

/// Returns the config and whether a template had to be written.
fn load_config_at(path: &Path, overrides: &Overrides) -> Result<(Config, bool)> {
    let created = Config::init_at(path)?;
    let mut config = Config::load(path)?;

    if let Some(dir) = &overrides.dir {
        config.workspace.root = dir.display().to_string();
    }
    if overrides.verbose {
        config.logging.verbosity = true;
    }
    if overrides.no_color {
        config.logging.color = false;
    }

    Ok((config, created))
}

/// Write a config template.
pub fn init(name: &str) -> Result<()> {
    let path = Config::path_for(name)?;

    if Config::init_at(&path)? {
        println!("{} Wrote config template to {}", "✓".green(), path.display());
    } else {
        println!("{} Config already exists at {}", "✓".green(), path.display());
    }
    println!("  Set {} to your notes directory", "workspace.root".cyan());

    Ok(())
}

/// Run the daemon: watch, reconcile once, keep the watch set current.
pub async fn run(config: &Config) -> Result<()> {
    let settings = config.settings()?;
    let (context, listener) = start_context(&settings).await?;

    let mut changes = listener.subscribe();
    let mut listener = tokio::spawn(listener.run());
    let reconciler = Reconciler::new(&settings.root);

    let mut retry_pending = match reconcile_pass(&reconciler, &context, &settings).await {
        Ok(report) => {
            print_report(&report);
            false
        }
        Err(e) => {
            error!("Reconciliation failed, will retry on the next change: {}", e);
            true
        }
    };

    println!(
        "{} Watching {} ({} directories)",
        "✓".green(),
        settings.root.display(),
        context.watch_count()
    );
    println!("  Press {} to stop", "Ctrl+C".cyan());

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                break;
            }
            joined = &mut listener => {
                context.shutdown();
                return match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(format!("watcher stopped: {}", e).into()),
                    Err(e) => Err(format!("watcher task failed: {}", e).into()),
                };
            }
            changed = changes.changed(), if retry_pending => {
                if changed.is_err() {
                    continue;
                }
                match reconcile_pass(&reconciler, &context, &settings).await {
                    Ok(report) => {
                        print_report(&report);
                        retry_pending = false;
                    }
                    Err(e) => error!("Reconciliation retry failed: {}", e),
                }
            }
        }
    }

    info!("Shutting down");
    context.shutdown();
    match listener.await {
        Ok(Err(e)) => warn!("Watcher stopped with error during shutdown: {}", e),
        Err(e) => warn!("Watcher task failed during shutdown: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}

/// Reconcile the index once and exit.
pub async fn reconcile(config: &Config) -> Result<()> {
    let settings = config.settings()?;
    println!("{}", "Reconciling index...".cyan());

    let (context, _listener) = start_context(&settings).await?;
    let reconciler = Reconciler::new(&settings.root);
    let result = reconcile_pass(&reconciler, &context, &settings).await;
    context.shutdown();

    print_report(&result?);
    Ok(())
}

/// Show index status.
pub fn status(config: &Config, show_files: bool) -> Result<()> {
    let settings = config.settings()?;
    let index_path = &settings.index_path;

    if !index_path.exists() {
        println!("{} No index at {}", "✗".red(), index_path.display());
        println!("  Run {} to build it", "roamio reconcile".cyan());
        return Ok(());
    }

    let (store, _) = JsonIndexStore::open(index_path)?;
    let records = store.list();

    let mut per_kind: BTreeMap<String, usize> = BTreeMap::new();
    for record in &records {
        *per_kind.entry(record.kind.to_string()).or_default() += 1;
    }

    println!("{}", "📊 Roamio Status".cyan().bold());
    println!();
    println!("  {} {}", "Workspace:".dimmed(), settings.name);
    println!("  {} {}", "Root:".dimmed(), settings.root.display());
    println!("  {} {}", "Index:".dimmed(), index_path.display());
    println!("  {} {}", "Records:".dimmed(), records.len());
    for (kind, count) in &per_kind {
        println!("    {} {}", format!("{}:", kind).dimmed(), count);
    }

    if show_files {
        println!();
        println!("{}", "📁 Indexed Notes".cyan().bold());
        for record in records.iter().filter(|r| r.kind == RecordKind::File) {
            println!("  {} {}", record.id, record.title.dimmed());
        }
    }

    Ok(())
}

async fn start_context(settings: &WorkspaceSettings) -> Result<(WatchContext, ChangeListener)> {
    let startup = settings.clone();
    let started = tokio::task::spawn_blocking(move || WatchContext::start(&startup)).await??;
    Ok(started)
}

async fn reconcile_pass(
    reconciler: &Reconciler,
    context: &WatchContext,
    settings: &WorkspaceSettings,
) -> std::result::Result<ReconcileReport, ReconcileError> {
    let mut store = JsonIndexStore::new(&settings.index_path);
    reconciler.reconcile(context, &mut store).await
}

fn print_report(report: &ReconcileReport) {
    if report.load_state == LoadState::Created {
        println!("{} No existing index, built a new one", "⚠".yellow());
    }

    println!(
        "{} Reconciled {} notes ({} new, {} evicted) in {}ms",
        "✓".green(),
        report.files_seen.to_string().cyan(),
        report.inserted.to_string().cyan(),
        report.evicted.to_string().cyan(),
        report.duration_ms
    );

    if !report.errors.is_empty() {
        println!("\n{} notes skipped:", "⚠".yellow());
        for (id, error) in report.errors.iter().take(5) {
            println!("  {} - {}", id.red(), error);
        }
        if report.errors.len() > 5 {
            println!("  ... and {} more", report.errors.len() - 5);
        }
    }
}

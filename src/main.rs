// Shelver - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Engine construction and dispatch to one subcommand

use clap::{Parser, Subcommand};
use shelver::app::engine::{Engine, EngineSettings, HistoryFormat};
use shelver::app::organize::OrganizeManager;
use shelver::core::model::{OperationStatus, OrganizeProgress, RecoverySummary};
use shelver::platform::config::{self, PlatformPaths};
use shelver::util::error::{ConfigError, Result};
use shelver::util::{constants, logging};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Interval between progress polls while an organize run is in flight.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shelver - crash-safe file organizer.
///
/// Every relocation is recorded in a durable transaction log before any
/// byte moves, so an interrupted run can always be completed or rolled
/// forward on the next start.
#[derive(Parser, Debug)]
#[command(name = "shelver", version, about)]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Directory holding the transaction log (LOGS/transactions.jsonl).
    #[arg(long = "app-root", global = true)]
    app_root: Option<PathBuf>,

    /// Path to config.toml (defaults to the platform config directory).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List regular files under a directory.
    Scan {
        root: PathBuf,
        /// Directory levels below the root to include.
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Print the category of each file.
    Classify { paths: Vec<PathBuf> },

    /// Move one file, safely and idempotently.
    Relocate { source: PathBuf, dest: PathBuf },

    /// Resolve operations left pending by an interrupted run.
    Recover,

    /// Sort every file under ROOT into category folders under DEST.
    Organize {
        root: PathBuf,
        /// Destination root (defaults to ROOT).
        dest: Option<PathBuf>,
        /// Show the plan without moving anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarise files by category, size, and duplicates.
    Report {
        root: PathBuf,
        #[arg(long)]
        max_depth: Option<usize>,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show or export the operation history.
    History {
        /// Write the history to this file (.csv or .json) instead of printing.
        #[arg(long)]
        export: Option<PathBuf>,
        /// Only show records that are still pending.
        #[arg(long)]
        pending: bool,
    },

    /// Print the content fingerprint (SHA-256) of a file.
    Hash { path: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => {}
        // Already reported through progress output.
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command ran but did not succeed.
fn run(cli: Cli) -> Result<bool> {
    let paths = PlatformPaths::resolve();

    // An explicitly named config file must exist; the default may not.
    let config_path = match &cli.config {
        Some(path) if !path.exists() => {
            return Err(ConfigError::Io {
                path: path.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
            .into());
        }
        Some(path) => path.clone(),
        None => paths.config_file(),
    };
    let (app_config, config_warnings) = config::load_config(&config_path);

    logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref().map(Path::new),
    );
    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "Shelver starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    let app_root = cli
        .app_root
        .clone()
        .or_else(|| app_config.app_root.clone())
        .unwrap_or_else(|| paths.data_dir.clone());
    let engine = Engine::open(EngineSettings::from_config(&app_config, app_root))?;

    match cli.command {
        Command::Scan { root, max_depth } => {
            let report = engine.scan(&root, max_depth)?;
            for file in &report.files {
                println!("{}", file.display());
            }
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
        }

        Command::Classify { paths } => {
            for path in &paths {
                println!("{}\t{}", engine.classify(path), path.display());
            }
        }

        Command::Relocate { source, dest } => {
            print_recovery(&engine.recover()?);
            let outcome = engine.relocate(&source, &dest)?;
            println!("{}", outcome.describe());
        }

        Command::Recover => {
            let summary = engine.recover()?;
            if summary.is_empty() {
                println!("Nothing to recover.");
            }
            print_recovery(&summary);
        }

        Command::Organize {
            root,
            dest,
            dry_run,
        } => {
            let dest = dest.unwrap_or_else(|| root.clone());
            if dry_run {
                let plan = engine.plan(&root, &dest)?;
                for c in &plan.candidates {
                    println!(
                        "{}\t{} -> {}",
                        c.category,
                        c.source.display(),
                        c.destination.display()
                    );
                }
                println!(
                    "{} to move, {} already in place",
                    plan.candidates.len(),
                    plan.already_placed.len()
                );
            } else if !organize(Arc::new(engine), root, dest) {
                return Ok(false);
            }
        }

        Command::Report {
            root,
            max_depth,
            json,
        } => {
            let scanned = engine.scan(&root, max_depth)?;
            let report = engine.report(&scanned.files);
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("Error: cannot serialise report: {e}"),
                }
            } else {
                print_report(&report);
            }
        }

        Command::History { export, pending } => match export {
            Some(out) => {
                let count = engine.export_history(HistoryFormat::from_path(&out), &out)?;
                println!("Exported {count} records to {}", out.display());
            }
            None => {
                for r in engine.log().records()? {
                    if pending && r.status != OperationStatus::Pending {
                        continue;
                    }
                    let dest = r
                        .dest_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    println!(
                        "{:>6}  {}  {:<8}  {} -> {}{}",
                        r.id,
                        r.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        r.status.label(),
                        r.source_path.display(),
                        dest,
                        r.error.map(|e| format!("  ({e})")).unwrap_or_default()
                    );
                }
            }
        },

        Command::Hash { path } => match engine.fingerprint(&path)? {
            Some(hash) => println!("{hash}  {}", path.display()),
            None => println!("-  {} (empty or above the hashing ceiling)", path.display()),
        },
    }

    Ok(true)
}

/// Run an organize on the background manager, printing progress until the
/// worker thread exits. Returns false when the run could not start.
fn organize(engine: Arc<Engine>, root: PathBuf, dest: PathBuf) -> bool {
    let mut manager = OrganizeManager::new();
    manager.start(engine, root, dest);

    let mut ok = true;
    loop {
        let running = manager.is_running();
        for msg in manager.poll_progress() {
            ok &= !matches!(msg, OrganizeProgress::Failed { .. });
            print_progress(&msg);
        }
        if !running {
            // Drain anything sent between the last poll and thread exit.
            manager.wait();
            for msg in manager.poll_progress() {
                ok &= !matches!(msg, OrganizeProgress::Failed { .. });
                print_progress(&msg);
            }
            return ok;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn print_progress(msg: &OrganizeProgress) {
    match msg {
        OrganizeProgress::RecoveryCompleted { summary } => print_recovery(summary),
        OrganizeProgress::ScanStarted { root } => println!("Scanning {}", root.display()),
        OrganizeProgress::ScanCompleted { files } => println!("Found {files} files"),
        OrganizeProgress::Warning { message } => eprintln!("warning: {message}"),
        OrganizeProgress::Planned { total } => println!("Planned {total} files"),
        OrganizeProgress::FileMoved {
            source,
            category,
            outcome,
            completed,
            total,
        } => println!(
            "[{completed}/{total}] {category}: {} - {}",
            source.display(),
            outcome.describe()
        ),
        OrganizeProgress::FileSkipped {
            source,
            reason,
            completed,
            total,
        } => println!("[{completed}/{total}] skipped {} ({reason})", source.display()),
        OrganizeProgress::FileFailed {
            source,
            error,
            source_untouched,
            completed,
            total,
            ..
        } => {
            eprintln!("[{completed}/{total}] FAILED {}: {error}", source.display());
            if !source_untouched {
                eprintln!("    the copy is in place but the source is still present");
            }
        }
        OrganizeProgress::Cancelled { summary } => {
            println!("Cancelled after {} files", summary.processed())
        }
        OrganizeProgress::Completed { summary } => println!(
            "Done in {:.1}s: {} moved, {} already moved, \
             {} duplicates removed, {} skipped, {} failed",
            summary.duration.as_secs_f64(),
            summary.moved,
            summary.already_moved,
            summary.duplicates_removed,
            summary.skipped,
            summary.failed
        ),
        OrganizeProgress::Failed { error } => eprintln!("Error: {error}"),
    }
}

fn print_recovery(summary: &RecoverySummary) {
    if summary.is_empty() {
        return;
    }
    println!(
        "Recovered {} pending operations \
         ({} completed, {} failed, {} temp files removed)",
        summary.resolved.len(),
        summary.completed(),
        summary.failed(),
        summary.temp_artifacts_removed
    );
}

fn print_report(report: &shelver::core::report::AnalysisReport) {
    println!("{} files, {} bytes", report.total_files, report.total_size);
    println!();
    println!("By category:");
    for (category, stats) in &report.by_category {
        println!("  {category:<12} {:>6} files {:>14} bytes", stats.count, stats.total_size);
    }
    if !report.largest_files.is_empty() {
        println!();
        println!("Largest files:");
        for f in &report.largest_files {
            println!("  {:>14}  {}", f.size, f.path.display());
        }
    }
    if !report.duplicate_sets.is_empty() {
        println!();
        println!("Duplicates:");
        for set in &report.duplicate_sets {
            let short = set.hash.get(..12).unwrap_or(&set.hash);
            println!("  {short} ({} bytes each, {} wasted)", set.size, set.wasted_bytes());
            for f in &set.files {
                println!("    {}", f.display());
            }
        }
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
}

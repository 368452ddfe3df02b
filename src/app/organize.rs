// Shelver - app/organize.rs
//
// Organize lifecycle: recovery, scan, plan, and relocation of every planned
// file on a worker pool, with progress streamed over an mpsc channel.
//
// Architecture:
//   - `OrganizeManager` lives on the caller's thread; `run_organize` runs on a
//     background thread it spawns.
//   - An `Arc<AtomicBool>` cancel flag stops the run cooperatively. It is
//     checked between files, never mid-copy, so an in-flight relocation
//     always reaches a terminal state.
//   - Per-file failures are reported and counted; the batch continues.

use crate::app::engine::Engine;
use crate::core::classifier::Classifier;
use crate::core::model::{Candidate, OrganizeProgress, OrganizeSummary, ScanReport};
use crate::core::scanner;
use crate::util::constants;
use crate::util::error::{Result, ShelverError};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

// =============================================================================
// Planning
// =============================================================================

/// Scanned files routed to their destinations.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Files to relocate, in scan order.
    pub candidates: Vec<Candidate>,

    /// Files already sitting in their category's destination directory.
    pub already_placed: Vec<Candidate>,

    pub warnings: Vec<String>,

    pub files_scanned: usize,
}

impl Plan {
    pub fn total(&self) -> usize {
        self.candidates.len() + self.already_placed.len()
    }
}

/// Classify and route every scanned file under `dest_root`.
pub fn build_plan(report: ScanReport, classifier: &dyn Classifier, dest_root: &Path) -> Plan {
    let mut plan = Plan {
        files_scanned: report.files.len(),
        warnings: report.warnings,
        ..Plan::default()
    };

    for source in report.files {
        let Some((category, destination)) = classifier.route(&source, dest_root) else {
            plan.warnings
                .push(format!("Skipping '{}': no file name", source.display()));
            continue;
        };
        let placed = match (source.parent(), destination.parent()) {
            (Some(a), Some(b)) => same_dir(a, b),
            _ => false,
        };
        let candidate = Candidate {
            source,
            category,
            destination,
        };
        if placed {
            plan.already_placed.push(candidate);
        } else {
            plan.candidates.push(candidate);
        }
    }

    tracing::debug!(
        to_move = plan.candidates.len(),
        already_placed = plan.already_placed.len(),
        "Plan built"
    );
    plan
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// =============================================================================
// OrganizeManager
// =============================================================================

/// Manages an organize run on a background thread.
pub struct OrganizeManager {
    /// Channel receiver for polling progress messages.
    pub progress_rx: Option<mpsc::Receiver<OrganizeProgress>>,

    /// Cancel flag shared with the background thread.
    cancel_flag: Option<Arc<AtomicBool>>,

    handle: Option<JoinHandle<()>>,
}

impl OrganizeManager {
    pub fn new() -> Self {
        Self {
            progress_rx: None,
            cancel_flag: None,
            handle: None,
        }
    }

    /// Start organizing `root` into `dest_root`.
    ///
    /// Spawns a background thread immediately; progress is sent over the
    /// channel. If a run is already in progress it is cancelled first.
    pub fn start(&mut self, engine: Arc<Engine>, root: PathBuf, dest_root: PathBuf) {
        self.cancel();

        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));

        self.progress_rx = Some(rx);
        self.cancel_flag = Some(Arc::clone(&cancel));

        self.handle = Some(std::thread::spawn(move || {
            // Errors are already reported through the channel as `Failed`.
            let _ = run_organize(&engine, &root, &dest_root, &cancel, Some(&tx));
        }));

        tracing::info!("Organize started");
    }

    /// Request cancellation of the running organize.
    /// The background thread finishes the file in hand, sends
    /// `OrganizeProgress::Cancelled`, and exits.
    pub fn cancel(&mut self) {
        if let Some(flag) = &self.cancel_flag {
            flag.store(true, Ordering::SeqCst);
        }
        self.cancel_flag = None;
    }

    /// Poll for progress messages without blocking.
    pub fn poll_progress(&self) -> Vec<OrganizeProgress> {
        let mut messages = Vec::new();
        if let Some(ref rx) = self.progress_rx {
            while messages.len() < constants::MAX_PROGRESS_MESSAGES_PER_POLL {
                match rx.try_recv() {
                    Ok(msg) => messages.push(msg),
                    Err(_) => break,
                }
            }
        }
        messages
    }

    /// True while the background thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Block until the background thread exits.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Organize worker thread panicked");
            }
        }
    }
}

impl Default for OrganizeManager {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Organize pipeline
// =============================================================================

/// Full pipeline: recovery → scan → plan → relocation.
///
/// Sends `OrganizeProgress` messages to `progress` when given. Returns `Err`
/// only when the run cannot start (log unavailable, invalid root); such
/// errors are also sent as `OrganizeProgress::Failed`.
pub fn run_organize(
    engine: &Engine,
    root: &Path,
    dest_root: &Path,
    cancel: &AtomicBool,
    progress: Option<&mpsc::Sender<OrganizeProgress>>,
) -> Result<OrganizeSummary> {
    // A dropped receiver is not an error: the run still completes.
    let send = |msg: OrganizeProgress| {
        if let Some(tx) = progress {
            let _ = tx.send(msg);
        }
    };
    let started = Instant::now();

    macro_rules! bail {
        ($err:expr) => {{
            let err = $err;
            tracing::error!(error = %err, "Organize could not run");
            send(OrganizeProgress::Failed {
                error: err.to_string(),
            });
            return Err(err);
        }};
    }

    // -------------------------------------------------------------------------
    // Phase 1: Recovery (always before new work)
    // -------------------------------------------------------------------------
    let recovered = match engine.recover() {
        Ok(summary) => summary,
        Err(e) => bail!(e),
    };
    send(OrganizeProgress::RecoveryCompleted { summary: recovered });

    let mut summary = OrganizeSummary::default();
    macro_rules! check_cancel {
        () => {
            if cancel.load(Ordering::SeqCst) {
                summary.cancelled = true;
                summary.duration = started.elapsed();
                tracing::info!("Organize cancelled");
                send(OrganizeProgress::Cancelled {
                    summary: summary.clone(),
                });
                return Ok(summary);
            }
        };
    }
    check_cancel!();

    // -------------------------------------------------------------------------
    // Phase 2: Scan
    // -------------------------------------------------------------------------
    send(OrganizeProgress::ScanStarted {
        root: root.to_path_buf(),
    });
    let report = match scanner::scan(root, engine.scan_config()) {
        Ok(r) => r,
        Err(e) => bail!(ShelverError::from(e)),
    };
    summary.files_scanned = report.files.len();
    send(OrganizeProgress::ScanCompleted {
        files: report.files.len(),
    });
    check_cancel!();

    // -------------------------------------------------------------------------
    // Phase 3: Plan
    // -------------------------------------------------------------------------
    let plan = build_plan(report, engine.classifier(), dest_root);
    for warning in &plan.warnings {
        send(OrganizeProgress::Warning {
            message: warning.clone(),
        });
    }
    let total = plan.total();
    send(OrganizeProgress::Planned { total });

    for placed in &plan.already_placed {
        summary.skipped += 1;
        send(OrganizeProgress::FileSkipped {
            source: placed.source.clone(),
            reason: format!("already in '{}'", placed.category),
            completed: summary.processed(),
            total,
        });
    }
    check_cancel!();

    // -------------------------------------------------------------------------
    // Phase 4: Relocate on the worker pool
    // -------------------------------------------------------------------------
    let shared = Mutex::new(summary);
    let relocate_one = |candidate: &Candidate| {
        if cancel.load(Ordering::SeqCst) {
            return;
        }

        let result = engine.relocate(&candidate.source, &candidate.destination);

        let mut counters = shared.lock().unwrap_or_else(PoisonError::into_inner);
        let msg = match result {
            Ok(outcome) => {
                counters.record(outcome.disposition);
                OrganizeProgress::FileMoved {
                    source: candidate.source.clone(),
                    category: candidate.category.clone(),
                    outcome,
                    completed: counters.processed(),
                    total,
                }
            }
            Err(e) => {
                counters.failed += 1;
                OrganizeProgress::FileFailed {
                    source: candidate.source.clone(),
                    tag: e.tag(),
                    error: e.to_string(),
                    source_untouched: e.source_untouched(),
                    completed: counters.processed(),
                    total,
                }
            }
        };
        drop(counters);
        send(msg);
    };

    match build_pool(engine.worker_threads()) {
        Ok(pool) => pool.install(|| plan.candidates.par_iter().for_each(&relocate_one)),
        Err(e) => {
            tracing::warn!(error = %e, "Worker pool unavailable; relocating on this thread");
            plan.candidates.iter().for_each(&relocate_one);
        }
    }

    let mut summary = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
    summary.duration = started.elapsed();
    if cancel.load(Ordering::SeqCst) {
        summary.cancelled = true;
        tracing::info!(processed = summary.processed(), total, "Organize cancelled");
        send(OrganizeProgress::Cancelled {
            summary: summary.clone(),
        });
        return Ok(summary);
    }

    tracing::info!(
        scanned = summary.files_scanned,
        moved = summary.moved,
        already_moved = summary.already_moved,
        duplicates_removed = summary.duplicates_removed,
        skipped = summary.skipped,
        failed = summary.failed,
        duration_ms = summary.duration.as_millis() as u64,
        "Organize complete"
    );
    send(OrganizeProgress::Completed {
        summary: summary.clone(),
    });
    Ok(summary)
}

fn build_pool(
    threads: usize,
) -> std::result::Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.min(constants::MAX_WORKER_THREADS))
        .thread_name(|i| format!("shelver-worker-{i}"))
        .build()
}

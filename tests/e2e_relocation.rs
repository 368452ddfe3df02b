// Shelver - tests/e2e_relocation.rs
//
// End-to-end tests for the relocation pipeline.
//
// These tests exercise the real filesystem, the real on-disk transaction
// log, and real SHA-256 fingerprints. Crashes are simulated by building the
// exact on-disk state an interrupted move leaves behind, dropping the
// engine, reopening it from disk, and running recovery.

use shelver::app::engine::{Engine, EngineSettings, HistoryFormat};
use shelver::core::model::{MoveDisposition, OperationKind, OperationStatus, OrganizeProgress};
use shelver::core::mover;
use shelver::platform::config;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn app_root(&self) -> PathBuf {
        self.dir.path().join("app")
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, content: &str) -> PathBuf {
        let p = self.path(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, content).unwrap();
        p
    }

    fn engine(&self) -> Engine {
        let mut settings = EngineSettings::new(self.app_root());
        settings.scan.rate_limit = Duration::ZERO;
        settings.scan.retry.base_delay = Duration::ZERO;
        Engine::open(settings).unwrap()
    }
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    out.sort();
    out
}

/// Record an intent exactly as the mover does before touching anything.
fn record_intent(engine: &Engine, source: &Path, dest: &Path) -> u64 {
    let hash = engine.hasher().fingerprint(source);
    engine
        .log()
        .append(OperationKind::Move, source, Some(dest), hash.as_deref())
        .unwrap()
}

/// After recovery: one copy at `dest` with `content`, source gone, nothing
/// pending, no temp artefacts.
fn assert_converged(ws: &Workspace, source: &Path, dest: &Path, content: &str) {
    let engine = ws.engine();
    assert!(!source.exists(), "source must be gone");
    assert_eq!(fs::read_to_string(dest).unwrap(), content);
    assert_eq!(files_under(dest.parent().unwrap()), vec![dest.to_path_buf()]);
    assert!(engine.log().pending().unwrap().is_empty());
}

// =============================================================================
// Single relocation
// =============================================================================

#[test]
fn e2e_move_into_empty_destination() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let src = ws.write("a.txt", "alpha");
    let hash = engine.hasher().fingerprint(&src).unwrap();

    let outcome = engine.relocate(&src, &ws.path("dest/a.txt")).unwrap();

    assert_eq!(outcome.disposition, MoveDisposition::Moved);
    assert!(!src.exists());
    assert_eq!(
        engine.hasher().fingerprint(&ws.path("dest/a.txt")).as_deref(),
        Some(hash.as_str())
    );
    let records = engine.log().records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, OperationStatus::Complete);
}

#[test]
fn e2e_collision_preserves_existing_file() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let existing = ws.write("dest/a.txt", "existing");
    let src = ws.write("a.txt", "incoming");

    let outcome = engine.relocate(&src, &existing).unwrap();

    assert_eq!(outcome.destination, ws.path("dest/a_v1.txt"));
    assert_eq!(fs::read_to_string(&existing).unwrap(), "existing");
    assert_eq!(fs::read_to_string(ws.path("dest/a_v1.txt")).unwrap(), "incoming");
    assert_eq!(outcome.describe(), "Moved to dest/a_v1.txt");
}

#[test]
fn e2e_relocation_is_idempotent() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let src = ws.write("a.txt", "alpha");
    let dest = ws.path("dest/a.txt");

    engine.relocate(&src, &dest).unwrap();
    let before = files_under(&ws.path("dest"));
    let again = engine.relocate(&src, &dest).unwrap();

    assert_eq!(again.disposition, MoveDisposition::AlreadyMoved);
    assert_eq!(files_under(&ws.path("dest")), before);
    assert_eq!(engine.log().records().unwrap().len(), 1);
}

#[test]
fn e2e_duplicates_converge() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let src = ws.write("a.txt", "same");
    let dest = ws.write("dest/a.txt", "same");

    let outcome = engine.relocate(&src, &dest).unwrap();

    assert_eq!(outcome.disposition, MoveDisposition::DuplicateRemoved);
    assert!(!src.exists());
    assert_eq!(files_under(&ws.path("dest")), vec![dest]);
}

#[test]
fn e2e_failed_move_is_recorded_and_reported() {
    let ws = Workspace::new();
    let engine = ws.engine();

    let err = engine
        .relocate(&ws.path("missing.txt"), &ws.path("dest/missing.txt"))
        .unwrap_err();

    assert_eq!(err.tag(), "SourceNotFound");
    assert!(err.source_untouched());
    let record = engine.log().records().unwrap().remove(0);
    assert_eq!(record.status, OperationStatus::Failed);
    assert!(record.error.unwrap().starts_with("[SourceNotFound]"));
}

// =============================================================================
// Crash recovery (engine dropped and reopened between steps)
// =============================================================================

#[test]
fn e2e_crash_after_intent_before_copy() {
    let ws = Workspace::new();
    let src = ws.write("a.txt", "alpha");
    let dest = ws.path("dest/a.txt");
    {
        let engine = ws.engine();
        record_intent(&engine, &src, &dest);
    }

    let summary = ws.engine().recover().unwrap();
    assert_eq!(summary.completed(), 1);
    assert_converged(&ws, &src, &dest, "alpha");
}

#[test]
fn e2e_crash_during_copy() {
    let ws = Workspace::new();
    let src = ws.write("a.txt", "alpha");
    let dest = ws.path("dest/a.txt");
    {
        let engine = ws.engine();
        record_intent(&engine, &src, &dest);
        fs::create_dir_all(ws.path("dest")).unwrap();
        fs::write(mover::temp_sibling(&dest), "al").unwrap();
    }

    let summary = ws.engine().recover().unwrap();
    assert_eq!(summary.temp_artifacts_removed, 1);
    assert_converged(&ws, &src, &dest, "alpha");
}

#[test]
fn e2e_crash_after_rename_before_delete() {
    let ws = Workspace::new();
    let src = ws.write("a.txt", "alpha");
    let dest = ws.path("dest/a.txt");
    {
        let engine = ws.engine();
        record_intent(&engine, &src, &dest);
        ws.write("dest/a.txt", "alpha");
    }

    let engine = ws.engine();
    let summary = engine.recover().unwrap();
    assert_eq!(summary.completed(), 1);
    drop(engine);
    assert_converged(&ws, &src, &dest, "alpha");
}

#[test]
fn e2e_crash_after_delete_before_complete() {
    let ws = Workspace::new();
    let src = ws.write("a.txt", "alpha");
    let dest = ws.path("dest/a.txt");
    let id = {
        let engine = ws.engine();
        let id = record_intent(&engine, &src, &dest);
        fs::create_dir_all(ws.path("dest")).unwrap();
        fs::rename(&src, &dest).unwrap();
        id
    };

    let engine = ws.engine();
    engine.recover().unwrap();
    let record = engine.log().get(id).unwrap().unwrap();
    assert_eq!(record.status, OperationStatus::Complete);
    drop(engine);
    assert_converged(&ws, &src, &dest, "alpha");
}

#[test]
fn e2e_crash_on_collision_path_never_duplicates() {
    let ws = Workspace::new();
    ws.write("dest/a.txt", "someone else's");
    let src = ws.write("a.txt", "alpha");
    let requested = ws.path("dest/a.txt");
    let effective = ws.path("dest/a_v1.txt");
    {
        let engine = ws.engine();
        let id = record_intent(&engine, &src, &requested);
        engine.log().resolve_destination(id, &effective).unwrap();
        // Renamed into place; the crash hit before the source was deleted.
        ws.write("dest/a_v1.txt", "alpha");
    }

    ws.engine().recover().unwrap();

    assert!(!src.exists());
    assert_eq!(
        files_under(&ws.path("dest")),
        vec![requested.clone(), effective.clone()]
    );
    assert_eq!(fs::read_to_string(&requested).unwrap(), "someone else's");
    assert_eq!(fs::read_to_string(&effective).unwrap(), "alpha");
}

#[test]
fn e2e_recovery_twice_is_a_no_op() {
    let ws = Workspace::new();
    let src = ws.write("a.txt", "alpha");
    {
        let engine = ws.engine();
        record_intent(&engine, &src, &ws.path("dest/a.txt"));
    }
    let engine = ws.engine();
    assert!(!engine.recover().unwrap().is_empty());
    assert!(engine.recover().unwrap().is_empty());
}

#[test]
fn e2e_ids_increase_across_reopen() {
    let ws = Workspace::new();
    let mut ids = Vec::new();
    for i in 0..3 {
        let engine = ws.engine();
        let src = ws.write(&format!("f{i}.txt"), "x");
        let outcome = engine
            .relocate(&src, &ws.path(&format!("dest/f{i}.txt")))
            .unwrap();
        ids.push(outcome.operation_id.unwrap());
    }
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "{ids:?}");
}

// =============================================================================
// Scanner and organize
// =============================================================================

#[test]
fn e2e_scan_depth_one_never_returns_grandchildren() {
    let ws = Workspace::new();
    ws.write("root/top.txt", "1");
    ws.write("root/a/child.txt", "2");
    ws.write("root/a/b/deep.txt", "3");

    let report = ws.engine().scan(&ws.path("root"), Some(1)).unwrap();

    assert_eq!(report.files.len(), 2);
    assert!(report
        .files
        .iter()
        .all(|p| !p.starts_with(ws.path("root/a/b"))));
}

#[test]
fn e2e_organize_with_configured_policy() {
    let ws = Workspace::new();
    let config_path = ws.write(
        "config.toml",
        r#"
        [scan]
        rate_limit_ms = 0

        [organize]
        worker_threads = 2

        [[policy.rules]]
        category = "coaching"
        contains = ["coaching"]

        [[policy.rules]]
        category = "code"
        extensions = ["py", "rs"]

        [policy.destinations]
        coaching = "Coaching"
        code = "Code"
        "#,
    );
    let (app_config, warnings) = config::load_config(&config_path);
    assert!(warnings.is_empty(), "{warnings:?}");
    let engine = Engine::open(EngineSettings::from_config(&app_config, ws.app_root())).unwrap();

    ws.write("inbox/coaching_notes.py", "notes");
    ws.write("inbox/tool.rs", "fn main() {}");
    ws.write("inbox/misc.bin", "bin");
    let inbox = ws.path("inbox");
    let out = ws.path("out");

    let (tx, rx) = mpsc::channel();
    let summary = engine
        .organize(&inbox, &out, &AtomicBool::new(false), Some(&tx))
        .unwrap();
    drop(tx);

    assert_eq!(summary.moved, 3);
    assert!(out.join("Coaching/coaching_notes.py").exists());
    assert!(out.join("Code/tool.rs").exists());
    assert!(out.join("other/misc.bin").exists());
    assert!(rx
        .iter()
        .any(|e| matches!(e, OrganizeProgress::Completed { .. })));

    let json_path = ws.path("history.json");
    let exported = engine
        .export_history(HistoryFormat::Json, &json_path)
        .unwrap();
    assert_eq!(exported, 3);
}

#[test]
fn e2e_report_finds_duplicates() {
    let ws = Workspace::new();
    let engine = ws.engine();
    ws.write("r/a.txt", "dup");
    ws.write("r/sub/b.txt", "dup");
    ws.write("r/c.jpg", "img");

    let scanned = engine.scan(&ws.path("r"), None).unwrap();
    let report = engine.report(&scanned.files);

    assert_eq!(report.total_files, 3);
    assert_eq!(report.by_category["document"].count, 2);
    assert_eq!(report.by_category["image"].count, 1);
    assert_eq!(report.duplicate_sets.len(), 1);
    assert_eq!(report.duplicate_sets[0].files.len(), 2);
}

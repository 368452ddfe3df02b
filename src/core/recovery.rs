// Shelver - core/recovery.rs
//
// Startup reconciliation of PENDING records left behind by an interrupted
// run. Must complete before any new relocation is scheduled.

use crate::core::journal::TransactionLog;
use crate::core::model::{OperationRecord, RecoveryResolution, RecoverySummary};
use crate::core::mover::{self, SafeMover};
use crate::util::constants;
use crate::util::error::JournalError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolve every PENDING record, oldest first, so none remains afterwards.
///
/// A move that has to be re-driven reuses its original record, so one
/// logical move never shows up twice in the history.
///
/// Only log-store failures abort the pass; a re-driven move that fails is
/// recorded as FAILED and recovery continues with the next record.
pub fn recover(mover: &SafeMover) -> Result<RecoverySummary, JournalError> {
    let log = mover.log();
    let pending = log.pending()?;
    let mut summary = RecoverySummary::default();

    if pending.is_empty() {
        tracing::debug!("No pending operations to recover");
        return Ok(summary);
    }
    tracing::info!(count = pending.len(), "Recovering pending operations");

    summary.temp_artifacts_removed = sweep_temp_artifacts(&pending);

    for record in &pending {
        let resolution = resolve(log, mover, record)?;
        tracing::info!(
            id = record.id,
            source = %record.source_path.display(),
            resolution = ?resolution,
            "Pending operation resolved"
        );
        summary.resolved.push((record.id, resolution));
    }

    tracing::info!(
        completed = summary.completed(),
        failed = summary.failed(),
        temp_removed = summary.temp_artifacts_removed,
        "Recovery finished"
    );
    Ok(summary)
}

fn resolve(
    log: &TransactionLog,
    mover: &SafeMover,
    record: &OperationRecord,
) -> Result<RecoveryResolution, JournalError> {
    let source = record.source_path.as_path();
    let source_exists = exists(source);
    let dest = record.dest_path.as_deref();
    let dest_exists = dest.is_some_and(exists);

    match dest {
        Some(_) if dest_exists && !source_exists => {
            log.complete(record.id)?;
            Ok(RecoveryResolution::MarkedComplete)
        }
        Some(dest) if source_exists => match mover.redrive(record.id, source, dest) {
            Ok(outcome) => {
                log.complete(record.id)?;
                Ok(RecoveryResolution::Redriven {
                    disposition: outcome.disposition,
                })
            }
            Err(e) => {
                let error = e.to_string();
                log.fail(record.id, &error)?;
                Ok(RecoveryResolution::RedriveFailed { error })
            }
        },
        None if source_exists => {
            let error = "no destination recorded".to_string();
            log.fail(record.id, &error)?;
            Ok(RecoveryResolution::RedriveFailed { error })
        }
        _ => {
            log.fail(record.id, constants::SOURCE_MISSING_REASON)?;
            Ok(RecoveryResolution::SourceMissing)
        }
    }
}

/// Delete temp copies in the destination directories of pending records.
/// Nothing else is running, so any such file is an interrupted copy.
fn sweep_temp_artifacts(pending: &[OperationRecord]) -> usize {
    let dirs: BTreeSet<PathBuf> = pending
        .iter()
        .filter_map(|r| r.dest_path.as_deref())
        .filter_map(Path::parent)
        .map(Path::to_path_buf)
        .collect();

    let mut removed = 0;
    for dir in dirs {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(
                    dir = %dir.display(),
                    error = %e,
                    "Cannot list destination directory"
                );
                continue;
            }
        };
        for entry in entries.filter_map(|e| e.ok()) {
            if !mover::is_temp_artifact(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(temp = %path.display(), "Removed stale temp artefact");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        temp = %path.display(),
                        error = %e,
                        "Cannot remove stale temp artefact"
                    );
                }
            }
        }
    }
    removed
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{MoveDisposition, OperationKind, OperationStatus};
    use crate::core::mover::MoverConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SafeMover) {
        let dir = tempfile::tempdir().unwrap();
        let log = TransactionLog::open(dir.path().join("LOGS/transactions.jsonl")).unwrap();
        (dir, SafeMover::new(Arc::new(log), MoverConfig::default()))
    }

    fn pending_intent(mover: &SafeMover, source: &Path, dest: &Path) -> u64 {
        let hash = mover.hasher().fingerprint(source);
        mover
            .log()
            .append(OperationKind::Move, source, Some(dest), hash.as_deref())
            .unwrap()
    }

    #[test]
    fn test_nothing_pending_is_a_no_op() {
        let (_dir, mover) = setup();
        let summary = recover(&mover).unwrap();
        assert!(summary.is_empty());
    }

    #[test]
    fn test_interrupted_between_copy_and_rename() {
        let (dir, mover) = setup();
        let src = dir.path().join("a.txt");
        let dest = dir.path().join("dest/a.txt");
        fs::write(&src, "alpha").unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        let id = pending_intent(&mover, &src, &dest);
        // Half-written temp copy left by the crash.
        let temp = mover::temp_sibling(&dest);
        fs::write(&temp, "alp").unwrap();

        let summary = recover(&mover).unwrap();

        assert_eq!(summary.temp_artifacts_removed, 1);
        assert!(!temp.exists());
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "alpha");
        assert_eq!(
            summary.resolved,
            vec![(
                id,
                RecoveryResolution::Redriven {
                    disposition: MoveDisposition::Moved
                }
            )]
        );
        assert_eq!(
            mover.log().get(id).unwrap().unwrap().status,
            OperationStatus::Complete
        );
        assert!(mover.log().pending().unwrap().is_empty());
        assert_eq!(mover.log().records().unwrap().len(), 1);
    }

    #[test]
    fn test_interrupted_between_rename_and_delete() {
        let (dir, mover) = setup();
        let src = dir.path().join("a.txt");
        let dest = dir.path().join("dest/a.txt");
        fs::write(&src, "alpha").unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "alpha").unwrap();
        let id = pending_intent(&mover, &src, &dest);

        let summary = recover(&mover).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "alpha");
        assert!(!dir.path().join("dest/a_v1.txt").exists());
        assert_eq!(
            summary.resolved,
            vec![(
                id,
                RecoveryResolution::Redriven {
                    disposition: MoveDisposition::DuplicateRemoved
                }
            )]
        );
    }

    #[test]
    fn test_oversized_file_interrupted_between_rename_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransactionLog::open(dir.path().join("LOGS/transactions.jsonl")).unwrap();
        let config = MoverConfig {
            hash_size_limit: 4,
            ..MoverConfig::default()
        };
        let mover = SafeMover::new(Arc::new(log), config);
        let src = dir.path().join("big.bin");
        let dest = dir.path().join("dest/big.bin");
        fs::write(&src, "0123456789").unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "0123456789").unwrap();
        let id = pending_intent(&mover, &src, &dest);

        let summary = recover(&mover).unwrap();

        assert!(!src.exists());
        let entries: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("big.bin")]);
        assert_eq!(
            summary.resolved,
            vec![(
                id,
                RecoveryResolution::Redriven {
                    disposition: MoveDisposition::DuplicateRemoved
                }
            )]
        );
    }

    #[test]
    fn test_interrupted_after_delete() {
        let (dir, mover) = setup();
        let src = dir.path().join("a.txt");
        let dest = dir.path().join("dest/a.txt");
        fs::write(&src, "alpha").unwrap();
        let id = pending_intent(&mover, &src, &dest);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::rename(&src, &dest).unwrap();

        let summary = recover(&mover).unwrap();
        assert_eq!(summary.resolved, vec![(id, RecoveryResolution::MarkedComplete)]);
    }

    #[test]
    fn test_resolved_destination_is_used() {
        let (dir, mover) = setup();
        let src = dir.path().join("a.txt");
        let requested = dir.path().join("dest/a.txt");
        let effective = dir.path().join("dest/a_v1.txt");
        fs::create_dir_all(requested.parent().unwrap()).unwrap();
        fs::write(&requested, "someone else").unwrap();
        fs::write(&src, "alpha").unwrap();
        fs::write(&effective, "alpha").unwrap();
        let id = pending_intent(&mover, &src, &requested);
        mover.log().resolve_destination(id, &effective).unwrap();

        recover(&mover).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&requested).unwrap(), "someone else");
        assert_eq!(fs::read_to_string(&effective).unwrap(), "alpha");
        assert!(!dir.path().join("dest/a_v2.txt").exists());
    }

    #[test]
    fn test_vanished_source_is_failed() {
        let (dir, mover) = setup();
        let src = dir.path().join("gone.txt");
        let dest = dir.path().join("dest/gone.txt");
        let id = pending_intent(&mover, &src, &dest);

        let summary = recover(&mover).unwrap();

        assert_eq!(summary.resolved, vec![(id, RecoveryResolution::SourceMissing)]);
        let record = mover.log().get(id).unwrap().unwrap();
        assert_eq!(record.status, OperationStatus::Failed);
        assert_eq!(record.error.as_deref(), Some(constants::SOURCE_MISSING_REASON));
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let (dir, mover) = setup();
        let src = dir.path().join("a.txt");
        fs::write(&src, "alpha").unwrap();
        pending_intent(&mover, &src, &dir.path().join("dest/a.txt"));
        pending_intent(&mover, &dir.path().join("x"), &dir.path().join("dest/x"));

        let first = recover(&mover).unwrap();
        assert_eq!(first.resolved.len(), 2);
        let records_after_first = mover.log().records().unwrap();

        let second = recover(&mover).unwrap();
        assert!(second.is_empty());
        assert_eq!(mover.log().records().unwrap(), records_after_first);
    }
}

// Shelver - core/model.rs
//
// Core data model types. Pure data definitions with no I/O.
//
// These types are the shared vocabulary across all layers: the transaction
// log persists `OperationRecord`, the mover returns `MoveOutcome`, recovery
// returns `RecoverySummary`, and the organizer streams `OrganizeProgress`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Operation records
// =============================================================================

/// What an operation record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Move,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Move => "MOVE",
        }
    }
}

/// Lifecycle state of an operation record.
///
/// `Pending` is the only non-terminal state. A record leaves `Pending`
/// exactly once and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Complete,
    Failed,
}

impl OperationStatus {
    /// Upper-case label, matching the serialised form.
    pub fn label(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Complete => "COMPLETE",
            OperationStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One durable entry of the transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Strictly increasing id assigned at append time.
    pub id: u64,

    /// Creation time. Informational only.
    pub timestamp: DateTime<Utc>,

    pub kind: OperationKind,

    pub source_path: PathBuf,

    /// Requested destination at append time; replaced by the effective
    /// (collision-resolved) destination before any bytes are copied.
    pub dest_path: Option<PathBuf>,

    /// SHA-256 of the source at intent time. `None` when hashing was skipped.
    pub source_hash: Option<String>,

    pub status: OperationStatus,

    /// Failure reason. Present only when `status` is `Failed`.
    pub error: Option<String>,
}

// =============================================================================
// Move outcomes
// =============================================================================

/// How a successful relocation was achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDisposition {
    /// The file was copied, renamed into place, and the source removed.
    Moved,
    /// The destination already existed and the source was gone.
    AlreadyMoved,
    /// Source and destination held identical content; the source was removed.
    DuplicateRemoved,
}

impl MoveDisposition {
    pub fn label(&self) -> &'static str {
        match self {
            MoveDisposition::Moved => "moved",
            MoveDisposition::AlreadyMoved => "already moved",
            MoveDisposition::DuplicateRemoved => "duplicate removed",
        }
    }
}

/// Successful result of a relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub disposition: MoveDisposition,

    /// Where the file now lives. For `Moved` this is the resolved
    /// destination, which may be a versioned sibling of the requested path.
    pub destination: PathBuf,

    /// Id of the operation record written for this move, if one was needed.
    pub operation_id: Option<u64>,
}

impl MoveOutcome {
    /// Short human-readable description, e.g. `Moved to Documents/a_v1.txt`.
    pub fn describe(&self) -> String {
        let shown = match (
            self.destination.parent().and_then(|p| p.file_name()),
            self.destination.file_name(),
        ) {
            (Some(dir), Some(name)) => format!(
                "{}/{}",
                dir.to_string_lossy(),
                name.to_string_lossy()
            ),
            _ => self.destination.display().to_string(),
        };
        match self.disposition {
            MoveDisposition::Moved => format!("Moved to {shown}"),
            MoveDisposition::AlreadyMoved => format!("Already moved to {shown}"),
            MoveDisposition::DuplicateRemoved => format!("Duplicate of {shown} removed"),
        }
    }
}

// =============================================================================
// Scanning and planning
// =============================================================================

/// Result of a resilient scan. Never contains directories.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Regular files in traversal order.
    pub files: Vec<PathBuf>,

    /// Non-fatal access problems encountered during the walk.
    pub warnings: Vec<String>,
}

/// A scanned file paired with its classification and planned destination.
///
/// Transient: owned by the orchestration loop for one relocation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub source: PathBuf,
    pub category: String,
    pub destination: PathBuf,
}

// =============================================================================
// Recovery
// =============================================================================

/// How recovery resolved one stale PENDING record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum RecoveryResolution {
    /// Destination present and source gone: the move had finished.
    MarkedComplete,
    /// The move was re-driven and succeeded.
    Redriven { disposition: MoveDisposition },
    /// The move was re-driven and failed.
    RedriveFailed { error: String },
    /// Neither source nor destination exists.
    SourceMissing,
}

/// Result of one recovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoverySummary {
    /// `(record id, resolution)` in the order records were resolved.
    pub resolved: Vec<(u64, RecoveryResolution)>,

    /// Temporary copy artefacts deleted from destination directories.
    pub temp_artifacts_removed: usize,
}

impl RecoverySummary {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.temp_artifacts_removed == 0
    }

    /// Records that ended COMPLETE.
    pub fn completed(&self) -> usize {
        self.resolved
            .iter()
            .filter(|(_, r)| {
                matches!(
                    r,
                    RecoveryResolution::MarkedComplete | RecoveryResolution::Redriven { .. }
                )
            })
            .count()
    }

    /// Records that ended FAILED.
    pub fn failed(&self) -> usize {
        self.resolved.len() - self.completed()
    }
}

// =============================================================================
// Organizer progress
// =============================================================================

/// Counters for one organize run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizeSummary {
    pub files_scanned: usize,
    pub moved: usize,
    pub already_moved: usize,
    pub duplicates_removed: usize,
    /// Files already sitting in their category's destination directory.
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
    #[serde(skip)]
    pub duration: Duration,
}

impl OrganizeSummary {
    pub fn record(&mut self, disposition: MoveDisposition) {
        match disposition {
            MoveDisposition::Moved => self.moved += 1,
            MoveDisposition::AlreadyMoved => self.already_moved += 1,
            MoveDisposition::DuplicateRemoved => self.duplicates_removed += 1,
        }
    }

    /// Files that reached a terminal outcome (success, skip, or failure).
    pub fn processed(&self) -> usize {
        self.moved + self.already_moved + self.duplicates_removed + self.skipped + self.failed
    }
}

/// Messages sent from the organize worker thread to its observer.
#[derive(Debug, Clone)]
pub enum OrganizeProgress {
    /// Startup recovery finished before any new work was scheduled.
    RecoveryCompleted { summary: RecoverySummary },

    /// The scan of the source root has begun.
    ScanStarted { root: PathBuf },

    /// The scan finished; `files` candidates will be classified.
    ScanCompleted { files: usize },

    /// A non-fatal problem (scan warning, unreadable entry).
    Warning { message: String },

    /// Classification finished; `total` files will be relocated.
    Planned { total: usize },

    /// One file reached its destination.
    FileMoved {
        source: PathBuf,
        category: String,
        outcome: MoveOutcome,
        completed: usize,
        total: usize,
    },

    /// A file was already in its category's destination directory.
    FileSkipped {
        source: PathBuf,
        reason: String,
        completed: usize,
        total: usize,
    },

    /// One relocation failed; the batch continues.
    FileFailed {
        source: PathBuf,
        tag: &'static str,
        error: String,
        /// False when the copy landed but the source could not be removed.
        source_untouched: bool,
        completed: usize,
        total: usize,
    },

    /// The run stopped early at a file boundary after a cancel request.
    Cancelled { summary: OrganizeSummary },

    /// The run finished.
    Completed { summary: OrganizeSummary },

    /// The run could not start (bad root, log unavailable).
    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(OperationStatus::Complete.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serialises_upper_case() {
        let json = serde_json::to_string(&OperationStatus::Complete).unwrap();
        assert_eq!(json, "\"COMPLETE\"");
        let kind = serde_json::to_string(&OperationKind::Move).unwrap();
        assert_eq!(kind, "\"MOVE\"");
    }

    #[test]
    fn test_outcome_describe_shows_parent_and_name() {
        let outcome = MoveOutcome {
            disposition: MoveDisposition::Moved,
            destination: PathBuf::from("/home/u/Documents/a_v1.txt"),
            operation_id: Some(3),
        };
        assert_eq!(outcome.describe(), "Moved to Documents/a_v1.txt");
    }

    #[test]
    fn test_recovery_summary_counts() {
        let summary = RecoverySummary {
            resolved: vec![
                (1, RecoveryResolution::MarkedComplete),
                (
                    2,
                    RecoveryResolution::Redriven {
                        disposition: MoveDisposition::Moved,
                    },
                ),
                (3, RecoveryResolution::SourceMissing),
                (
                    4,
                    RecoveryResolution::RedriveFailed {
                        error: "boom".to_string(),
                    },
                ),
            ],
            temp_artifacts_removed: 0,
        };
        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.failed(), 2);
        assert!(!summary.is_empty());
    }

    #[test]
    fn test_organize_summary_processed() {
        let mut s = OrganizeSummary::default();
        s.record(MoveDisposition::Moved);
        s.record(MoveDisposition::DuplicateRemoved);
        s.skipped += 1;
        s.failed += 1;
        assert_eq!(s.processed(), 4);
        assert_eq!(s.moved, 1);
    }
}

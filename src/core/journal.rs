// Shelver - core/journal.rs
//
// Durable, append-only transaction log of relocation intents and outcomes.
//
// On-disk format: JSON Lines. Every state change is a new event line
// (`intent`, `resolved`, `complete`, `failed`); an operation record is the
// fold of its events. Nothing is ever rewritten or deleted, so a crash can
// at worst leave a torn final line, which replay skips.
//
// Each append is written with a single `write_all` on an O_APPEND handle and
// followed by `sync_data` before the call returns. All mutations are
// serialised under one mutex that also guards the in-memory index.

use crate::core::model::{OperationKind, OperationRecord, OperationStatus};
use crate::platform;
use crate::util::error::JournalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// =============================================================================
// On-disk events
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogEvent {
    Intent {
        id: u64,
        timestamp: DateTime<Utc>,
        kind: OperationKind,
        source_path: PathBuf,
        dest_path: Option<PathBuf>,
        source_hash: Option<String>,
    },
    Resolved {
        id: u64,
        dest_path: PathBuf,
    },
    Complete {
        id: u64,
        at: DateTime<Utc>,
    },
    Failed {
        id: u64,
        at: DateTime<Utc>,
        error: String,
    },
}

impl LogEvent {
    fn id(&self) -> u64 {
        match self {
            LogEvent::Intent { id, .. }
            | LogEvent::Resolved { id, .. }
            | LogEvent::Complete { id, .. }
            | LogEvent::Failed { id, .. } => *id,
        }
    }
}

/// What applying an event to the index would do.
enum Transition {
    /// The event changes the record.
    Apply,
    /// The record is already in the requested state.
    NoOp,
}

// =============================================================================
// TransactionLog
// =============================================================================

struct Store {
    file: File,
    records: BTreeMap<u64, OperationRecord>,
    next_id: u64,
    /// A failed write may have left a partial line; the next event must
    /// start on a fresh one.
    needs_newline: bool,
}

/// The transaction log. Share it between threads with `Arc`.
pub struct TransactionLog {
    path: PathBuf,
    store: Mutex<Store>,
}

impl std::fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLog")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl TransactionLog {
    /// Open (or create) the log at `path` and replay its history.
    ///
    /// Creates the parent directory on first use. Unreadable lines and events
    /// that contradict earlier history are skipped with a warning so that one
    /// damaged line never hides the rest of the log.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let io_err = |operation: &'static str, path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| JournalError::Io {
                path,
                operation,
                source,
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err("create directory for", &path))?;
        }

        let existing = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_err("read", &path)(e)),
        };
        let records = replay(&path, &existing);

        let created = existing.is_empty() && !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err("open", &path))?;

        if created {
            if let Some(parent) = path.parent() {
                platform::fs::sync_dir(parent);
            }
        }

        // Isolate a torn trailing fragment so the next event starts on a
        // fresh line.
        if !existing.is_empty() && !existing.ends_with(b"\n") {
            tracing::warn!(path = %path.display(), "Transaction log ends with a partial line");
            file.write_all(b"\n")
                .and_then(|()| file.sync_data())
                .map_err(io_err("repair", &path))?;
        }

        let next_id = records.keys().next_back().map_or(1, |last| last + 1);
        let pending = records
            .values()
            .filter(|r| r.status == OperationStatus::Pending)
            .count();

        tracing::info!(
            path = %path.display(),
            records = records.len(),
            pending,
            next_id,
            "Transaction log opened"
        );

        Ok(Self {
            path,
            store: Mutex::new(Store {
                file,
                records,
                next_id,
                needs_newline: false,
            }),
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a new PENDING intent and return its id.
    ///
    /// The intent is on stable storage when this returns, so a crash right
    /// after still leaves it for recovery to find.
    pub fn append(
        &self,
        kind: OperationKind,
        source: &Path,
        dest: Option<&Path>,
        source_hash: Option<&str>,
    ) -> Result<u64, JournalError> {
        let mut store = self.lock()?;
        let id = store.next_id;
        // Consumed even if the write fails: the line may still have landed.
        store.next_id += 1;
        let record = OperationRecord {
            id,
            timestamp: Utc::now(),
            kind,
            source_path: source.to_path_buf(),
            dest_path: dest.map(Path::to_path_buf),
            source_hash: source_hash.map(str::to_string),
            status: OperationStatus::Pending,
            error: None,
        };

        self.write_event(
            &mut store,
            &LogEvent::Intent {
                id,
                timestamp: record.timestamp,
                kind,
                source_path: record.source_path.clone(),
                dest_path: record.dest_path.clone(),
                source_hash: record.source_hash.clone(),
            },
        )?;

        store.records.insert(id, record);

        tracing::debug!(
            id,
            kind = kind.label(),
            source = %source.display(),
            dest = ?dest.map(|d| d.display().to_string()),
            "Intent recorded"
        );
        Ok(id)
    }

    /// Replace the destination of a PENDING record with the effective one.
    pub fn resolve_destination(&self, id: u64, dest: &Path) -> Result<(), JournalError> {
        let mut store = self.lock()?;
        let record = lookup(&store, id)?;
        if record.status.is_terminal() {
            return Err(JournalError::TerminalState {
                id,
                status: record.status.label(),
                attempted: "re-targeted",
            });
        }
        if record.dest_path.as_deref() == Some(dest) {
            return Ok(());
        }

        self.write_event(
            &mut store,
            &LogEvent::Resolved {
                id,
                dest_path: dest.to_path_buf(),
            },
        )?;
        if let Some(record) = store.records.get_mut(&id) {
            record.dest_path = Some(dest.to_path_buf());
        }
        tracing::debug!(id, dest = %dest.display(), "Destination resolved");
        Ok(())
    }

    /// Mark a record COMPLETE. Idempotent; rejects FAILED records.
    pub fn complete(&self, id: u64) -> Result<(), JournalError> {
        let mut store = self.lock()?;
        let record = lookup(&store, id)?;
        match transition(record, OperationStatus::Complete)? {
            Transition::NoOp => return Ok(()),
            Transition::Apply => {}
        }

        self.write_event(&mut store, &LogEvent::Complete { id, at: Utc::now() })?;
        if let Some(record) = store.records.get_mut(&id) {
            record.status = OperationStatus::Complete;
        }
        tracing::debug!(id, "Operation complete");
        Ok(())
    }

    /// Mark a record FAILED with `reason`. Idempotent; rejects COMPLETE records.
    pub fn fail(&self, id: u64, reason: &str) -> Result<(), JournalError> {
        let mut store = self.lock()?;
        let record = lookup(&store, id)?;
        match transition(record, OperationStatus::Failed)? {
            Transition::NoOp => return Ok(()),
            Transition::Apply => {}
        }

        self.write_event(
            &mut store,
            &LogEvent::Failed {
                id,
                at: Utc::now(),
                error: reason.to_string(),
            },
        )?;
        if let Some(record) = store.records.get_mut(&id) {
            record.status = OperationStatus::Failed;
            record.error = Some(reason.to_string());
        }
        tracing::debug!(id, reason, "Operation failed");
        Ok(())
    }

    /// All PENDING records, oldest first.
    pub fn pending(&self) -> Result<Vec<OperationRecord>, JournalError> {
        let store = self.lock()?;
        Ok(store
            .records
            .values()
            .filter(|r| r.status == OperationStatus::Pending)
            .cloned()
            .collect())
    }

    /// Full history, ordered by id.
    pub fn records(&self) -> Result<Vec<OperationRecord>, JournalError> {
        let store = self.lock()?;
        Ok(store.records.values().cloned().collect())
    }

    pub fn get(&self, id: u64) -> Result<Option<OperationRecord>, JournalError> {
        let store = self.lock()?;
        Ok(store.records.get(&id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>, JournalError> {
        self.store.lock().map_err(|_| JournalError::LockPoisoned)
    }

    fn write_event(&self, store: &mut Store, event: &LogEvent) -> Result<(), JournalError> {
        let body =
            serde_json::to_vec(event).map_err(|source| JournalError::Serialize { source })?;
        let mut line = Vec::with_capacity(body.len() + 2);
        if store.needs_newline {
            line.push(b'\n');
        }
        line.extend_from_slice(&body);
        line.push(b'\n');

        match store
            .file
            .write_all(&line)
            .and_then(|()| store.file.sync_data())
        {
            Ok(()) => {
                store.needs_newline = false;
                Ok(())
            }
            Err(source) => {
                store.needs_newline = true;
                tracing::warn!(
                    path = %self.path.display(),
                    id = event.id(),
                    error = %source,
                    "Transaction log write failed"
                );
                Err(JournalError::Io {
                    path: self.path.clone(),
                    operation: "append to",
                    source,
                })
            }
        }
    }
}

// =============================================================================
// Replay and transition rules
// =============================================================================

fn lookup(store: &Store, id: u64) -> Result<&OperationRecord, JournalError> {
    store.records.get(&id).ok_or(JournalError::UnknownId { id })
}

/// Validate moving `record` to the terminal state `target`.
fn transition(
    record: &OperationRecord,
    target: OperationStatus,
) -> Result<Transition, JournalError> {
    match record.status {
        OperationStatus::Pending => Ok(Transition::Apply),
        current if current == target => Ok(Transition::NoOp),
        current => Err(JournalError::TerminalState {
            id: record.id,
            status: current.label(),
            attempted: target.label(),
        }),
    }
}

/// Fold the event lines in `bytes` into records.
fn replay(path: &Path, bytes: &[u8]) -> BTreeMap<u64, OperationRecord> {
    let mut records: BTreeMap<u64, OperationRecord> = BTreeMap::new();

    for (index, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let line_number = index + 1;
        let event: LogEvent = match serde_json::from_slice(line) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_number,
                    error = %e,
                    "Skipping unreadable transaction log line"
                );
                continue;
            }
        };
        if let Err(reason) = apply_event(&mut records, event) {
            tracing::warn!(
                path = %path.display(),
                line = line_number,
                reason = %reason,
                "Skipping inconsistent transaction log event"
            );
        }
    }
    records
}

fn apply_event(
    records: &mut BTreeMap<u64, OperationRecord>,
    event: LogEvent,
) -> Result<(), String> {
    let id = event.id();
    match event {
        LogEvent::Intent {
            id,
            timestamp,
            kind,
            source_path,
            dest_path,
            source_hash,
        } => {
            if records.contains_key(&id) {
                return Err(format!("duplicate intent for id {id}"));
            }
            if records.keys().next_back().is_some_and(|last| *last > id) {
                return Err(format!("intent id {id} is not increasing"));
            }
            records.insert(
                id,
                OperationRecord {
                    id,
                    timestamp,
                    kind,
                    source_path,
                    dest_path,
                    source_hash,
                    status: OperationStatus::Pending,
                    error: None,
                },
            );
        }
        LogEvent::Resolved { dest_path, .. } => {
            let record = records
                .get_mut(&id)
                .ok_or_else(|| format!("unknown id {id}"))?;
            if record.status.is_terminal() {
                return Err(format!("id {id} re-targeted after {}", record.status));
            }
            record.dest_path = Some(dest_path);
        }
        LogEvent::Complete { .. } => {
            let record = records
                .get_mut(&id)
                .ok_or_else(|| format!("unknown id {id}"))?;
            if let Transition::Apply =
                transition(record, OperationStatus::Complete).map_err(|e| e.to_string())?
            {
                record.status = OperationStatus::Complete;
            }
        }
        LogEvent::Failed { error, .. } => {
            let record = records
                .get_mut(&id)
                .ok_or_else(|| format!("unknown id {id}"))?;
            if let Transition::Apply =
                transition(record, OperationStatus::Failed).map_err(|e| e.to_string())?
            {
                record.status = OperationStatus::Failed;
                record.error = Some(error);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

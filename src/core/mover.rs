// Shelver - core/mover.rs
//
// Crash-safe relocation of a single file.
//
// Order of durable sub-steps for one move:
//   1. fingerprint the source (skipped for empty / oversized files)
//   2. append a PENDING intent to the transaction log
//   3. validate the source
//   4. pick a non-clobbering destination and record it in the log
//   5. copy into a hidden temp sibling of the destination and fsync it
//   6. atomically rename the temp onto the destination
//   7. delete the source
//
// Before step 6 the only artefact is a temp file that recovery sweeps; after
// it the destination is complete. The source is removed last, so there is
// never a moment when neither copy exists.

use crate::core::hasher::{self, ContentHasher};
use crate::core::journal::TransactionLog;
use crate::core::model::{MoveDisposition, MoveOutcome, OperationKind};
use crate::platform;
use crate::util::constants;
use crate::util::error::MoveError;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for the safe mover.
#[derive(Debug, Clone)]
pub struct MoverConfig {
    /// Files above this size are moved without a fingerprint.
    pub hash_size_limit: u64,

    /// Versioned names (`_v1`, `_v2`, ...) tried before the timestamp fallback.
    pub max_collision_attempts: u32,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            hash_size_limit: constants::DEFAULT_HASH_SIZE_LIMIT,
            max_collision_attempts: constants::DEFAULT_MAX_COLLISION_ATTEMPTS,
        }
    }
}

// =============================================================================
// SafeMover
// =============================================================================

/// Moves files under the protection of a transaction log.
///
/// Safe to share between worker threads: the log serialises its own writes
/// and destination names are reserved under a separate lock so two
/// concurrent moves can never pick the same effective destination.
#[derive(Debug)]
pub struct SafeMover {
    log: Arc<TransactionLog>,
    hasher: ContentHasher,
    max_collision_attempts: u32,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl SafeMover {
    pub fn new(log: Arc<TransactionLog>, config: MoverConfig) -> Self {
        Self {
            log,
            hasher: ContentHasher::new(config.hash_size_limit),
            max_collision_attempts: config
                .max_collision_attempts
                .min(constants::ABSOLUTE_MAX_COLLISION_ATTEMPTS),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }

    pub fn hasher(&self) -> &ContentHasher {
        &self.hasher
    }

    /// Relocate `source` to `dest`, safe to call any number of times.
    ///
    /// - destination present, source gone: reported as already moved
    /// - both present with identical content: the stale source is deleted
    /// - anything else: a full logged move, where an occupied destination
    ///   with different content leads to a versioned sibling name
    ///
    /// The first two cases do not write to the transaction log.
    pub fn idempotent_move(&self, source: &Path, dest: &Path) -> Result<MoveOutcome, MoveError> {
        match self.settled(source, dest)? {
            Some(outcome) => Ok(outcome),
            None => self.atomic_move(source, dest),
        }
    }

    /// Finish the move recorded as PENDING under `id`, reusing that record
    /// instead of appending a new one. The caller closes the record.
    pub fn redrive(&self, id: u64, source: &Path, dest: &Path) -> Result<MoveOutcome, MoveError> {
        if let Some(outcome) = self.settled(source, dest)? {
            return Ok(MoveOutcome {
                operation_id: Some(id),
                ..outcome
            });
        }
        let destination = self.execute(id, source, dest)?;
        tracing::info!(
            id,
            source = %source.display(),
            dest = %destination.display(),
            "Interrupted move finished"
        );
        Ok(MoveOutcome {
            disposition: MoveDisposition::Moved,
            destination,
            operation_id: Some(id),
        })
    }

    /// The no-log cases of `idempotent_move`: `Some` when nothing is left to
    /// copy.
    fn settled(&self, source: &Path, dest: &Path) -> Result<Option<MoveOutcome>, MoveError> {
        let source_exists = path_exists(source);
        let dest_exists = path_exists(dest);

        if dest_exists && !source_exists {
            tracing::info!(
                source = %source.display(),
                dest = %dest.display(),
                "Already moved"
            );
            return Ok(Some(MoveOutcome {
                disposition: MoveDisposition::AlreadyMoved,
                destination: dest.to_path_buf(),
                operation_id: None,
            }));
        }

        if dest_exists && source_exists {
            if same_file(source, dest) {
                tracing::debug!(path = %source.display(), "Source is already the destination");
                return Ok(Some(MoveOutcome {
                    disposition: MoveDisposition::AlreadyMoved,
                    destination: dest.to_path_buf(),
                    operation_id: None,
                }));
            }

            if self.contents_match(source, dest) {
                fs::remove_file(source).map_err(|e| MoveError::DuplicateCleanupFailed {
                    path: source.to_path_buf(),
                    source: e,
                })?;
                if let Some(parent) = source.parent() {
                    platform::fs::sync_dir(parent);
                }
                tracing::info!(
                    source = %source.display(),
                    dest = %dest.display(),
                    "Duplicate source removed"
                );
                return Ok(Some(MoveOutcome {
                    disposition: MoveDisposition::DuplicateRemoved,
                    destination: dest.to_path_buf(),
                    operation_id: None,
                }));
            }
        }

        Ok(None)
    }

    /// Relocate `source` to `dest` through the full logged protocol.
    ///
    /// Returns the effective destination, which differs from `dest` when the
    /// requested name was already taken.
    pub fn atomic_move(&self, source: &Path, dest: &Path) -> Result<MoveOutcome, MoveError> {
        let source_hash = self.hasher.fingerprint(source);

        // Nothing touches the filesystem until the intent is durable.
        let id = self.log.append(
            OperationKind::Move,
            source,
            Some(dest),
            source_hash.as_deref(),
        )?;

        match self.execute(id, source, dest) {
            Ok(destination) => {
                if let Err(e) = self.log.complete(id) {
                    // The file is safely in place; recovery will close the record.
                    tracing::error!(
                        id,
                        error = %e,
                        "Move finished but its record could not be completed"
                    );
                }
                tracing::info!(
                    id,
                    source = %source.display(),
                    dest = %destination.display(),
                    "File moved"
                );
                Ok(MoveOutcome {
                    disposition: MoveDisposition::Moved,
                    destination,
                    operation_id: Some(id),
                })
            }
            Err(e) => {
                if let Err(log_err) = self.log.fail(id, &e.to_string()) {
                    tracing::error!(id, error = %log_err, "Cannot record move failure");
                }
                tracing::warn!(
                    id,
                    source = %source.display(),
                    dest = %dest.display(),
                    tag = e.tag(),
                    error = %e,
                    "Move failed"
                );
                Err(e)
            }
        }
    }

    /// Steps 3-7. Any error leaves the source in place unless the rename
    /// already landed.
    fn execute(&self, id: u64, source: &Path, dest: &Path) -> Result<PathBuf, MoveError> {
        match fs::symlink_metadata(source) {
            Ok(meta) if meta.file_type().is_file() => {}
            Ok(_) => {
                return Err(MoveError::SourceNotRegularFile {
                    path: source.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MoveError::SourceNotFound {
                    path: source.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(MoveError::CopyFailed {
                    from: source.to_path_buf(),
                    to: dest.to_path_buf(),
                    source: e,
                })
            }
        }

        let parent = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty() && dest.file_name().is_some())
            .ok_or_else(|| MoveError::DestinationUnwritable {
                path: dest.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "destination has no parent directory or file name",
                ),
            })?;
        fs::create_dir_all(parent).map_err(|e| MoveError::DestinationUnwritable {
            path: parent.to_path_buf(),
            source: e,
        })?;

        let reservation = self.reserve_destination(dest);
        let target = reservation.path().to_path_buf();
        if target != dest {
            tracing::debug!(
                id,
                requested = %dest.display(),
                resolved = %target.display(),
                "Destination occupied; using versioned name"
            );
        }
        self.log.resolve_destination(id, &target)?;

        let temp = temp_sibling(&target);
        if let Err(e) = platform::fs::copy_durably(source, &temp) {
            remove_temp(&temp);
            return Err(MoveError::CopyFailed {
                from: source.to_path_buf(),
                to: temp,
                source: e,
            });
        }

        if let Err(e) = fs::rename(&temp, &target) {
            remove_temp(&temp);
            return Err(MoveError::RenameFailed {
                from: temp,
                to: target,
                source: e,
            });
        }
        platform::fs::sync_dir(parent);
        drop(reservation);

        fs::remove_file(source).map_err(|e| MoveError::SourceRemovalFailed {
            path: source.to_path_buf(),
            destination: target.clone(),
            source: e,
        })?;
        if let Some(source_dir) = source.parent() {
            platform::fs::sync_dir(source_dir);
        }

        Ok(target)
    }

    /// Identical content: both empty, equal fingerprints, or (above the
    /// hashing ceiling) equal bytes.
    fn contents_match(&self, a: &Path, b: &Path) -> bool {
        let (Ok(meta_a), Ok(meta_b)) = (fs::metadata(a), fs::metadata(b)) else {
            return false;
        };
        if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
            return false;
        }
        if meta_a.len() == 0 {
            return true;
        }
        if meta_a.len() > self.hasher.size_limit() {
            return match hasher::identical_bytes(a, b) {
                Ok(same) => same,
                Err(e) => {
                    tracing::debug!(error = %e, "Byte comparison unavailable");
                    false
                }
            };
        }
        match (self.hasher.fingerprint(a), self.hasher.fingerprint(b)) {
            (Some(hash_a), Some(hash_b)) => hash_a == hash_b,
            _ => false,
        }
    }

    fn reserve_destination(&self, requested: &Path) -> Reservation<'_> {
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        let chosen = unique_destination(requested, self.max_collision_attempts, |p| {
            reserved.contains(p) || path_exists(p)
        });
        reserved.insert(chosen.clone());
        Reservation {
            set: &self.reserved,
            path: chosen,
        }
    }
}

/// A destination name claimed by an in-flight move. Released on drop.
struct Reservation<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Reservation<'_> {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

// =============================================================================
// Naming helpers
// =============================================================================

/// First free name for `path`: the path itself, then `<stem>_v1<.ext>` up to
/// `<stem>_v{max_attempts}<.ext>`, then `<stem>_<YYYYmmdd_HHMMSS><.ext>`.
pub fn unique_destination(
    path: &Path,
    max_attempts: u32,
    is_taken: impl Fn(&Path) -> bool,
) -> PathBuf {
    if !is_taken(path) {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let named = |suffix: &str| {
        let name = match &ext {
            Some(ext) => format!("{stem}_{suffix}.{ext}"),
            None => format!("{stem}_{suffix}"),
        };
        parent.join(name)
    };

    for n in 1..=max_attempts {
        let candidate = named(&format!("v{n}"));
        if !is_taken(&candidate) {
            return candidate;
        }
    }

    let stamp = chrono::Local::now()
        .format(constants::COLLISION_TIMESTAMP_FORMAT)
        .to_string();
    let candidate = named(&stamp);
    if !is_taken(&candidate) {
        return candidate;
    }
    loop {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let candidate = named(&format!("{stamp}_{}", &token[..8]));
        if !is_taken(&candidate) {
            return candidate;
        }
    }
}

/// Hidden, uniquely named temp file in the same directory as `target`.
pub fn temp_sibling(target: &Path) -> PathBuf {
    let name = format!(
        "{}{}{}",
        constants::TEMP_FILE_PREFIX,
        uuid::Uuid::new_v4().simple(),
        constants::TEMP_FILE_SUFFIX
    );
    match target.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// True for file names produced by `temp_sibling`.
pub fn is_temp_artifact(file_name: &str) -> bool {
    file_name.starts_with(constants::TEMP_FILE_PREFIX)
        && file_name.ends_with(constants::TEMP_FILE_SUFFIX)
}

fn remove_temp(temp: &Path) {
    match fs::remove_file(temp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(temp = %temp.display(), error = %e, "Cannot remove temp artefact");
        }
    }
}

/// Existence check that also sees dangling symlinks.
fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// =============================================================================
// Tests
// =============================================================================

// Shelver - core/scanner.rs
//
// Best-effort recursive listing of regular files under a root.
//
// Access problems never abort a scan: per-entry errors are collected as
// warnings, transient permission errors on a file are retried with
// exponential backoff, and a root that cannot be read yields an empty result.
// Hidden entries and excluded directory names are pruned via `filter_entry`
// so their subtrees are never traversed.

use crate::core::model::ScanReport;
use crate::util::constants;
use crate::util::error::ScanError;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Retry policy
// =============================================================================

/// Bounded retry with exponential backoff for transient permission errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubled for each further one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op`, retrying only while it fails with `PermissionDenied`.
    pub fn run<T>(&self, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Err(e)
                    if e.kind() == io::ErrorKind::PermissionDenied && attempt + 1 < attempts =>
                {
                    let delay = self.delay_for(attempt);
                    tracing::trace!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Permission denied; retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_SCAN_MAX_RETRIES,
            base_delay: Duration::from_millis(constants::DEFAULT_RETRY_BASE_MS),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a scan.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory levels below the root to include. Files directly in the
    /// root are level 0; deeper directories are never descended.
    pub max_depth: usize,

    pub retry: RetryPolicy,

    /// Pause after each accepted file so large trees do not saturate the disk.
    pub rate_limit: Duration,

    /// Directory names never descended (exact, case-sensitive match).
    pub exclude_dirs: Vec<String>,

    /// Checked on every walker iteration; a set flag ends the scan early with
    /// partial results.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: constants::DEFAULT_MAX_DEPTH,
            retry: RetryPolicy::default(),
            rate_limit: Duration::from_millis(constants::DEFAULT_SCAN_RATE_LIMIT_MS),
            exclude_dirs: vec![constants::LOG_DIR_NAME.to_string()],
            cancel_flag: None,
        }
    }
}

// =============================================================================
// Scan
// =============================================================================

/// List regular files under `root`, in traversal order.
///
/// Returns `Err` only when `root` does not exist or is not a directory.
/// Symlinks are not followed and are not reported as files.
pub fn scan(root: &Path, config: &ScanConfig) -> Result<ScanReport, ScanError> {
    let mut report = ScanReport::default();

    // `fs::metadata` rather than `Path::is_dir` so access-denied is told
    // apart from not-found.
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            let msg = format!("Cannot access scan root '{}': {e}", root.display());
            tracing::warn!(root = %root.display(), error = %e, "Scan root not accessible");
            report.warnings.push(msg);
            return Ok(report);
        }
        Err(_) => {
            return Err(ScanError::RootNotFound {
                path: root.to_path_buf(),
            })
        }
    }

    let max_depth = config.max_depth.min(constants::ABSOLUTE_MAX_DEPTH);
    tracing::debug!(
        root = %root.display(),
        max_depth,
        exclude = ?config.exclude_dirs,
        "Scan starting"
    );

    // A directory at walker depth d holds files of level d, which sit at
    // walker depth d + 1.
    let walker = walkdir::WalkDir::new(root)
        .max_depth(max_depth + 1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if name.starts_with(constants::HIDDEN_PREFIX) {
                return false;
            }
            if e.file_type().is_dir() {
                return !config.exclude_dirs.iter().any(|x| x.as_str() == name.as_ref());
            }
            true
        });

    for entry_result in walker {
        if config
            .cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            tracing::debug!("Scan cancelled by request");
            break;
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                let msg = format!("Cannot access '{path_str}': {e}");
                tracing::warn!(warning = %msg, "Scan warning");
                report.warnings.push(msg);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            if entry.file_type().is_symlink() {
                tracing::trace!(path = %entry.path().display(), "Symlink skipped");
            }
            continue;
        }

        let path = entry.path();
        let checked = config.retry.run(|| std::fs::metadata(path));

        // Every file check is paced, including the ones that fail.
        if !config.rate_limit.is_zero() {
            std::thread::sleep(config.rate_limit);
        }

        match checked {
            Ok(meta) if meta.is_file() => report.files.push(path.to_path_buf()),
            Ok(_) => {}
            Err(e) => {
                let msg = format!("Cannot read metadata for '{}': {e}", path.display());
                tracing::warn!(warning = %msg, "Scan warning");
                report.warnings.push(msg);
            }
        }
    }

    tracing::debug!(
        files = report.files.len(),
        warnings = report.warnings.len(),
        "Scan complete"
    );
    Ok(report)
}

// =============================================================================
// Tests
// =============================================================================

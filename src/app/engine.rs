// Shelver - app/engine.rs
//
// Caller-facing facade. Owns the transaction log (via the safe mover), the
// classifier, and the scan settings, and exposes every operation the CLI
// offers. Shareable across threads behind an `Arc`.

use crate::app::organize::{self, Plan};
use crate::core::classifier::{Classifier, RoutingPolicy};
use crate::core::export;
use crate::core::hasher::ContentHasher;
use crate::core::journal::TransactionLog;
use crate::core::model::{
    MoveOutcome, OrganizeProgress, OrganizeSummary, RecoverySummary, ScanReport,
};
use crate::core::mover::{MoverConfig, SafeMover};
use crate::core::recovery;
use crate::core::report::{self, AnalysisReport};
use crate::core::scanner::{self, RetryPolicy, ScanConfig};
use crate::platform::config::AppConfig;
use crate::util::constants;
use crate::util::error::{MoveError, Result, ShelverError};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Location of the transaction log under `app_root`.
pub fn transaction_log_path(app_root: &Path) -> PathBuf {
    app_root
        .join(constants::LOG_DIR_NAME)
        .join(constants::TRANSACTION_LOG_FILE_NAME)
}

/// Output format for `Engine::export_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFormat {
    Csv,
    Json,
}

impl HistoryFormat {
    /// Format implied by a file extension; JSON unless it ends in `.csv`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => HistoryFormat::Csv,
            _ => HistoryFormat::Json,
        }
    }
}

/// Everything needed to open an `Engine`.
#[derive(Clone)]
pub struct EngineSettings {
    /// Directory holding `LOGS/transactions.jsonl`.
    pub app_root: PathBuf,
    pub scan: ScanConfig,
    pub mover: MoverConfig,
    /// Move-phase workers for organize; 0 = one per core.
    pub worker_threads: usize,
    pub classifier: Arc<dyn Classifier>,
}

impl EngineSettings {
    /// Built-in defaults rooted at `app_root`.
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            scan: ScanConfig::default(),
            mover: MoverConfig::default(),
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            classifier: Arc::new(RoutingPolicy::builtin()),
        }
    }

    /// Settings from a validated config file. `app_root` wins over the
    /// config's own `[storage] app_root`.
    pub fn from_config(config: &AppConfig, app_root: impl Into<PathBuf>) -> Self {
        let scan = ScanConfig {
            max_depth: config.max_depth,
            retry: RetryPolicy {
                max_attempts: config.max_retries,
                base_delay: Duration::from_millis(config.retry_base_ms),
            },
            rate_limit: Duration::from_millis(config.rate_limit_ms),
            ..ScanConfig::default()
        };
        Self {
            app_root: app_root.into(),
            scan,
            mover: MoverConfig {
                hash_size_limit: config.hash_size_limit,
                max_collision_attempts: config.max_collision_attempts,
            },
            worker_threads: config.worker_threads,
            classifier: Arc::new(config.policy.clone()),
        }
    }
}

/// The relocation engine.
pub struct Engine {
    app_root: PathBuf,
    mover: SafeMover,
    classifier: Arc<dyn Classifier>,
    scan_config: ScanConfig,
    worker_threads: usize,
}

impl Engine {
    /// Open (or create) the transaction log under the app root.
    ///
    /// Does not run recovery; callers run `recover` before scheduling moves
    /// (`organize` does so itself).
    pub fn open(settings: EngineSettings) -> Result<Self> {
        let log_path = transaction_log_path(&settings.app_root);
        let log = TransactionLog::open(&log_path)?;
        tracing::info!(
            app_root = %settings.app_root.display(),
            log = %log_path.display(),
            "Engine opened"
        );
        Ok(Self {
            app_root: settings.app_root,
            mover: SafeMover::new(Arc::new(log), settings.mover),
            classifier: settings.classifier,
            scan_config: settings.scan,
            worker_threads: settings.worker_threads,
        })
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn log(&self) -> &TransactionLog {
        self.mover.log()
    }

    pub fn mover(&self) -> &SafeMover {
        &self.mover
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn scan_config(&self) -> &ScanConfig {
        &self.scan_config
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// List regular files under `root`. `max_depth` overrides the configured
    /// depth.
    pub fn scan(&self, root: &Path, max_depth: Option<usize>) -> Result<ScanReport> {
        let mut config = self.scan_config.clone();
        if let Some(depth) = max_depth {
            config.max_depth = depth;
        }
        Ok(scanner::scan(root, &config)?)
    }

    /// Category label for `path`.
    pub fn classify(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.classifier.classify(path, &name)
    }

    /// Idempotent relocation of one file.
    pub fn relocate(
        &self,
        source: &Path,
        dest: &Path,
    ) -> std::result::Result<MoveOutcome, MoveError> {
        self.mover.idempotent_move(source, dest)
    }

    /// Resolve all PENDING records left by an interrupted run.
    pub fn recover(&self) -> Result<RecoverySummary> {
        Ok(recovery::recover(&self.mover)?)
    }

    /// Scan `root` and route every file under `dest_root` without moving
    /// anything.
    pub fn plan(&self, root: &Path, dest_root: &Path) -> Result<Plan> {
        let report = self.scan(root, None)?;
        Ok(organize::build_plan(report, self.classifier(), dest_root))
    }

    /// Recover, scan, plan, and relocate. Blocks until the run ends.
    ///
    /// `cancel` is checked between files; progress events are sent to
    /// `progress` when given.
    pub fn organize(
        &self,
        root: &Path,
        dest_root: &Path,
        cancel: &AtomicBool,
        progress: Option<&mpsc::Sender<OrganizeProgress>>,
    ) -> Result<OrganizeSummary> {
        organize::run_organize(self, root, dest_root, cancel, progress)
    }

    /// Category, size, and duplicate analysis of `files`.
    pub fn report(&self, files: &[PathBuf]) -> AnalysisReport {
        report::analyze(files, self.classifier(), self.mover.hasher())
    }

    /// Content fingerprint of one file; `None` when empty or above the ceiling.
    pub fn fingerprint(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.mover.hasher().try_fingerprint(path)?)
    }

    pub fn hasher(&self) -> &ContentHasher {
        self.mover.hasher()
    }

    /// Write the full operation history to `out`, atomically (temp + rename).
    /// Returns the number of records written.
    pub fn export_history(&self, format: HistoryFormat, out: &Path) -> Result<usize> {
        let records = self.log().records()?;

        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ShelverError::Io {
                path: parent.to_path_buf(),
                operation: "create export directory",
                source: e,
            })?;
        }

        let tmp = out.with_extension("export.tmp");
        let file = std::fs::File::create(&tmp).map_err(|e| ShelverError::Io {
            path: tmp.clone(),
            operation: "create export file",
            source: e,
        })?;
        let writer = std::io::BufWriter::new(file);

        let written = match format {
            HistoryFormat::Csv => export::export_csv(&records, writer, out),
            HistoryFormat::Json => export::export_json(&records, writer, out),
        };
        let count = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                return Err(e.into());
            }
        };

        std::fs::rename(&tmp, out).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            ShelverError::Io {
                path: out.to_path_buf(),
                operation: "finalise export file",
                source: e,
            }
        })?;

        tracing::info!(path = %out.display(), records = count, "History exported");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::OperationStatus;
    use std::fs;

    fn fast_settings(app_root: &Path) -> EngineSettings {
        let mut settings = EngineSettings::new(app_root);
        settings.scan.rate_limit = Duration::ZERO;
        settings.scan.retry.base_delay = Duration::ZERO;
        settings
    }

    #[test]
    fn test_open_creates_log_under_app_root() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(fast_settings(dir.path())).unwrap();
        assert_eq!(engine.log().path(), transaction_log_path(dir.path()));
        assert!(dir.path().join("LOGS").is_dir());
    }

    #[test]
    fn test_relocate_and_history_export() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(fast_settings(&dir.path().join("app"))).unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "alpha").unwrap();

        let outcome = engine
            .relocate(&src, &dir.path().join("out/a.txt"))
            .unwrap();
        assert!(outcome.operation_id.is_some());

        let csv_path = dir.path().join("history.csv");
        let count = engine
            .export_history(HistoryFormat::from_path(&csv_path), &csv_path)
            .unwrap();
        assert_eq!(count, 1);
        let text = fs::read_to_string(&csv_path).unwrap();
        assert!(text.contains(OperationStatus::Complete.label()));
        assert!(!csv_path.with_extension("export.tmp").exists());
    }

    #[test]
    fn test_classify_uses_policy() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(fast_settings(dir.path())).unwrap();
        assert_eq!(engine.classify(Path::new("/x/song.mp3")), "audio");
        assert_eq!(engine.classify(Path::new("/x/unknown.zzz")), "other");
    }

    #[test]
    fn test_scan_does_not_list_log_store() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(fast_settings(dir.path())).unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let report = engine.scan(dir.path(), None).unwrap();
        assert_eq!(report.files, vec![dir.path().join("a.txt")]);
    }

    #[test]
    fn test_history_format_from_path() {
        assert_eq!(HistoryFormat::from_path(Path::new("h.CSV")), HistoryFormat::Csv);
        assert_eq!(HistoryFormat::from_path(Path::new("h.json")), HistoryFormat::Json);
        assert_eq!(HistoryFormat::from_path(Path::new("h")), HistoryFormat::Json);
    }
}

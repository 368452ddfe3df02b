// Shelver - platform/config.rs
//
// Platform-specific configuration, data directory resolution, and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::core::classifier::{RoutingPolicy, RuleSpec};
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolved platform paths for Shelver data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/shelver/ or %APPDATA%\Shelver\config\)
    pub config_dir: PathBuf,

    /// Data directory; the default app root holding `LOGS/`.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }

    /// Default location of `config.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility -- a newer
/// config file can be used with an older binary without crashing.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub storage: StorageSection,
    pub scan: ScanSection,
    pub mover: MoverSection,
    pub organize: OrganizeSection,
    pub logging: LoggingSection,
    pub policy: PolicySection,
}

/// `[storage]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory holding `LOGS/transactions.jsonl`.
    pub app_root: Option<String>,
}

/// `[scan]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ScanSection {
    pub max_depth: Option<usize>,
    /// Pause after each scanned file, in ms.
    pub rate_limit_ms: Option<u64>,
    /// Attempts per file on permission errors.
    pub max_retries: Option<u32>,
    /// First backoff delay in ms; doubled per retry.
    pub retry_base_ms: Option<u64>,
}

/// `[mover]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct MoverSection {
    pub hash_size_limit_bytes: Option<u64>,
    pub max_collision_attempts: Option<u32>,
}

/// `[organize]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct OrganizeSection {
    /// Number of worker threads (0 = auto).
    pub worker_threads: Option<usize>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// `[policy]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub default_category: Option<String>,
    /// `[[policy.rules]]`, evaluated in order.
    pub rules: Vec<RuleSpec>,
    /// `[policy.destinations]`: category -> directory name.
    pub destinations: HashMap<String, String>,
}

/// Validated application configuration derived from `config.toml`.
///
/// All values are validated against named constants at load time.
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Storage --
    pub app_root: Option<PathBuf>,

    // -- Scan --
    pub max_depth: usize,
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,

    // -- Mover --
    pub hash_size_limit: u64,
    pub max_collision_attempts: u32,

    // -- Organize --
    /// 0 = one thread per core.
    pub worker_threads: usize,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    pub log_file: Option<String>,

    // -- Policy --
    pub policy: RoutingPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_root: None,
            max_depth: constants::DEFAULT_MAX_DEPTH,
            rate_limit_ms: constants::DEFAULT_SCAN_RATE_LIMIT_MS,
            max_retries: constants::DEFAULT_SCAN_MAX_RETRIES,
            retry_base_ms: constants::DEFAULT_RETRY_BASE_MS,
            hash_size_limit: constants::DEFAULT_HASH_SIZE_LIMIT,
            max_collision_attempts: constants::DEFAULT_MAX_COLLISION_ATTEMPTS,
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            log_level: None,
            log_file: None,
            policy: RoutingPolicy::builtin(),
        }
    }
}

/// Load and validate `config.toml` at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first-run).
/// If the file is unparseable, returns defaults with an error warning; the
/// application still starts but the user is informed.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!(
                "Could not read config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");
    let (config, mut validation) = validate(raw);
    warnings.append(&mut validation);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Check one optional value against an inclusive range, pushing a warning
/// and keeping the default when it is out of range.
fn check_range<T>(
    value: Option<T>,
    range: std::ops::RangeInclusive<T>,
    default: T,
    field: &str,
    warnings: &mut Vec<String>,
) -> T
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    match value {
        Some(v) if range.contains(&v) => v,
        Some(v) => {
            let err = ConfigError::ValueOutOfRange {
                field: field.to_string(),
                value: v.to_string(),
                expected: format!("{}-{}", range.start(), range.end()),
            };
            warnings.push(format!("{err}. Using default ({default})."));
            default
        }
        None => default,
    }
}

/// Validate each field against named constants, accumulating all warnings.
fn validate(raw: RawConfig) -> (AppConfig, Vec<String>) {
    let mut warnings = Vec::new();
    let defaults = AppConfig::default();

    // -- Storage: app_root --
    let app_root = raw
        .storage
        .app_root
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    // -- Scan --
    let max_depth = check_range(
        raw.scan.max_depth,
        0..=constants::ABSOLUTE_MAX_DEPTH,
        defaults.max_depth,
        "[scan] max_depth",
        &mut warnings,
    );
    let rate_limit_ms = check_range(
        raw.scan.rate_limit_ms,
        0..=constants::MAX_SCAN_RATE_LIMIT_MS,
        defaults.rate_limit_ms,
        "[scan] rate_limit_ms",
        &mut warnings,
    );
    let max_retries = check_range(
        raw.scan.max_retries,
        1..=constants::ABSOLUTE_MAX_SCAN_RETRIES,
        defaults.max_retries,
        "[scan] max_retries",
        &mut warnings,
    );
    let retry_base_ms = check_range(
        raw.scan.retry_base_ms,
        0..=constants::MAX_RETRY_BASE_MS,
        defaults.retry_base_ms,
        "[scan] retry_base_ms",
        &mut warnings,
    );

    // -- Mover --
    let hash_size_limit = check_range(
        raw.mover.hash_size_limit_bytes,
        constants::MIN_HASH_SIZE_LIMIT..=constants::MAX_HASH_SIZE_LIMIT,
        defaults.hash_size_limit,
        "[mover] hash_size_limit_bytes",
        &mut warnings,
    );
    let max_collision_attempts = check_range(
        raw.mover.max_collision_attempts,
        1..=constants::ABSOLUTE_MAX_COLLISION_ATTEMPTS,
        defaults.max_collision_attempts,
        "[mover] max_collision_attempts",
        &mut warnings,
    );

    // -- Organize --
    let worker_threads = check_range(
        raw.organize.worker_threads,
        0..=constants::MAX_WORKER_THREADS,
        defaults.worker_threads,
        "[organize] worker_threads",
        &mut warnings,
    );

    // -- Logging: level --
    let mut log_level = None;
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    // -- Logging: file --
    let log_file = raw.logging.file.filter(|f| !f.is_empty());

    // -- Policy --
    let (policy, policy_errors) = RoutingPolicy::from_config(
        raw.policy.default_category.as_deref().unwrap_or(""),
        &raw.policy.rules,
        &raw.policy.destinations,
    );
    warnings.extend(
        policy_errors
            .into_iter()
            .map(|e| format!("[policy] {e}. Rule skipped.")),
    );

    let config = AppConfig {
        app_root,
        max_depth,
        rate_limit_ms,
        max_retries,
        retry_base_ms,
        hash_size_limit,
        max_collision_attempts,
        worker_threads,
        log_level,
        log_file,
        policy,
    };
    (config, warnings)
}

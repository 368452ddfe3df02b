// Shelver - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "Shelver";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "Shelver";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Transaction log
// =============================================================================

/// Maintenance directory under the app root that holds the transaction log.
pub const LOG_DIR_NAME: &str = "LOGS";

/// File name of the JSON Lines transaction log inside `LOG_DIR_NAME`.
pub const TRANSACTION_LOG_FILE_NAME: &str = "transactions.jsonl";

/// Reason recorded when recovery finds neither source nor destination.
pub const SOURCE_MISSING_REASON: &str = "source missing";

// =============================================================================
// Hashing
// =============================================================================

/// Files larger than this are moved without a content fingerprint.
pub const DEFAULT_HASH_SIZE_LIMIT: u64 = 100_000_000; // 100 MB

/// Lower bound for a user-configured hashing ceiling.
pub const MIN_HASH_SIZE_LIMIT: u64 = 1_024; // 1 KiB

/// Upper bound for a user-configured hashing ceiling.
pub const MAX_HASH_SIZE_LIMIT: u64 = 64 * 1_024 * 1_024 * 1_024; // 64 GiB

/// Read buffer size used while hashing.
pub const HASH_CHUNK_SIZE: usize = 64 * 1024; // 64 KB

// =============================================================================
// Safe mover
// =============================================================================

/// Versioned sibling names (`_v1` .. `_vN`) tried before falling back to a
/// timestamp-qualified name.
pub const DEFAULT_MAX_COLLISION_ATTEMPTS: u32 = 9_999;

/// Hard upper bound on collision attempts (each attempt is a `stat`).
pub const ABSOLUTE_MAX_COLLISION_ATTEMPTS: u32 = 100_000;

/// `chrono` format of the timestamp fallback suffix.
pub const COLLISION_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Prefix of temporary copy artefacts. The leading dot keeps them out of scans.
pub const TEMP_FILE_PREFIX: &str = ".shelver-";

/// Extension of temporary copy artefacts.
pub const TEMP_FILE_SUFFIX: &str = ".tmp";

// =============================================================================
// Scanner
// =============================================================================

/// Default number of directory levels below the scan root that are visited.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Hard upper bound on max depth (prevents runaway traversal).
pub const ABSOLUTE_MAX_DEPTH: usize = 50;

/// Per-file access attempts on permission errors.
pub const DEFAULT_SCAN_MAX_RETRIES: u32 = 3;

/// Hard upper bound on per-file retries.
pub const ABSOLUTE_MAX_SCAN_RETRIES: u32 = 10;

/// Base delay of the exponential backoff between per-file retries (ms).
pub const DEFAULT_RETRY_BASE_MS: u64 = 100;

/// Upper bound on the backoff base delay (ms).
pub const MAX_RETRY_BASE_MS: u64 = 5_000;

/// Delay between file checks during a scan (ms).
pub const DEFAULT_SCAN_RATE_LIMIT_MS: u64 = 1;

/// Upper bound on the inter-file delay (ms).
pub const MAX_SCAN_RATE_LIMIT_MS: u64 = 1_000;

/// Marker prefix of hidden files and directories.
pub const HIDDEN_PREFIX: char = '.';

// =============================================================================
// Organizer
// =============================================================================

/// Default number of relocation workers. 0 means one per available CPU.
pub const DEFAULT_WORKER_THREADS: usize = 1;

/// Hard upper bound on relocation workers.
pub const MAX_WORKER_THREADS: usize = 64;

/// Maximum number of progress messages drained by one `poll_progress` call.
pub const MAX_PROGRESS_MESSAGES_PER_POLL: usize = 1_000;

// =============================================================================
// Report
// =============================================================================

/// Number of entries in the "largest files" section of an analysis report.
pub const REPORT_LARGEST_FILES: usize = 10;

// =============================================================================
// Classification defaults
// =============================================================================

/// Category assigned when no policy rule matches.
pub const DEFAULT_CATEGORY: &str = "other";

/// Built-in extension table: (category, extensions).
pub const DEFAULT_EXTENSION_TABLE: &[(&str, &[&str])] = &[
    (
        "code",
        &[
            "py", "js", "json", "html", "css", "md", "java", "cpp", "c", "ts", "tsx", "jsx",
            "sql", "yaml", "yml", "xml", "sh", "bash", "ps1", "rs", "toml",
        ],
    ),
    (
        "image",
        &["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp"],
    ),
    ("video", &["mp4", "mkv", "avi", "mov", "webm"]),
    ("audio", &["mp3", "wav", "flac", "m4a", "aac"]),
    (
        "document",
        &["pdf", "doc", "docx", "txt", "xlsx", "pptx", "odt", "rtf"],
    ),
    ("archive", &["zip", "rar", "7z", "tar", "gz"]),
];

/// Maximum number of policy rules accepted from config.
pub const MAX_POLICY_RULES: usize = 256;

/// Maximum regex pattern length in a policy rule.
pub const MAX_REGEX_PATTERN_LENGTH: usize = 4_096;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// Shelver - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Every error keeps its causal chain so the CLI and the transaction log can
// record a precise, human-readable reason.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all Shelver operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum ShelverError {
    /// Transaction log could not be opened, read, or written.
    Journal(JournalError),

    /// A single relocation failed.
    Move(MoveError),

    /// Directory scan could not start.
    Scan(ScanError),

    /// Content fingerprint could not be computed.
    Hash(HashError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// History export failed.
    Export(ExportError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for ShelverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Journal(e) => write!(f, "Transaction log error: {e}"),
            Self::Move(e) => write!(f, "Move error: {e}"),
            Self::Scan(e) => write!(f, "Scan error: {e}"),
            Self::Hash(e) => write!(f, "Hash error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ShelverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Journal(e) => Some(e),
            Self::Move(e) => Some(e),
            Self::Scan(e) => Some(e),
            Self::Hash(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction log errors
// ---------------------------------------------------------------------------

/// Errors raised by the transaction log store.
#[derive(Debug)]
pub enum JournalError {
    /// The log file or its directory could not be created, read, or synced.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// An event could not be serialised to JSON.
    Serialize { source: serde_json::Error },

    /// No record with this id exists.
    UnknownId { id: u64 },

    /// The requested transition would leave a terminal state.
    TerminalState {
        id: u64,
        status: &'static str,
        attempted: &'static str,
    },

    /// Another thread panicked while holding the log lock.
    LockPoisoned,
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "cannot {operation} transaction log '{}': {source}",
                path.display()
            ),
            Self::Serialize { source } => write!(f, "cannot serialise log event: {source}"),
            Self::UnknownId { id } => write!(f, "no operation record with id {id}"),
            Self::TerminalState {
                id,
                status,
                attempted,
            } => write!(
                f,
                "operation {id} is already {status} and cannot become {attempted}"
            ),
            Self::LockPoisoned => write!(f, "transaction log lock poisoned"),
        }
    }
}

impl std::error::Error for JournalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialize { source } => Some(source),
            _ => None,
        }
    }
}

impl From<JournalError> for ShelverError {
    fn from(e: JournalError) -> Self {
        Self::Journal(e)
    }
}

// ---------------------------------------------------------------------------
// Move errors
// ---------------------------------------------------------------------------

/// Tagged failure of a single relocation.
///
/// The `Display` text is what gets written into the operation record's
/// `error` field.
#[derive(Debug)]
pub enum MoveError {
    /// The source path does not exist.
    SourceNotFound { path: PathBuf },

    /// The source exists but is not a regular file.
    SourceNotRegularFile { path: PathBuf },

    /// The destination directory could not be created or written.
    DestinationUnwritable { path: PathBuf, source: io::Error },

    /// Copying the source to the temporary sibling failed.
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// The atomic rename of the temporary copy onto the destination failed.
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// The destination is in place but the source could not be removed.
    SourceRemovalFailed {
        path: PathBuf,
        destination: PathBuf,
        source: io::Error,
    },

    /// A byte-identical stale source could not be removed.
    DuplicateCleanupFailed { path: PathBuf, source: io::Error },

    /// The intent could not be recorded, or its outcome could not be written.
    Journal(JournalError),
}

impl MoveError {
    /// Stable tag naming the failure class.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => "SourceNotFound",
            Self::SourceNotRegularFile { .. } => "SourceNotRegularFile",
            Self::DestinationUnwritable { .. } => "DestinationUnwritable",
            Self::CopyFailed { .. } => "CopyFailed",
            Self::RenameFailed { .. } => "RenameFailed",
            Self::SourceRemovalFailed { .. } => "SourceRemovalFailed",
            Self::DuplicateCleanupFailed { .. } => "DuplicateCleanupFailed",
            Self::Journal(_) => "Journal",
        }
    }

    /// True when the source file is guaranteed to still be where it was.
    /// Journal errors surface before the copy starts, so they qualify.
    pub fn source_untouched(&self) -> bool {
        !matches!(self, Self::SourceRemovalFailed { .. })
    }
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceNotFound { path } => {
                write!(f, "[SourceNotFound] source missing: '{}'", path.display())
            }
            Self::SourceNotRegularFile { path } => write!(
                f,
                "[SourceNotRegularFile] not a regular file: '{}'",
                path.display()
            ),
            Self::DestinationUnwritable { path, source } => write!(
                f,
                "[DestinationUnwritable] cannot prepare '{}': {source}",
                path.display()
            ),
            Self::CopyFailed { from, to, source } => write!(
                f,
                "[CopyFailed] copy '{}' -> '{}' failed: {source}",
                from.display(),
                to.display()
            ),
            Self::RenameFailed { from, to, source } => write!(
                f,
                "[RenameFailed] rename '{}' -> '{}' failed: {source}",
                from.display(),
                to.display()
            ),
            Self::SourceRemovalFailed {
                path,
                destination,
                source,
            } => write!(
                f,
                "[SourceRemovalFailed] '{}' is safely at '{}' \
                 but the source could not be removed: {source}",
                path.display(),
                destination.display()
            ),
            Self::DuplicateCleanupFailed { path, source } => write!(
                f,
                "[DuplicateCleanupFailed] cannot remove duplicate '{}': {source}",
                path.display()
            ),
            Self::Journal(e) => write!(f, "[Journal] {e}"),
        }
    }
}

impl std::error::Error for MoveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DestinationUnwritable { source, .. } => Some(source),
            Self::CopyFailed { source, .. } => Some(source),
            Self::RenameFailed { source, .. } => Some(source),
            Self::SourceRemovalFailed { source, .. } => Some(source),
            Self::DuplicateCleanupFailed { source, .. } => Some(source),
            Self::Journal(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JournalError> for MoveError {
    fn from(e: JournalError) -> Self {
        Self::Journal(e)
    }
}

impl From<MoveError> for ShelverError {
    fn from(e: MoveError) -> Self {
        Self::Move(e)
    }
}

// ---------------------------------------------------------------------------
// Scan errors
// ---------------------------------------------------------------------------

/// Errors that prevent a scan from starting at all.
///
/// Per-entry access problems are never errors; they become scan warnings.
#[derive(Debug)]
pub enum ScanError {
    /// The root scan path does not exist.
    RootNotFound { path: PathBuf },

    /// The root path is not a directory.
    NotADirectory { path: PathBuf },
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Scan path '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "Scan path '{}' is not a directory", path.display())
            }
        }
    }
}

impl std::error::Error for ScanError {}

impl From<ScanError> for ShelverError {
    fn from(e: ScanError) -> Self {
        Self::Scan(e)
    }
}

// ---------------------------------------------------------------------------
// Hash errors
// ---------------------------------------------------------------------------

/// Errors raised while fingerprinting file content.
#[derive(Debug)]
pub enum HashError {
    /// The file could not be opened or read.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot hash '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for HashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<HashError> for ShelverError {
    fn from(e: HashError) -> Self {
        Self::Hash(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// A classification rule is malformed.
    InvalidRule { index: usize, reason: String },

    /// A regex in a classification rule does not compile.
    InvalidRegex {
        index: usize,
        pattern: String,
        source: regex::Error,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::InvalidRule { index, reason } => {
                write!(f, "Policy rule #{index}: {reason}")
            }
            Self::InvalidRegex {
                index,
                pattern,
                source,
            } => write!(f, "Policy rule #{index}: invalid regex '{pattern}': {source}"),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for ShelverError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to history export.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export.
    Io { path: PathBuf, source: io::Error },

    /// CSV serialisation error.
    Csv { path: PathBuf, source: csv::Error },

    /// JSON serialisation error.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Export I/O error '{}': {source}", path.display())
            }
            Self::Csv { path, source } => {
                write!(f, "CSV export error '{}': {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "JSON export error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<ExportError> for ShelverError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

/// Convenience type alias for Shelver results.
pub type Result<T> = std::result::Result<T, ShelverError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_move_error_tags_are_stable() {
        let e = MoveError::SourceNotFound {
            path: PathBuf::from("/tmp/a.txt"),
        };
        assert_eq!(e.tag(), "SourceNotFound");
        assert!(e.to_string().contains("a.txt"));
        assert!(e.source_untouched());

        let e = MoveError::SourceRemovalFailed {
            path: PathBuf::from("/tmp/a.txt"),
            destination: PathBuf::from("/tmp/dest/a.txt"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(e.tag(), "SourceRemovalFailed");
        assert!(!e.source_untouched());

        let e = MoveError::Journal(JournalError::UnknownId { id: 7 });
        assert_eq!(e.tag(), "Journal");
        assert!(e.source_untouched());
    }

    #[test]
    fn test_error_chain_preserved() {
        let inner = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: ShelverError = MoveError::CopyFailed {
            from: PathBuf::from("a"),
            to: PathBuf::from("b"),
            source: inner,
        }
        .into();
        let move_err = err.source().expect("move error in chain");
        let io_err = move_err.source().expect("io error in chain");
        assert_eq!(io_err.to_string(), "denied");
    }

    #[test]
    fn test_terminal_state_message_names_both_states() {
        let e = JournalError::TerminalState {
            id: 7,
            status: "FAILED",
            attempted: "COMPLETE",
        };
        let text = e.to_string();
        assert!(text.contains('7') && text.contains("FAILED") && text.contains("COMPLETE"));
    }
}

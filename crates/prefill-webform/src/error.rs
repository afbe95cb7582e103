//! Import error types.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use prefill_core::StoreError;

/// Why an import attempt failed. Every variant aborts the import.
#[derive(Debug, Clone)]
pub enum ImportError {
    /// The source file could not be opened or read
    Io {
        path: PathBuf,
        kind: std::io::ErrorKind,
        message: String,
    },

    /// No header column matches a known field of the scope
    SchemaMismatch {
        scope: String,
    },

    /// The header has no `hash` column
    MissingHashColumn,

    /// A data line has no value in the hash column
    MissingHashValue {
        /// 0-based line number in the file (the header is line 0)
        line: usize,
    },

    /// The hash was already inserted earlier in this import
    DuplicateHash {
        hash: String,
        line: usize,
    },

    /// Fewer records were inserted than there are data lines
    RowCountMismatch {
        expected: usize,
        inserted: usize,
    },

    /// The record store failed (delete, insert or sync)
    Store(StoreError),

    /// The caller-supplied deadline passed mid-import
    ImportTimeout {
        /// Data lines inserted before the deadline hit
        inserted: usize,
    },
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Io { path, kind, message } => {
                write!(f, "Cannot read {}: {} ({})", path.display(), message, kind)
            }
            ImportError::SchemaMismatch { scope } => {
                write!(f, "File header shares no column with the fields of '{}'", scope)
            }
            ImportError::MissingHashColumn => {
                write!(f, "File should have a hash column")
            }
            ImportError::MissingHashValue { line } => {
                write!(f, "Line {} has no hash value", line)
            }
            ImportError::DuplicateHash { hash, line } => {
                write!(f, "Duplicate hash '{}' on line {}", hash, line)
            }
            ImportError::RowCountMismatch { expected, inserted } => {
                write!(f, "Inserted {} of {} data lines", inserted, expected)
            }
            ImportError::Store(e) => write!(f, "Record store error: {}", e),
            ImportError::ImportTimeout { inserted } => {
                write!(f, "Import deadline exceeded after {} records", inserted)
            }
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ImportError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ImportError {
    fn from(err: StoreError) -> Self {
        ImportError::Store(err)
    }
}

impl ImportError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        ImportError::Io {
            path: path.to_path_buf(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type ImportResult<T> = Result<T, ImportError>;

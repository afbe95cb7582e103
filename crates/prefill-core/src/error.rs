//! Error types for record store operations
//!
//! All store errors are represented by the StoreError enum. WAL framing
//! errors carry the file path and byte offset so recovery can report where
//! a log went bad.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Record store error types with detailed context
#[derive(Debug, Clone)]
pub enum StoreError {
    /// I/O operation failed
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// WAL file is corrupted and cannot be recovered
    WalCorrupted {
        /// Path to the corrupted WAL file
        path: PathBuf,
        /// Byte offset where corruption was detected
        offset: u64,
        /// Description of the corruption
        reason: String,
    },

    /// Checksum verification failed
    ChecksumMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
        offset: u64,
    },

    /// Partial entry at the end of a WAL file
    TornWrite {
        path: PathBuf,
        expected_size: u32,
        available_bytes: u64,
        offset: u64,
    },

    /// Magic bytes not found at expected location
    NoMagicFound {
        path: PathBuf,
        offset: u64,
        found_bytes: [u8; 4],
    },

    /// A scope, hash or field blob exceeds its configured limit
    OversizedEntry {
        /// Size of the oversized component
        entry_size: u64,
        /// Maximum allowed size
        max_size: u64,
        /// "scope", "hash" or "fields"
        component: String,
    },

    /// A record with this hash already exists in the scope
    DuplicateHash {
        scope: String,
        hash: String,
    },

    /// The field blob could not be encoded or decoded
    Serialization {
        message: String,
    },

    /// Config::validate rejected the configuration
    InvalidConfig {
        reason: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, kind, message } => {
                if let Some(path) = path {
                    write!(f, "I/O error in {}: {} ({})", path.display(), message, kind)
                } else {
                    write!(f, "I/O error: {} ({})", message, kind)
                }
            }

            StoreError::WalCorrupted { path, offset, reason } => {
                write!(f, "WAL corrupted in {} at offset {}: {}", path.display(), offset, reason)
            }

            StoreError::ChecksumMismatch { path, expected, actual, offset } => {
                write!(f, "Checksum mismatch in {} at offset {}: expected 0x{:08x}, got 0x{:08x}",
                       path.display(), offset, expected, actual)
            }

            StoreError::TornWrite { path, expected_size, available_bytes, offset } => {
                write!(f, "Torn write in {} at offset {}: expected {} bytes, only {} available",
                       path.display(), offset, expected_size, available_bytes)
            }

            StoreError::NoMagicFound { path, offset, found_bytes } => {
                write!(f, "Magic bytes not found in {} at offset {}: found {:02x}{:02x}{:02x}{:02x}",
                       path.display(), offset, found_bytes[0], found_bytes[1], found_bytes[2], found_bytes[3])
            }

            StoreError::OversizedEntry { entry_size, max_size, component } => {
                write!(f, "Record {} too large: {} bytes exceeds limit of {} bytes",
                       component, entry_size, max_size)
            }

            StoreError::DuplicateHash { scope, hash } => {
                write!(f, "Duplicate hash '{}' in scope '{}'", hash, scope)
            }

            StoreError::Serialization { message } => {
                write!(f, "Field serialization failed: {}", message)
            }

            StoreError::InvalidConfig { reason } => {
                write!(f, "Invalid store configuration: {}", reason)
            }
        }
    }
}

impl Error for StoreError {}

/// Convert std::io::Error to StoreError::Io
impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization { message: err.to_string() }
    }
}

/// Result type alias for record store operations
pub type StoreResult<T> = Result<T, StoreError>;

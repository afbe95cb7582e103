//! Prefill Core: WAL-backed record store
//!
//! Stores imported rows as records keyed by `(scope, hash)`, where the
//! scope names the owning form definition and the hash is the shareable
//! token a visitor presents.
//!
//! # Architecture
//!
//! - **Read path**: in-memory index, one ordered map per scope
//! - **Write path**: WAL-first, then index (crash-safe)
//! - **Compaction**: rewrites the WAL once replaced scopes dominate it
//!
//! # No form assumptions
//!
//! This crate knows nothing about delimited files, form definitions or
//! sessions. Those live in `prefill-webform`.

pub mod compaction;
pub mod config;
pub mod error;
pub mod format;
pub mod platform_durability;
pub mod record;
pub mod store;
pub mod wal;

pub use compaction::CompactionResult;
pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use format::Operation;
pub use record::{FieldMap, Record};
pub use store::{ListQuery, RecordStore, SortColumn, SortOrder};
pub use wal::{WalReader, WalWriter};

//! Prefill Webform: form prefill from delimited files
//!
//! Imports a delimited file into `prefill-core` records for one form and
//! serves the stored fields back to visitors who present a row's hash.
//!
//! # Architecture
//!
//! Import: `LineReader` -> `schema::validate` -> `Importer` -> `indexer::index` -> `RecordStore`
//!
//! Lookup: `Caller` -> `AccessLimiter` -> `RecordStore`
//!
//! - An import replaces every record of the form, but not atomically
//! - Each session may open a bounded number of distinct hashes per form
//! - Form definitions, session storage and uploads belong to the host and
//!   come in through the traits in `collaborators`

pub mod collaborators;
pub mod config;
pub mod error;
pub mod import;
pub mod indexer;
pub mod limiter;
pub mod lines;
pub mod prefill;
pub mod schema;

pub use collaborators::{
    CollaboratorError, FormDefinitions, MemorySessionStore, SessionStore, SettingValue, StaticForms, Uploads,
};
pub use config::{Delimiter, ImportConfig, LimiterConfig};
pub use error::{ImportError, ImportResult};
pub use import::{ImportReport, Importer};
pub use indexer::RowWarning;
pub use limiter::{AccessLimiter, BotFilter, Caller, PatternBotFilter};
pub use prefill::{Lookup, Prefill};

//! Record type stored per (scope, hash).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Column name -> value, in header order.
pub type FieldMap = IndexMap<String, String>;

/// One imported row, keyed by `hash` within `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Owning form definition
    pub scope: String,
    /// Shareable token, unique within the scope
    pub hash: String,
    /// Remaining row fields
    pub fields: FieldMap,
    /// Unix timestamp (seconds) of the import that wrote this record
    pub created_at: i64,
}

impl Record {
    /// Build a record stamped with the current time.
    pub fn new(scope: impl Into<String>, hash: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            scope: scope.into(),
            hash: hash.into(),
            fields,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Field values joined with ", " in column order.
    pub fn summary(&self) -> String {
        self.fields.values().map(String::as_str).collect::<Vec<_>>().join(", ")
    }

    /// The persisted field blob (a JSON object).
    pub fn encode_fields(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.fields)?)
    }

    pub(crate) fn decode_fields(bytes: &[u8]) -> StoreResult<FieldMap> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

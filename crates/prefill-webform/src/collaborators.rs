//! Interfaces to the host: form definitions, per-session storage, uploads.
//!
//! The host framework implements these. `StaticForms` and
//! `MemorySessionStore` are in-memory implementations for embedding and tests.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use hashbrown::HashMap;
use parking_lot::Mutex;

/// A scope setting value as the form definition stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Int(i64),
    Text(String),
}

impl SettingValue {
    /// Flags are stored as the integer 1; nothing else counts as on.
    pub fn is_on(&self) -> bool {
        matches!(self, SettingValue::Int(1))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            SettingValue::Int(_) => None,
        }
    }
}

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorError {
    pub message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for CollaboratorError {}

/// Source of form definitions.
pub trait FormDefinitions: Send + Sync {
    /// Element keys of the form identified by `scope`.
    fn field_names(&self, scope: &str) -> Result<Vec<String>, CollaboratorError>;

    /// A prefill setting of the form, if set.
    fn setting(&self, scope: &str, key: &str) -> Result<Option<SettingValue>, CollaboratorError>;
}

/// Key/value storage private to the calling session.
pub trait SessionStore: Send + Sync {
    /// Stable identifier of the session; used to serialize ledger updates.
    fn session_id(&self) -> &str;

    fn get(&self, key: &str) -> Result<Option<Vec<String>>, CollaboratorError>;

    fn set(&self, key: &str, value: Vec<String>) -> Result<(), CollaboratorError>;
}

/// Temporary uploaded files, addressed by an opaque id.
pub trait Uploads {
    fn locate(&self, id: &str) -> Result<PathBuf, CollaboratorError>;

    /// Drop the upload. Called after every import attempt.
    fn discard(&self, id: &str) -> Result<(), CollaboratorError>;
}

/// Fixed form definitions.
#[derive(Debug, Default)]
pub struct StaticForms {
    fields: HashMap<String, Vec<String>>,
    settings: HashMap<(String, String), SettingValue>,
}

impl StaticForms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form<I, S>(mut self, scope: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.insert(scope.to_string(), fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_setting(mut self, scope: &str, key: &str, value: SettingValue) -> Self {
        self.settings.insert((scope.to_string(), key.to_string()), value);
        self
    }
}

impl FormDefinitions for StaticForms {
    fn field_names(&self, scope: &str) -> Result<Vec<String>, CollaboratorError> {
        self.fields
            .get(scope)
            .cloned()
            .ok_or_else(|| CollaboratorError::new(format!("Unknown form '{}'", scope)))
    }

    fn setting(&self, scope: &str, key: &str) -> Result<Option<SettingValue>, CollaboratorError> {
        Ok(self.settings.get(&(scope.to_string(), key.to_string())).cloned())
    }
}

/// Session storage held in memory.
#[derive(Debug)]
pub struct MemorySessionStore {
    id: String,
    values: Mutex<HashMap<String, Vec<String>>>,
}

impl MemorySessionStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), values: Mutex::new(HashMap::new()) }
    }
}

impl SessionStore for MemorySessionStore {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Result<Option<Vec<String>>, CollaboratorError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<String>) -> Result<(), CollaboratorError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

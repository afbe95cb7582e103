//! Import and access-limit configuration.

use std::time::Instant;

/// Scope setting: `1` enables prefill from imported files.
pub const SETTING_ENABLE_FILE: &str = "form_prepopulate_enable_file";
/// Scope setting: `1` turns the per-session hash limit off.
pub const SETTING_DISABLE_HASH_LIMIT: &str = "disable_hash_access_limit";
/// Scope setting: `"comma"` or `"semicolon"`.
pub const SETTING_DELIMITER: &str = "file_delimiter";

/// Column separator of the source file. Quoting is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Comma,
    Semicolon,
}

impl Delimiter {
    pub fn as_str(self) -> &'static str {
        match self {
            Delimiter::Comma => ",",
            Delimiter::Semicolon => ";",
        }
    }

    /// Map a scope setting value; anything but `"semicolon"` is a comma.
    pub fn from_setting(value: &str) -> Self {
        match value {
            "semicolon" => Delimiter::Semicolon,
            _ => Delimiter::Comma,
        }
    }

    pub fn split(self, line: &str) -> Vec<String> {
        line.split(self.as_str()).map(str::to_string).collect()
    }

    pub fn join(self, values: &[String]) -> String {
        values.join(self.as_str())
    }
}

/// Import pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct ImportConfig {
    /// Used when the scope has no delimiter setting
    pub delimiter: Delimiter,
    /// Abort with `ImportTimeout` once this passes
    pub deadline: Option<Instant>,
}

impl ImportConfig {
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Access limiter configuration
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Distinct hashes one session may open per scope
    pub max_hash_access: usize,
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_hash_access == 0 {
            return Err("max_hash_access must be > 0".into());
        }
        Ok(())
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self { max_hash_access: 5 }
    }
}

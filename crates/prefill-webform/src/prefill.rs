//! Entry point for the host: prefill lookups and imports for forms.

use std::path::Path;
use std::sync::Arc;

use prefill_core::{FieldMap, ListQuery, Record, RecordStore};

use crate::collaborators::{FormDefinitions, Uploads};
use crate::config::{ImportConfig, LimiterConfig, SETTING_ENABLE_FILE};
use crate::error::ImportResult;
use crate::import::{ImportReport, Importer};
use crate::limiter::{AccessLimiter, BotFilter, Caller};

/// Result of a hash lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// File prefill is turned off for the scope
    Disabled,
    /// The limiter refused the caller
    Denied,
    NotFound,
    Found(FieldMap),
}

impl Lookup {
    /// The fields to prefill, if any.
    pub fn into_fields(self) -> Option<FieldMap> {
        match self {
            Lookup::Found(fields) => Some(fields),
            _ => None,
        }
    }
}

/// Record store, limiter and importer behind one handle.
pub struct Prefill {
    store: Arc<RecordStore>,
    forms: Arc<dyn FormDefinitions>,
    limiter: AccessLimiter,
    importer: Importer,
}

impl Prefill {
    pub fn new(
        store: Arc<RecordStore>,
        forms: Arc<dyn FormDefinitions>,
        import_config: ImportConfig,
        limiter_config: LimiterConfig,
    ) -> Self {
        let limiter = AccessLimiter::new(Arc::clone(&forms), limiter_config);
        Self::with_limiter(store, forms, import_config, limiter)
    }

    /// Like `new`, with a custom bot filter for the limiter.
    pub fn with_bot_filter(
        store: Arc<RecordStore>,
        forms: Arc<dyn FormDefinitions>,
        import_config: ImportConfig,
        limiter_config: LimiterConfig,
        bot_filter: Box<dyn BotFilter>,
    ) -> Self {
        let limiter = AccessLimiter::with_bot_filter(Arc::clone(&forms), limiter_config, bot_filter);
        Self::with_limiter(store, forms, import_config, limiter)
    }

    fn with_limiter(
        store: Arc<RecordStore>,
        forms: Arc<dyn FormDefinitions>,
        import_config: ImportConfig,
        limiter: AccessLimiter,
    ) -> Self {
        let importer = Importer::new(Arc::clone(&store), Arc::clone(&forms), import_config);
        Self { store, forms, limiter, importer }
    }

    /// Whether the scope takes its prefill values from imported files.
    pub fn is_file_prefill_enabled(&self, scope: &str) -> bool {
        match self.forms.setting(scope, SETTING_ENABLE_FILE) {
            Ok(value) => value.map_or(false, |v| v.is_on()),
            Err(e) => {
                log::error!("Cannot read file prefill setting of '{}': {}", scope, e);
                false
            }
        }
    }

    /// Fields stored under `hash`, gated by the setting and the limiter.
    ///
    /// A denied caller learns nothing about whether the hash exists.
    pub fn lookup(&self, caller: &Caller<'_>, scope: &str, hash: &str) -> Lookup {
        if !self.is_file_prefill_enabled(scope) {
            return Lookup::Disabled;
        }
        if !self.limiter.has_access(caller, scope, hash) {
            return Lookup::Denied;
        }
        match self.store.get_by_hash(scope, hash) {
            Some(record) => Lookup::Found(record.fields),
            None => Lookup::NotFound,
        }
    }

    pub fn import_file(&self, scope: &str, path: &Path) -> ImportResult<ImportReport> {
        self.importer.import_file(scope, path)
    }

    pub fn import_upload(&self, scope: &str, uploads: &dyn Uploads, id: &str) -> ImportResult<ImportReport> {
        self.importer.import_upload(scope, uploads, id)
    }

    pub fn count(&self, scope: &str) -> usize {
        self.store.count(scope)
    }

    pub fn list(&self, scope: &str, query: &ListQuery) -> Vec<Record> {
        self.store.list(scope, query)
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn limiter(&self) -> &AccessLimiter {
        &self.limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MemorySessionStore, SessionStore, SettingValue, StaticForms};
    use prefill_core::Config;
    use tempfile::TempDir;

    const BROWSER: &str = "Mozilla/5.0 (Macintosh) Safari/605.1.15";

    fn prefill(dir: &TempDir, forms: StaticForms) -> Prefill {
        let store = Arc::new(RecordStore::open(dir.path().join("db"), Config::bulk()).unwrap());
        Prefill::new(store, Arc::new(forms), ImportConfig::default(), LimiterConfig { max_hash_access: 2 })
    }

    fn seed(prefill: &Prefill, dir: &TempDir) {
        let path = dir.path().join("seed.csv");
        std::fs::write(&path, "hash,name\nh1,Ann\nh2,Bob\nh3,Cy\n").unwrap();
        prefill.import_file("contact", &path).unwrap();
    }

    #[test]
    fn test_lookup_disabled_without_setting() {
        let dir = TempDir::new().unwrap();
        let prefill = prefill(&dir, StaticForms::new().with_form("contact", ["name"]));
        seed(&prefill, &dir);

        let session = MemorySessionStore::new("s1");
        let caller = Caller::new(&session).user_agent(BROWSER);
        assert!(!prefill.is_file_prefill_enabled("contact"));
        assert_eq!(prefill.lookup(&caller, "contact", "h1"), Lookup::Disabled);
        // disabled lookups never touch the ledger
        assert!(session.get("accessed_hashes_contact").unwrap().is_none());
    }

    #[test]
    fn test_lookup_found_not_found_denied() {
        let dir = TempDir::new().unwrap();
        let forms = StaticForms::new()
            .with_form("contact", ["name"])
            .with_setting("contact", SETTING_ENABLE_FILE, SettingValue::Int(1));
        let prefill = prefill(&dir, forms);
        seed(&prefill, &dir);

        let session = MemorySessionStore::new("s1");
        let caller = Caller::new(&session).user_agent(BROWSER).client_ip("203.0.113.7");

        let fields = prefill.lookup(&caller, "contact", "h1").into_fields().unwrap();
        assert_eq!(fields["name"], "Ann");
        assert_eq!(prefill.lookup(&caller, "contact", "missing"), Lookup::NotFound);
        // third distinct hash, existing or not, is over the limit
        assert_eq!(prefill.lookup(&caller, "contact", "h2"), Lookup::Denied);
        // and the session stays over it for every hash
        assert_eq!(prefill.lookup(&caller, "contact", "h1"), Lookup::Denied);
    }

    #[test]
    fn test_text_flag_is_not_enabled() {
        let dir = TempDir::new().unwrap();
        let forms = StaticForms::new().with_setting("contact", SETTING_ENABLE_FILE, SettingValue::Text("1".into()));
        let prefill = prefill(&dir, forms);
        assert!(!prefill.is_file_prefill_enabled("contact"));
    }
}

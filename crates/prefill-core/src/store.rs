//! Record store: scoped prefill records over a WAL.
//!
//! **Read path**: in-memory index, `scope -> (hash -> Record)` behind an RwLock
//! **Write path**: WAL append first, then index update
//! **Recovery**: `open` replays every WAL generation in order
//!
//! Writers serialize on the WAL mutex, which also makes the duplicate-hash
//! check and the append a single step.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::compaction::{compact_wal, needs_compaction, CompactionResult};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::format::{Operation, WalEntry};
use crate::record::Record;
use crate::wal::{WalReader, WalWriter};

type ScopeIndex = HashMap<String, BTreeMap<String, Record>>;

/// Column a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Hash,
    /// The record summary (field values joined)
    Data,
    /// Import timestamp
    Imported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Parameters for `RecordStore::list`.
///
/// With no sort keys the listing is ascending by hash. Hash ascending is
/// always the final tie-breaker.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub sort: Vec<(SortColumn, SortOrder)>,
    /// Case-insensitive substring filter on the hash
    pub search: Option<String>,
    /// 0-based page number
    pub page: usize,
    /// Overrides `Config::page_size`
    pub page_size: Option<usize>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, column: SortColumn, order: SortOrder) -> Self {
        self.sort.push((column, order));
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }
}

/// Persistent store for prefill records.
///
/// All public methods take `&self`; share it behind an `Arc`.
pub struct RecordStore {
    index: RwLock<ScopeIndex>,
    wal: Mutex<WalWriter>,
    /// Entries currently in the WAL, live or dead
    log_entries: AtomicUsize,
    path: PathBuf,
    config: Config,
}

impl RecordStore {
    /// Open or create a store at `path` and replay its WAL.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> StoreResult<Self> {
        config.validate().map_err(|reason| StoreError::InvalidConfig { reason })?;

        let path = path.as_ref().to_path_buf();
        let wal_dir = path.join("wal");
        std::fs::create_dir_all(&wal_dir).map_err(|e| StoreError::Io {
            path: Some(wal_dir.clone()),
            kind: e.kind(),
            message: format!("Failed to create WAL directory: {}", e),
        })?;

        let entries = WalReader::new(&wal_dir).recover_entries()?;
        let mut index = ScopeIndex::new();
        for entry in &entries {
            match entry.operation {
                Operation::Insert => {
                    let record = Record {
                        scope: entry.scope.clone(),
                        hash: entry.hash.clone(),
                        fields: Record::decode_fields(&entry.fields)?,
                        created_at: entry.created_at,
                    };
                    index
                        .entry(entry.scope.clone())
                        .or_default()
                        .insert(entry.hash.clone(), record);
                }
                Operation::DeleteScope => {
                    index.remove(&entry.scope);
                }
            }
        }

        let recovered: usize = index.values().map(BTreeMap::len).sum();
        if !entries.is_empty() {
            log::info!(
                "Recovered {} records in {} scopes from {} WAL entries at {}",
                recovered,
                index.len(),
                entries.len(),
                wal_dir.display()
            );
        }

        let wal = WalWriter::new(&wal_dir, config.wal_rotation_size_bytes)?;

        Ok(Self {
            index: RwLock::new(index),
            wal: Mutex::new(wal),
            log_entries: AtomicUsize::new(entries.len()),
            path,
            config,
        })
    }

    /// Remove every record of `scope`. Returns how many were removed.
    ///
    /// Deleting an empty or unknown scope succeeds and still logs the delete,
    /// so replay stays in step with what callers saw.
    pub fn delete_scope(&self, scope: &str) -> StoreResult<usize> {
        let mut wal = self.wal.lock();
        wal.append(
            &WalEntry::delete_scope(scope, chrono::Utc::now().timestamp()),
            self.config.sync_each_write,
        )?;
        self.log_entries.fetch_add(1, Ordering::Relaxed);

        let removed = self.index.write().remove(scope).map_or(0, |m| m.len());
        Ok(removed)
    }

    /// Insert a record. Fails with `DuplicateHash` if the scope already has the hash.
    pub fn insert(&self, record: Record) -> StoreResult<()> {
        self.check_limit(record.scope.len(), self.config.max_scope_len, "scope")?;
        self.check_limit(record.hash.len(), self.config.max_hash_len, "hash")?;
        let blob = record.encode_fields()?;
        self.check_limit(blob.len(), self.config.max_fields_bytes, "fields")?;

        let mut wal = self.wal.lock();
        let exists = self
            .index
            .read()
            .get(&record.scope)
            .map_or(false, |m| m.contains_key(&record.hash));
        if exists {
            return Err(StoreError::DuplicateHash {
                scope: record.scope,
                hash: record.hash,
            });
        }

        wal.append(
            &WalEntry::insert(&record.scope, &record.hash, blob, record.created_at),
            self.config.sync_each_write,
        )?;
        self.log_entries.fetch_add(1, Ordering::Relaxed);

        self.index
            .write()
            .entry(record.scope.clone())
            .or_default()
            .insert(record.hash.clone(), record);
        Ok(())
    }

    fn check_limit(&self, len: usize, max: usize, component: &str) -> StoreResult<()> {
        if len > max {
            return Err(StoreError::OversizedEntry {
                entry_size: len as u64,
                max_size: max as u64,
                component: component.to_string(),
            });
        }
        Ok(())
    }

    /// Exact lookup.
    pub fn get_by_hash(&self, scope: &str, hash: &str) -> Option<Record> {
        self.index.read().get(scope).and_then(|m| m.get(hash)).cloned()
    }

    pub fn count(&self, scope: &str) -> usize {
        self.index.read().get(scope).map_or(0, BTreeMap::len)
    }

    /// Total records across all scopes.
    pub fn len(&self) -> usize {
        self.index.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One page of a scope's records, filtered and sorted per `query`.
    pub fn list(&self, scope: &str, query: &ListQuery) -> Vec<Record> {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<Record> = {
            let index = self.index.read();
            match index.get(scope) {
                Some(records) => records
                    .values()
                    .filter(|r| needle.as_ref().map_or(true, |n| r.hash.to_lowercase().contains(n.as_str())))
                    .cloned()
                    .collect(),
                None => return Vec::new(),
            }
        };

        // BTreeMap order is already hash ascending; a stable sort keeps it as the tie-breaker
        if !query.sort.is_empty() {
            rows.sort_by(|a, b| {
                for (column, order) in &query.sort {
                    let ord = match column {
                        SortColumn::Hash => a.hash.cmp(&b.hash),
                        SortColumn::Data => a.summary().cmp(&b.summary()),
                        SortColumn::Imported => a.created_at.cmp(&b.created_at),
                    };
                    let ord = match order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let page_size = query.page_size.unwrap_or(self.config.page_size).max(1);
        rows.into_iter()
            .skip(query.page.saturating_mul(page_size))
            .take(page_size)
            .collect()
    }

    /// Make all appended entries durable.
    pub fn sync(&self) -> StoreResult<()> {
        self.wal.lock().sync()
    }

    /// Rewrite the WAL to hold only live records.
    pub fn compact(&self) -> StoreResult<CompactionResult> {
        let mut wal = self.wal.lock();
        wal.sync()?;

        let live: Vec<WalEntry> = {
            let index = self.index.read();
            let mut live = Vec::with_capacity(index.values().map(BTreeMap::len).sum());
            for records in index.values() {
                for record in records.values() {
                    live.push(WalEntry::insert(
                        &record.scope,
                        &record.hash,
                        record.encode_fields()?,
                        record.created_at,
                    ));
                }
            }
            live
        };

        let wal_dir = self.path.join("wal");
        let next = wal.sequence() + 1;
        let result = compact_wal(&wal_dir, &live, self.log_entries.load(Ordering::Relaxed), next)?;
        *wal = WalWriter::open_at(wal_dir, next, self.config.wal_rotation_size_bytes)?;
        self.log_entries.store(result.live_entries, Ordering::Relaxed);

        log::info!(
            "Compacted WAL: {} -> {} entries ({} bytes saved)",
            result.original_entries,
            result.live_entries,
            result.bytes_saved()
        );
        Ok(result)
    }

    /// Compact if the dead share of the log crosses `compaction_trigger_ratio`.
    pub fn maybe_compact(&self) -> StoreResult<Option<CompactionResult>> {
        if needs_compaction(
            self.log_entries.load(Ordering::Relaxed),
            self.len(),
            self.config.compaction_trigger_ratio,
        ) {
            return self.compact().map(Some);
        }
        Ok(None)
    }

    /// Entries currently in the WAL, including dead ones.
    pub fn log_entries(&self) -> usize {
        self.log_entries.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.path)
            .field("records", &self.len())
            .field("log_entries", &self.log_entries())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_store() -> (RecordStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path(), Config::default()).unwrap();
        (store, dir)
    }

    fn record(scope: &str, hash: &str, name: &str) -> Record {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), name.to_string());
        Record::new(scope, hash, fields)
    }

    #[test]
    fn test_open_empty() {
        let (store, _dir) = test_store();
        assert!(store.is_empty());
        assert_eq!(store.count("contact"), 0);
        assert_eq!(store.log_entries(), 0);
    }

    #[test]
    fn test_insert_get() {
        let (store, _dir) = test_store();
        store.insert(record("contact", "abc", "Ann")).unwrap();
        let got = store.get_by_hash("contact", "abc").unwrap();
        assert_eq!(got.fields["name"], "Ann");
        assert!(store.get_by_hash("contact", "ABC").is_none());
        assert!(store.get_by_hash("other", "abc").is_none());
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let (store, _dir) = test_store();
        store.insert(record("contact", "abc", "Ann")).unwrap();
        let err = store.insert(record("contact", "abc", "Bob")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateHash { .. }));
        assert_eq!(store.get_by_hash("contact", "abc").unwrap().fields["name"], "Ann");
        // the same hash in another scope is fine
        store.insert(record("survey", "abc", "Bob")).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_delete_scope_is_partitioned_and_idempotent() {
        let (store, _dir) = test_store();
        store.insert(record("contact", "a", "1")).unwrap();
        store.insert(record("contact", "b", "2")).unwrap();
        store.insert(record("survey", "a", "3")).unwrap();

        assert_eq!(store.delete_scope("contact").unwrap(), 2);
        assert_eq!(store.delete_scope("contact").unwrap(), 0);
        assert_eq!(store.delete_scope("missing").unwrap(), 0);
        assert_eq!(store.count("contact"), 0);
        assert_eq!(store.count("survey"), 1);
    }

    #[test]
    fn test_oversized_hash_rejected() {
        let (store, _dir) = test_store();
        let long = "h".repeat(store.config().max_hash_len + 1);
        let err = store.insert(record("contact", &long, "x")).unwrap_err();
        assert!(matches!(err, StoreError::OversizedEntry { component, .. } if component == "hash"));
        assert_eq!(store.log_entries(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.page_size = 0;
        let err = RecordStore::open(dir.path(), config).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig { .. }));
    }

    #[test]
    fn test_crash_recovery() {
        let dir = TempDir::new().unwrap();
        {
            let store = RecordStore::open(dir.path(), Config::bulk()).unwrap();
            store.insert(record("contact", "gone", "old")).unwrap();
            store.delete_scope("contact").unwrap();
            store.insert(record("contact", "kept1", "Ann")).unwrap();
            store.insert(record("contact", "kept2", "Bob")).unwrap();
            store.insert(record("survey", "s1", "Cy")).unwrap();
            store.sync().unwrap();
        }
        {
            let store = RecordStore::open(dir.path(), Config::default()).unwrap();
            assert_eq!(store.count("contact"), 2);
            assert_eq!(store.count("survey"), 1);
            assert!(store.get_by_hash("contact", "gone").is_none());
            assert_eq!(store.get_by_hash("contact", "kept2").unwrap().fields["name"], "Bob");
            assert_eq!(store.log_entries(), 5);
            // uniqueness survives a restart
            assert!(store.insert(record("contact", "kept1", "again")).is_err());
        }
    }

    #[test]
    fn test_list_default_order_and_paging() {
        let (store, _dir) = test_store();
        for i in (0..30).rev() {
            store.insert(record("contact", &format!("h{:02}", i), "x")).unwrap();
        }

        let first = store.list("contact", &ListQuery::new());
        assert_eq!(first.len(), 25);
        assert_eq!(first[0].hash, "h00");
        assert_eq!(first[24].hash, "h24");

        let second = store.list("contact", &ListQuery::new().page(1));
        assert_eq!(second.len(), 5);
        assert_eq!(second[0].hash, "h25");

        assert!(store.list("contact", &ListQuery::new().page(2)).is_empty());
        assert!(store.list("nobody", &ListQuery::new()).is_empty());
    }

    #[test]
    fn test_list_search_is_case_insensitive() {
        let (store, _dir) = test_store();
        for hash in ["xxABxx", "ab01", "zzz", "cAb", "a-b"] {
            store.insert(record("contact", hash, "x")).unwrap();
        }
        let hashes: Vec<_> = store
            .list("contact", &ListQuery::new().search("ab"))
            .into_iter()
            .map(|r| r.hash)
            .collect();
        assert_eq!(hashes, vec!["ab01", "cAb", "xxABxx"]);

        // blank search means no filter
        assert_eq!(store.list("contact", &ListQuery::new().search("  ")).len(), 5);
    }

    #[test]
    fn test_list_sort_columns() {
        let (store, _dir) = test_store();
        let mut r1 = record("contact", "a", "zed");
        r1.created_at = 300;
        let mut r2 = record("contact", "b", "amy");
        r2.created_at = 100;
        let mut r3 = record("contact", "c", "max");
        r3.created_at = 100;
        store.insert(r1).unwrap();
        store.insert(r2).unwrap();
        store.insert(r3).unwrap();

        let hashes = |q: ListQuery| -> Vec<String> {
            store.list("contact", &q).into_iter().map(|r| r.hash).collect()
        };

        assert_eq!(hashes(ListQuery::new().sort_by(SortColumn::Hash, SortOrder::Desc)), vec!["c", "b", "a"]);
        assert_eq!(hashes(ListQuery::new().sort_by(SortColumn::Data, SortOrder::Asc)), vec!["b", "c", "a"]);
        // equal timestamps fall back to hash ascending
        assert_eq!(hashes(ListQuery::new().sort_by(SortColumn::Imported, SortOrder::Asc)), vec!["b", "c", "a"]);
        assert_eq!(
            hashes(ListQuery::new()
                .sort_by(SortColumn::Imported, SortOrder::Desc)
                .sort_by(SortColumn::Hash, SortOrder::Desc)),
            vec!["a", "c", "b"]
        );
    }

    #[test]
    fn test_compact_then_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RecordStore::open(dir.path(), Config::default()).unwrap();
            for round in 0..3 {
                store.delete_scope("contact").unwrap();
                for i in 0..4 {
                    store.insert(record("contact", &format!("r{}-{}", round, i), "x")).unwrap();
                }
            }
            assert_eq!(store.log_entries(), 15);

            let result = store.maybe_compact().unwrap().expect("dead share is above the trigger");
            assert_eq!(result.live_entries, 4);
            assert_eq!(store.log_entries(), 4);
            assert!(store.maybe_compact().unwrap().is_none());

            // writes after compaction land in the new generation
            store.insert(record("contact", "after", "x")).unwrap();
        }
        let store = RecordStore::open(dir.path(), Config::default()).unwrap();
        assert_eq!(store.count("contact"), 5);
        assert!(store.get_by_hash("contact", "r2-0").is_some());
        assert!(store.get_by_hash("contact", "r0-0").is_none());
    }

    #[test]
    fn test_concurrent_inserts_keep_hashes_unique() {
        let (store, _dir) = test_store();
        let store = Arc::new(store);
        let mut handles = vec![];
        for t in 0..4 {
            let s = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let mut ok = 0;
                for i in 0..50 {
                    if s.insert(record("contact", &format!("k{}", i), &t.to_string())).is_ok() {
                        ok += 1;
                    }
                }
                ok
            }));
        }
        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 50);
        assert_eq!(store.count("contact"), 50);
    }
}

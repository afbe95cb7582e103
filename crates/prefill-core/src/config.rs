//! Configuration for the record store
//!
//! Two presets: `durable()` syncs the WAL after every write, `bulk()` leaves
//! syncing to the caller (one sync per import).

/// Record store configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Rows returned per page by `RecordStore::list`
    pub page_size: usize,
    /// Maximum scope identifier length in bytes
    pub max_scope_len: usize,
    /// Maximum hash length in bytes
    pub max_hash_len: usize,
    /// Maximum serialized field blob size in bytes
    pub max_fields_bytes: usize,
    /// WAL file rotation threshold (bytes)
    pub wal_rotation_size_bytes: u64,
    /// Compact the WAL when dead entries exceed this share of the log
    pub compaction_trigger_ratio: f64,
    /// Sync the WAL after every insert/delete
    pub sync_each_write: bool,
}

impl Config {
    /// Every write reaches disk before it is acknowledged.
    pub fn durable() -> Self {
        Self {
            page_size: 25,
            max_scope_len: 255,
            max_hash_len: 255,
            max_fields_bytes: 1024 * 1024,
            wal_rotation_size_bytes: 64 * 1024 * 1024,
            compaction_trigger_ratio: 0.5,
            sync_each_write: true,
        }
    }

    /// Imports append without fsync and call `RecordStore::sync` once at the end.
    pub fn bulk() -> Self {
        Self {
            sync_each_write: false,
            ..Self::durable()
        }
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page_size must be > 0".into());
        }
        if self.max_scope_len == 0 || self.max_scope_len > u16::MAX as usize {
            return Err("max_scope_len must be in [1, 65535]".into());
        }
        if self.max_hash_len == 0 || self.max_hash_len > u16::MAX as usize {
            return Err("max_hash_len must be in [1, 65535]".into());
        }
        if self.max_fields_bytes == 0 || self.max_fields_bytes > 64 * 1024 * 1024 {
            return Err("max_fields_bytes must be in [1, 64MB]".into());
        }
        if self.wal_rotation_size_bytes < 1024 * 1024 {
            return Err("wal_rotation_size_bytes must be >= 1MB".into());
        }
        if self.compaction_trigger_ratio <= 0.0 || self.compaction_trigger_ratio >= 1.0 {
            return Err("compaction_trigger_ratio must be in (0.0, 1.0)".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::durable() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        assert!(Config::durable().validate().is_ok());
        assert!(Config::bulk().validate().is_ok());
    }

    #[test]
    fn test_bulk_differs_only_in_sync() {
        let d = Config::durable();
        let b = Config::bulk();
        assert!(d.sync_each_write);
        assert!(!b.sync_each_write);
        assert_eq!(d.page_size, b.page_size);
        assert_eq!(d.page_size, 25);
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let mut c = Config::default();
        c.compaction_trigger_ratio = 1.0;
        assert!(c.validate().is_err());
        c.compaction_trigger_ratio = 0.3;
        c.page_size = 0;
        assert!(c.validate().is_err());
    }
}

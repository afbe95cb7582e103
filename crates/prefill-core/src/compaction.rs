//! Compaction: reclaim WAL space left by replaced scopes
//!
//! Every re-import deletes a scope and appends a fresh set of inserts, so
//! the log grows by one full copy of the scope per import. Compaction
//! writes only the live records into a new WAL generation and removes the
//! older files.
//!
//! Uses the atomic rename pattern:
//! 1. Write live entries to `wal-{next}.pfl.compact`
//! 2. durable_sync the new file
//! 3. Rename it to `wal-{next}.pfl`
//! 4. Sync the directory, then unlink older generations
//!
//! A crash before step 3 leaves an orphan `.compact` file that replay ignores.
//! A crash between 3 and 4 replays the old files and then the compacted one,
//! which re-inserts the same live set.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::format::{serialize_entry, WalEntry};
use crate::platform_durability::{durable_sync, sync_dir};
use crate::wal::{list_wal_files, wal_file_name};

/// Result of a compaction pass.
#[derive(Debug)]
pub struct CompactionResult {
    /// Entries in the log before compaction
    pub original_entries: usize,
    /// Entries written to the new generation
    pub live_entries: usize,
    /// Bytes across all WAL files before compaction
    pub original_bytes: u64,
    /// Size of the compacted file
    pub compacted_bytes: u64,
    /// Sequence number of the compacted file
    pub sequence: u64,
}

impl CompactionResult {
    /// Share of the original log that was dead (0.0 = none).
    pub fn dead_space_ratio(&self) -> f64 {
        if self.original_entries == 0 {
            return 0.0;
        }
        1.0 - self.live_entries as f64 / self.original_entries as f64
    }

    pub fn bytes_saved(&self) -> u64 {
        self.original_bytes.saturating_sub(self.compacted_bytes)
    }
}

/// True when dead entries make up at least `threshold` of the log.
pub fn needs_compaction(total_entries: usize, live_entries: usize, threshold: f64) -> bool {
    if total_entries == 0 {
        return false;
    }
    let dead = 1.0 - live_entries as f64 / total_entries as f64;
    dead >= threshold
}

fn io_err(path: &Path, e: std::io::Error, what: &str) -> StoreError {
    StoreError::Io {
        path: Some(path.to_path_buf()),
        kind: e.kind(),
        message: format!("{}: {}", what, e),
    }
}

/// Replace every WAL file in `wal_dir` with a single file holding `live`.
///
/// `next_sequence` must be greater than every existing sequence. The caller
/// must reopen its writer at `next_sequence` afterwards.
pub fn compact_wal(
    wal_dir: &Path,
    live: &[WalEntry],
    original_entries: usize,
    next_sequence: u64,
) -> StoreResult<CompactionResult> {
    let old_files = list_wal_files(wal_dir)?;
    let mut original_bytes = 0u64;
    for (_, path) in &old_files {
        original_bytes += fs::metadata(path)
            .map_err(|e| io_err(path, e, "Failed to stat WAL file for compaction"))?
            .len();
    }

    let final_path = wal_dir.join(wal_file_name(next_sequence));
    let compact_path = wal_dir.join(format!("{}.compact", wal_file_name(next_sequence)));

    {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&compact_path)
            .map_err(|e| io_err(&compact_path, e, "Failed to create compact file"))?;

        for entry in live {
            let bytes = serialize_entry(entry)?;
            file.write_all(&bytes)
                .map_err(|e| io_err(&compact_path, e, "Failed to write compacted entry"))?;
        }

        durable_sync(&file).map_err(|e| io_err(&compact_path, e, "Failed to sync compacted file"))?;
    }

    let compacted_bytes = fs::metadata(&compact_path)
        .map_err(|e| io_err(&compact_path, e, "Failed to stat compacted file"))?
        .len();

    fs::rename(&compact_path, &final_path)
        .map_err(|e| io_err(&final_path, e, "Failed to rename compacted file"))?;
    sync_dir(wal_dir).map_err(|e| io_err(wal_dir, e, "Failed to sync WAL directory"))?;

    for (seq, path) in old_files {
        if seq < next_sequence {
            fs::remove_file(&path).map_err(|e| io_err(&path, e, "Failed to remove old WAL file"))?;
        }
    }
    sync_dir(wal_dir).map_err(|e| io_err(wal_dir, e, "Failed to sync WAL directory"))?;

    Ok(CompactionResult {
        original_entries,
        live_entries: live.len(),
        original_bytes,
        compacted_bytes,
        sequence: next_sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{WalReader, WalWriter};
    use tempfile::TempDir;

    #[test]
    fn test_compact_keeps_only_live() {
        let tmp = TempDir::new().unwrap();
        let mut writer = WalWriter::new(tmp.path(), 1024 * 1024).unwrap();
        writer.append(&WalEntry::insert("s", "old1", b"{}".to_vec(), 1), false).unwrap();
        writer.append(&WalEntry::insert("s", "old2", b"{}".to_vec(), 1), false).unwrap();
        writer.append(&WalEntry::delete_scope("s", 2), false).unwrap();
        writer.append(&WalEntry::insert("s", "new1", b"{}".to_vec(), 2), true).unwrap();
        let next = writer.sequence() + 1;
        drop(writer);

        let live = vec![WalEntry::insert("s", "new1", b"{}".to_vec(), 2)];
        let result = compact_wal(tmp.path(), &live, 4, next).unwrap();

        assert_eq!(result.live_entries, 1);
        assert!((result.dead_space_ratio() - 0.75).abs() < f64::EPSILON);
        assert!(result.compacted_bytes < result.original_bytes);

        let files = list_wal_files(tmp.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, next);

        let entries = WalReader::new(tmp.path()).recover_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hash, "new1");
    }

    #[test]
    fn test_compact_to_empty() {
        let tmp = TempDir::new().unwrap();
        let mut writer = WalWriter::new(tmp.path(), 1024 * 1024).unwrap();
        writer.append(&WalEntry::insert("s", "a", b"{}".to_vec(), 1), true).unwrap();
        writer.append(&WalEntry::delete_scope("s", 2), true).unwrap();
        drop(writer);

        let result = compact_wal(tmp.path(), &[], 2, 1).unwrap();
        assert_eq!(result.live_entries, 0);
        assert_eq!(result.compacted_bytes, 0);
        assert!(WalReader::new(tmp.path()).recover_entries().unwrap().is_empty());
    }

    #[test]
    fn test_needs_compaction_threshold() {
        // 2 live out of 5 = 60% dead
        assert!(needs_compaction(5, 2, 0.5));
        assert!(!needs_compaction(5, 2, 0.7));
        assert!(!needs_compaction(0, 0, 0.1));
    }
}

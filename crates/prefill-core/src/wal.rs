//! Write-ahead log for the record store
//!
//! Every insert and scope delete is appended here before the in-memory index
//! changes. On open the log is replayed in sequence order to rebuild the index.
//!
//! Files are named `wal-<seq:016x>.pfl`; lexicographic order is replay order.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::format::{deserialize_entry, serialize_entry, WalEntry, HEADER_SIZE, MAGIC_ARRAY};
use crate::platform_durability::durable_sync;

pub(crate) const WAL_PREFIX: &str = "wal-";
pub(crate) const WAL_SUFFIX: &str = ".pfl";

pub(crate) fn wal_file_name(sequence: u64) -> String {
    format!("{}{:016x}{}", WAL_PREFIX, sequence, WAL_SUFFIX)
}

fn parse_sequence(name: &str) -> Option<u64> {
    let hex = name.strip_prefix(WAL_PREFIX)?.strip_suffix(WAL_SUFFIX)?;
    u64::from_str_radix(hex, 16).ok()
}

fn io_err(path: &Path, e: std::io::Error, what: &str) -> StoreError {
    StoreError::Io {
        path: Some(path.to_path_buf()),
        kind: e.kind(),
        message: format!("{}: {}", what, e),
    }
}

/// List WAL files in `wal_dir`, sorted by sequence.
pub(crate) fn list_wal_files(wal_dir: &Path) -> StoreResult<Vec<(u64, PathBuf)>> {
    let entries = std::fs::read_dir(wal_dir)
        .map_err(|e| io_err(wal_dir, e, "Failed to read WAL directory"))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(wal_dir, e, "Failed to read directory entry"))?;
        let path = entry.path();
        if let Some(seq) = path.file_name().and_then(|n| n.to_str()).and_then(parse_sequence) {
            files.push((seq, path));
        }
    }
    files.sort_by_key(|(seq, _)| *seq);
    Ok(files)
}

/// Appends entries to the current WAL file, rotating by size.
///
/// The caller must not touch the in-memory index until `append` returns Ok.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    size: u64,
    wal_dir: PathBuf,
    sequence: u64,
    rotation_size: u64,
}

impl WalWriter {
    /// Open the highest-numbered WAL file in `wal_dir` for append, creating it if needed.
    pub fn new<P: AsRef<Path>>(wal_dir: P, rotation_size: u64) -> StoreResult<Self> {
        let wal_dir = wal_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&wal_dir)
            .map_err(|e| io_err(&wal_dir, e, "Failed to create WAL directory"))?;

        let sequence = list_wal_files(&wal_dir)?
            .last()
            .map(|(seq, _)| *seq)
            .unwrap_or(0);
        Self::open_at(wal_dir, sequence, rotation_size)
    }

    pub(crate) fn open_at(wal_dir: PathBuf, sequence: u64, rotation_size: u64) -> StoreResult<Self> {
        let path = wal_dir.join(wal_file_name(sequence));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e, "Failed to open WAL file"))?;
        let size = file
            .metadata()
            .map_err(|e| io_err(&path, e, "Failed to stat WAL file"))?
            .len();

        Ok(Self { file, path, size, wal_dir, sequence, rotation_size })
    }

    /// Append one entry. With `durable`, the entry is synced before returning.
    pub fn append(&mut self, entry: &WalEntry, durable: bool) -> StoreResult<()> {
        let bytes = serialize_entry(entry)?;

        if self.size > 0 && self.size + bytes.len() as u64 > self.rotation_size {
            self.rotate()?;
        }

        self.file
            .write_all(&bytes)
            .map_err(|e| io_err(&self.path, e, "WAL write failed"))?;

        if durable {
            self.sync()?;
        }

        self.size += bytes.len() as u64;
        Ok(())
    }

    /// Sync the current file. Makes a run of non-durable appends durable at once.
    pub fn sync(&self) -> StoreResult<()> {
        durable_sync(&self.file).map_err(|e| io_err(&self.path, e, "WAL sync failed"))
    }

    fn rotate(&mut self) -> StoreResult<()> {
        self.sync()?;
        let next = Self::open_at(self.wal_dir.clone(), self.sequence + 1, self.rotation_size)?;
        *self = next;
        Ok(())
    }

    pub fn current_path(&self) -> &Path {
        &self.path
    }

    pub fn current_size(&self) -> u64 {
        self.size
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Replays WAL files for recovery.
pub struct WalReader {
    wal_dir: PathBuf,
}

impl WalReader {
    pub fn new<P: AsRef<Path>>(wal_dir: P) -> Self {
        Self { wal_dir: wal_dir.as_ref().to_path_buf() }
    }

    /// Read every recoverable entry from all WAL files, in sequence order.
    ///
    /// Per file:
    /// 1. Bad magic: scan forward to the next magic and resync
    /// 2. Entry runs past EOF: torn write at the crash point, stop this file
    /// 3. Checksum or layout error: skip to the next magic
    pub fn recover_entries(&self) -> StoreResult<Vec<WalEntry>> {
        let mut all = Vec::new();
        for (_, path) in list_wal_files(&self.wal_dir)? {
            all.extend(self.recover_from_file(&path)?);
        }
        Ok(all)
    }

    fn recover_from_file(&self, path: &Path) -> StoreResult<Vec<WalEntry>> {
        let mut buffer = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut buffer))
            .map_err(|e| io_err(path, e, "Failed to read WAL file"))?;

        let mut entries = Vec::new();
        let mut offset = 0;

        while offset + HEADER_SIZE <= buffer.len() {
            if buffer[offset..offset + 4] != MAGIC_ARRAY {
                log::warn!("WAL {}: bad magic at offset {}, resyncing", path.display(), offset);
                match find_next_magic(&buffer, offset + 1) {
                    Some(next) => { offset = next; continue; }
                    None => break,
                }
            }

            let length = u32::from_le_bytes([
                buffer[offset + 4], buffer[offset + 5],
                buffer[offset + 6], buffer[offset + 7],
            ]) as usize;
            let total = HEADER_SIZE + length;

            if offset + total > buffer.len() {
                log::warn!(
                    "WAL {}: torn write at offset {}: need {} bytes, have {}",
                    path.display(), offset, total, buffer.len() - offset
                );
                break;
            }

            match deserialize_entry(&buffer[offset..offset + total]) {
                Ok(entry) => {
                    entries.push(entry);
                    offset += total;
                }
                Err(e) => {
                    log::warn!("WAL {}: corrupt entry at offset {}: {}", path.display(), offset, e);
                    match find_next_magic(&buffer, offset + 1) {
                        Some(next) => { offset = next; continue; }
                        None => break,
                    }
                }
            }
        }

        Ok(entries)
    }
}

fn find_next_magic(buffer: &[u8], start: usize) -> Option<usize> {
    if buffer.len() < 4 || start > buffer.len() - 4 {
        return None;
    }
    (start..=buffer.len() - 4).find(|&i| buffer[i..i + 4] == MAGIC_ARRAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Operation;
    use tempfile::TempDir;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_append_then_recover() {
        let temp = TempDir::new().unwrap();
        let mut writer = WalWriter::new(temp.path(), MB).unwrap();
        writer.append(&WalEntry::insert("contact", "h1", b"{}".to_vec(), 1), true).unwrap();
        writer.append(&WalEntry::insert("contact", "h2", b"{}".to_vec(), 1), false).unwrap();
        writer.append(&WalEntry::delete_scope("contact", 2), true).unwrap();
        drop(writer);

        let entries = WalReader::new(temp.path()).recover_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].hash, "h1");
        assert_eq!(entries[1].hash, "h2");
        assert_eq!(entries[2].operation, Operation::DeleteScope);
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let temp = TempDir::new().unwrap();
        let mut writer = WalWriter::new(temp.path(), MB).unwrap();
        writer.append(&WalEntry::insert("s", "first", b"{}".to_vec(), 0), true).unwrap();
        let first_len = writer.current_size() as usize;
        writer.append(&WalEntry::insert("s", "second", b"{}".to_vec(), 0), true).unwrap();
        writer.append(&WalEntry::insert("s", "third", b"{}".to_vec(), 0), true).unwrap();
        let path = writer.current_path().to_path_buf();
        drop(writer);

        let mut data = std::fs::read(&path).unwrap();
        // flip a payload byte of the second entry
        data[first_len + HEADER_SIZE + 20] ^= 0xFF;
        std::fs::write(&path, data).unwrap();

        let hashes: Vec<_> = WalReader::new(temp.path())
            .recover_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.hash)
            .collect();
        assert_eq!(hashes, vec!["first", "third"]);
    }

    #[test]
    fn test_torn_write_stops_cleanly() {
        let temp = TempDir::new().unwrap();
        let mut writer = WalWriter::new(temp.path(), MB).unwrap();
        writer.append(&WalEntry::insert("s", "complete", b"{}".to_vec(), 0), true).unwrap();
        let path = writer.current_path().to_path_buf();
        drop(writer);

        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&MAGIC_ARRAY);
        data.extend_from_slice(&[0xFF, 0x00, 0x00, 0x00]);
        data.extend_from_slice(&[0u8; 24]);
        std::fs::write(&path, data).unwrap();

        let entries = WalReader::new(temp.path()).recover_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hash, "complete");
    }

    #[test]
    fn test_rotation_creates_next_file() {
        let temp = TempDir::new().unwrap();
        let big = vec![b'x'; 600 * 1024];
        let mut writer = WalWriter::new(temp.path(), MB).unwrap();
        writer.append(&WalEntry::insert("s", "a", big.clone(), 0), false).unwrap();
        writer.append(&WalEntry::insert("s", "b", big, 0), false).unwrap();
        assert_eq!(writer.sequence(), 1);
        drop(writer);

        assert_eq!(list_wal_files(temp.path()).unwrap().len(), 2);
        let entries = WalReader::new(temp.path()).recover_entries().unwrap();
        assert_eq!(entries.len(), 2);

        // reopening resumes at the highest sequence
        let writer = WalWriter::new(temp.path(), MB).unwrap();
        assert_eq!(writer.sequence(), 1);
    }

    #[test]
    fn test_file_naming() {
        assert_eq!(wal_file_name(0), "wal-0000000000000000.pfl");
        assert_eq!(parse_sequence("wal-00000000000000ff.pfl"), Some(255));
        assert_eq!(parse_sequence("wal-00000000000000ff.pfl.compact"), None);
        assert_eq!(parse_sequence("data-0001.pfl"), None);
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();
        assert!(WalReader::new(temp.path()).recover_entries().unwrap().is_empty());
    }
}

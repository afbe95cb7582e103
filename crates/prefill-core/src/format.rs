//! Binary format definitions for WAL entries
//!
//! All WAL entries follow a consistent format:
//! ChunkHeader (32 bytes) + scope_len(u16) + hash_len(u16) + fields_len(u32)
//! + operation(u8) + padding(u8) + created_at(i64) + scope + hash + fields

use std::path::PathBuf;

use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying WAL entries: "PFIL" in ASCII
pub const MAGIC_ARRAY: [u8; 4] = [0x50, 0x46, 0x49, 0x4C];

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// Fixed part of the payload before the variable-length bytes
const PAYLOAD_FIXED: usize = 2 + 2 + 4 + 1 + 1 + 8;

/// WAL operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    /// Insert one record
    Insert = 1,
    /// Remove every record of a scope
    DeleteScope = 2,
}

impl Operation {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Operation::Insert),
            2 => Some(Operation::DeleteScope),
            _ => None,
        }
    }
}

/// Fixed-size header for each WAL entry
///
/// Layout:
///   [0..4]   magic:      "PFIL"
///   [4..8]   length:     u32  - payload length in bytes
///   [8..12]  checksum:   u32  - CRC32C of payload bytes
///   [12]     entry_type: u8   - operation type
///   [13..32] reserved, zero
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeader {
    pub magic: [u8; 4],
    pub length: u32,
    pub checksum: u32,
    pub entry_type: u8,
}

impl ChunkHeader {
    pub fn new(length: u32, checksum: u32, op: Operation) -> Self {
        Self { magic: MAGIC_ARRAY, length, checksum, entry_type: op as u8 }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12] = self.entry_type;
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            entry_type: bytes[12],
        }
    }
}

/// Decoded WAL entry. `hash` and `fields` are empty for `DeleteScope`.
#[derive(Debug, Clone)]
pub struct WalEntry {
    pub operation: Operation,
    pub scope: String,
    pub hash: String,
    /// JSON field blob, still encoded
    pub fields: Vec<u8>,
    pub created_at: i64,
}

impl WalEntry {
    pub fn insert(scope: &str, hash: &str, fields: Vec<u8>, created_at: i64) -> Self {
        Self {
            operation: Operation::Insert,
            scope: scope.to_string(),
            hash: hash.to_string(),
            fields,
            created_at,
        }
    }

    pub fn delete_scope(scope: &str, created_at: i64) -> Self {
        Self {
            operation: Operation::DeleteScope,
            scope: scope.to_string(),
            hash: String::new(),
            fields: Vec::new(),
            created_at,
        }
    }
}

fn check_len(len: usize, max: usize, component: &str) -> StoreResult<()> {
    if len > max {
        return Err(StoreError::OversizedEntry {
            entry_size: len as u64,
            max_size: max as u64,
            component: component.to_string(),
        });
    }
    Ok(())
}

/// Serialize an entry into header + payload bytes.
pub fn serialize_entry(entry: &WalEntry) -> StoreResult<Vec<u8>> {
    // Reject before allocating
    check_len(entry.scope.len(), u16::MAX as usize, "scope")?;
    check_len(entry.hash.len(), u16::MAX as usize, "hash")?;
    check_len(entry.fields.len(), u32::MAX as usize, "fields")?;

    let payload_size = PAYLOAD_FIXED + entry.scope.len() + entry.hash.len() + entry.fields.len();
    let mut payload = Vec::with_capacity(payload_size);
    payload.extend_from_slice(&(entry.scope.len() as u16).to_le_bytes());
    payload.extend_from_slice(&(entry.hash.len() as u16).to_le_bytes());
    payload.extend_from_slice(&(entry.fields.len() as u32).to_le_bytes());
    payload.push(entry.operation as u8);
    payload.push(0);
    payload.extend_from_slice(&entry.created_at.to_le_bytes());
    payload.extend_from_slice(entry.scope.as_bytes());
    payload.extend_from_slice(entry.hash.as_bytes());
    payload.extend_from_slice(&entry.fields);

    let header = ChunkHeader::new(payload.len() as u32, crc32c::crc32c(&payload), entry.operation);

    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(&payload);
    Ok(buffer)
}

fn corrupted(offset: usize, reason: String) -> StoreError {
    StoreError::WalCorrupted { path: PathBuf::from("<buffer>"), offset: offset as u64, reason }
}

/// Deserialize one entry from the start of `data`.
pub fn deserialize_entry(data: &[u8]) -> StoreResult<WalEntry> {
    if data.len() < HEADER_SIZE {
        return Err(corrupted(0, format!("Entry too short: {} bytes, need at least {}", data.len(), HEADER_SIZE)));
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&data[..HEADER_SIZE]);
    let header = ChunkHeader::from_bytes(&header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(StoreError::NoMagicFound {
            path: PathBuf::from("<buffer>"),
            offset: 0,
            found_bytes: header.magic,
        });
    }

    let payload_end = HEADER_SIZE + header.length as usize;
    if data.len() < payload_end {
        return Err(StoreError::TornWrite {
            path: PathBuf::from("<buffer>"),
            expected_size: header.length,
            available_bytes: (data.len() - HEADER_SIZE) as u64,
            offset: HEADER_SIZE as u64,
        });
    }

    let payload = &data[HEADER_SIZE..payload_end];
    let computed = crc32c::crc32c(payload);
    if computed != header.checksum {
        return Err(StoreError::ChecksumMismatch {
            path: PathBuf::from("<buffer>"),
            expected: header.checksum,
            actual: computed,
            offset: HEADER_SIZE as u64,
        });
    }

    if payload.len() < PAYLOAD_FIXED {
        return Err(corrupted(HEADER_SIZE, "Payload too short for header fields".to_string()));
    }

    let scope_len = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    let hash_len = u16::from_le_bytes([payload[2], payload[3]]) as usize;
    let fields_len = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]) as usize;
    let operation = Operation::from_byte(payload[8])
        .ok_or_else(|| corrupted(HEADER_SIZE + 8, format!("Invalid operation type: {}", payload[8])))?;
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&payload[10..18]);
    let created_at = i64::from_le_bytes(ts);

    let scope_end = PAYLOAD_FIXED + scope_len;
    let hash_end = scope_end + hash_len;
    let fields_end = hash_end + fields_len;
    if payload.len() < fields_end {
        return Err(corrupted(HEADER_SIZE, format!(
            "Payload too short: need {} bytes for scope({}) + hash({}) + fields({})",
            fields_end, scope_len, hash_len, fields_len
        )));
    }

    let scope = String::from_utf8(payload[PAYLOAD_FIXED..scope_end].to_vec())
        .map_err(|_| corrupted(HEADER_SIZE + PAYLOAD_FIXED, "Scope is not UTF-8".to_string()))?;
    let hash = String::from_utf8(payload[scope_end..hash_end].to_vec())
        .map_err(|_| corrupted(HEADER_SIZE + scope_end, "Hash is not UTF-8".to_string()))?;

    Ok(WalEntry {
        operation,
        scope,
        hash,
        fields: payload[hash_end..fields_end].to_vec(),
        created_at,
    })
}

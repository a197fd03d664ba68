//! Persisted pool-meta descriptor and its on-disk codec.
//!
//! The record describes the pool's geometry and location so a restarted
//! chunkserver can refuse to serve a pool whose files it would misread. It
//! is a human-readable JSON document padded with NUL bytes to exactly
//! [`META_FILE_SIZE`] bytes and written through an `O_SYNC` handle; a CRC
//! over the meaningful fields guards against torn or tampered records.

use std::path::Path;

use serde::{Deserialize, Serialize};

use rbs_fs::{LocalFs, OpenFlags};
use rbs_types::{make_error_msg, PoolCode, Result, Status, StatusCode};

/// Exact size of the persisted pool-meta record.
pub const META_FILE_SIZE: u32 = 4096;

/// Block alignment assumed for records that predate the `block_size` field.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Tag mixed into the meta checksum so records from other file formats
/// never verify.
const MAGIC: &[u8; 16] = b"RBS_CHUNK_POOL_1";

/// The pool's persistent descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMeta {
    /// Bytes in each chunk's data region.
    pub chunk_size: u32,
    /// Bytes in the header page prepended to each chunk file.
    pub meta_page_size: u32,
    /// Device block alignment. `None` in records written before the field
    /// existed; readers substitute [`DEFAULT_BLOCK_SIZE`].
    pub block_size: Option<u32>,
    /// Directory holding the reserve files.
    pub pool_dir: String,
}

/// On-disk form of [`PoolMeta`]: the descriptor fields plus the checksum.
#[derive(Serialize, Deserialize)]
struct MetaRecord {
    chunk_size: u32,
    meta_page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    block_size: Option<u32>,
    pool_dir: String,
    crc32: u32,
}

impl PoolMeta {
    /// CRC-32 over `MAGIC ∥ chunk_size ∥ meta_page_size ∥ [block_size] ∥
    /// pool_dir` with little-endian numeric fields. `block_size` is hashed
    /// only when present, so old records keep verifying.
    pub fn crc32(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(MAGIC);
        hasher.update(&self.chunk_size.to_le_bytes());
        hasher.update(&self.meta_page_size.to_le_bytes());
        if let Some(block_size) = self.block_size {
            hasher.update(&block_size.to_le_bytes());
        }
        hasher.update(self.pool_dir.as_bytes());
        hasher.finalize()
    }

    /// Write the record to `path` as exactly [`META_FILE_SIZE`] bytes with
    /// synchronous I/O.
    pub fn encode(&self, fs: &dyn LocalFs, path: &Path) -> Result<()> {
        let record = MetaRecord {
            chunk_size: self.chunk_size,
            meta_page_size: self.meta_page_size,
            block_size: self.block_size,
            pool_dir: self.pool_dir.clone(),
            crc32: self.crc32(),
        };
        let doc = serde_json::to_string_pretty(&record)
            .map_err(|e| Status::with_message(StatusCode::UNKNOWN, format!("serialize pool meta: {}", e)))?;
        if doc.len() > META_FILE_SIZE as usize {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!("pool meta document too large: {} bytes", doc.len()),
            );
        }

        let mut buf = vec![0u8; META_FILE_SIZE as usize];
        buf[..doc.len()].copy_from_slice(doc.as_bytes());

        let file = fs
            .open(path, OpenFlags::read_write().with_create().with_sync())
            .map_err(|e| io_status("open", path, e))?;
        file.write_all_at(&buf, 0)
            .map_err(|e| io_status("write", path, e))?;
        Ok(())
    }

    /// Read `expected_size` bytes from `path` and reconstruct the meta.
    ///
    /// Fails with [`PoolCode::CORRUPT_META`] on a short file, an unparsable
    /// document, a missing required field, or a checksum mismatch.
    pub fn decode(fs: &dyn LocalFs, path: &Path, expected_size: u32) -> Result<PoolMeta> {
        let file = fs
            .open(path, OpenFlags::read_only())
            .map_err(|e| io_status("open", path, e))?;
        let mut buf = vec![0u8; expected_size as usize];
        file.read_exact_at(&mut buf, 0).map_err(|e| {
            Status::with_message(
                PoolCode::CORRUPT_META,
                format!("short pool meta {}: {}", path.display(), e),
            )
        })?;

        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let record: MetaRecord = serde_json::from_slice(&buf[..end]).map_err(|e| {
            Status::with_message(
                PoolCode::CORRUPT_META,
                format!("parse pool meta {}: {}", path.display(), e),
            )
        })?;

        if record.block_size.is_none() {
            tracing::warn!(
                path = %path.display(),
                default = DEFAULT_BLOCK_SIZE,
                "pool meta has no block_size, using default"
            );
        }

        let meta = PoolMeta {
            chunk_size: record.chunk_size,
            meta_page_size: record.meta_page_size,
            block_size: record.block_size,
            pool_dir: record.pool_dir,
        };
        let calculated = meta.crc32();
        if calculated != record.crc32 {
            return make_error_msg(
                PoolCode::CORRUPT_META,
                format!(
                    "pool meta crc mismatch in {}: calculated {} recorded {}",
                    path.display(),
                    calculated,
                    record.crc32
                ),
            );
        }
        Ok(meta)
    }
}

fn io_status(op: &str, path: &Path, err: std::io::Error) -> Status {
    Status::with_message(
        StatusCode::IO_ERROR,
        format!("{} {}: {}", op, path.display(), err),
    )
}

//! Pool configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rbs_config::{from_toml_value, Config, ConfigError};

use crate::meta::META_FILE_SIZE;

/// Predicate deciding whether a file name found under the copyset or
/// recycle tree counts as an allocated chunk.
pub type IsAllocatedFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Largest zero-fill segment the cleaner may use.
const MAX_BYTES_PER_WRITE: u32 = 1 << 20;

/// Configuration of one [`FilePool`](crate::FilePool) instance.
///
/// When a persisted pool meta exists, its geometry fields override
/// `file_size`, `meta_page_size`, `block_size` and `file_pool_dir` at
/// initialization.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Directory holding the reserve files.
    pub file_pool_dir: PathBuf,
    /// Path of the persisted pool-meta record.
    pub meta_path: PathBuf,
    /// Size of the pool-meta record. Must be exactly [`META_FILE_SIZE`].
    pub meta_file_size: u32,
    /// Bytes in each chunk's data region.
    pub file_size: u32,
    /// Bytes in the header page prepended to each chunk file.
    pub meta_page_size: u32,
    /// Device block alignment.
    pub block_size: u32,
    /// When false every acquire synthesizes a fresh file: no scan, no
    /// formatting, no cleaning.
    pub get_file_from_pool: bool,
    /// Reserve target in bytes. Recomputed from `allocated_percent` when
    /// `allocated_by_percent` is set.
    pub file_pool_size: u64,
    pub allocated_by_percent: bool,
    /// Percentage of the filesystem to reserve, in (0, 100].
    pub allocated_percent: u32,
    /// Parallelism of the startup formatting phase.
    pub format_thread_num: u32,
    /// Pause between two allocations of one format worker. Positive;
    /// adjustable at runtime.
    pub format_interval_ms: u64,
    /// Whether recycled chunks are re-zeroed in the background.
    pub need_clean: bool,
    /// Zero-fill segment size for the cleaner. 4 KiB aligned, at most 1 MiB.
    pub bytes_per_write: u32,
    /// Cleaner IOPS budget. Zero disables throttling.
    pub iops4clean: u32,
    /// Attempts per `get_file` call.
    pub retry_times: u32,
    /// `enough_chunk` threshold.
    pub chunk_reserved: u64,
    /// Copyset tree counted into `chunk_num` at scan time.
    pub copyset_dir: Option<PathBuf>,
    /// Recycler tree counted into `chunk_num` at scan time.
    pub recycle_dir: Option<PathBuf>,
    /// Classifier for names under `copyset_dir` / `recycle_dir`. `None`
    /// counts nothing.
    #[serde(skip)]
    pub is_allocated: Option<IsAllocatedFn>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            file_pool_dir: PathBuf::from("./chunk_pool"),
            meta_path: PathBuf::from("./chunk_pool.meta"),
            meta_file_size: META_FILE_SIZE,
            file_size: 16 * 1024 * 1024,
            meta_page_size: 4096,
            block_size: 4096,
            get_file_from_pool: true,
            file_pool_size: 0,
            allocated_by_percent: false,
            allocated_percent: 80,
            format_thread_num: 1,
            format_interval_ms: 100,
            need_clean: false,
            bytes_per_write: 4096,
            iops4clean: 0,
            retry_times: 5,
            chunk_reserved: 0,
            copyset_dir: None,
            recycle_dir: None,
            is_allocated: None,
        }
    }
}

impl fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolOptions")
            .field("file_pool_dir", &self.file_pool_dir)
            .field("meta_path", &self.meta_path)
            .field("meta_file_size", &self.meta_file_size)
            .field("file_size", &self.file_size)
            .field("meta_page_size", &self.meta_page_size)
            .field("block_size", &self.block_size)
            .field("get_file_from_pool", &self.get_file_from_pool)
            .field("file_pool_size", &self.file_pool_size)
            .field("allocated_by_percent", &self.allocated_by_percent)
            .field("allocated_percent", &self.allocated_percent)
            .field("format_thread_num", &self.format_thread_num)
            .field("format_interval_ms", &self.format_interval_ms)
            .field("need_clean", &self.need_clean)
            .field("bytes_per_write", &self.bytes_per_write)
            .field("iops4clean", &self.iops4clean)
            .field("retry_times", &self.retry_times)
            .field("chunk_reserved", &self.chunk_reserved)
            .field("copyset_dir", &self.copyset_dir)
            .field("recycle_dir", &self.recycle_dir)
            .field("is_allocated", &self.is_allocated.is_some())
            .finish()
    }
}

impl PoolOptions {
    /// Total length of one chunk file: header page plus data region.
    pub fn chunk_len(&self) -> u64 {
        self.file_size as u64 + self.meta_page_size as u64
    }
}

impl Config for PoolOptions {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_value(value)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.file_size == 0 || self.meta_page_size == 0 {
            return Err(ConfigError::Invalid(
                "file_size and meta_page_size must be positive".into(),
            ));
        }
        if self.meta_file_size != META_FILE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "meta_file_size must be {}, got {}",
                META_FILE_SIZE, self.meta_file_size
            )));
        }
        if self.format_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "format_interval_ms must be positive".into(),
            ));
        }
        if self.format_thread_num == 0 {
            return Err(ConfigError::Invalid(
                "format_thread_num must be positive".into(),
            ));
        }
        if self.retry_times == 0 {
            return Err(ConfigError::Invalid("retry_times must be positive".into()));
        }
        if self.get_file_from_pool {
            if self.bytes_per_write == 0
                || self.bytes_per_write > MAX_BYTES_PER_WRITE
                || self.bytes_per_write % 4096 != 0
            {
                return Err(ConfigError::Invalid(format!(
                    "bytes_per_write must be in [1, {}] and 4K aligned, got {}",
                    MAX_BYTES_PER_WRITE, self.bytes_per_write
                )));
            }
            if self.allocated_by_percent
                && (self.allocated_percent == 0 || self.allocated_percent > 100)
            {
                return Err(ConfigError::Invalid(format!(
                    "allocated_percent must be in (0, 100], got {}",
                    self.allocated_percent
                )));
            }
        }
        Ok(())
    }

    fn hot_update(&mut self, newer: &Self) {
        self.format_interval_ms = newer.format_interval_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_validate() {
        PoolOptions::default().validate().unwrap();
    }

    #[test]
    fn test_chunk_len() {
        let options = PoolOptions {
            file_size: 1 << 20,
            meta_page_size: 4096,
            ..Default::default()
        };
        assert_eq!(options.chunk_len(), (1 << 20) + 4096);
    }

    #[test]
    fn test_rejects_unaligned_bytes_per_write() {
        for bad in [0u32, 4095, 4097, (1 << 20) + 4096] {
            let options = PoolOptions {
                bytes_per_write: bad,
                ..Default::default()
            };
            assert!(options.validate().is_err(), "accepted {}", bad);
        }
        let options = PoolOptions {
            bytes_per_write: 1 << 20,
            ..Default::default()
        };
        options.validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_format_interval() {
        let options = PoolOptions {
            format_interval_ms: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_allocated_percent() {
        for bad in [0u32, 101] {
            let options = PoolOptions {
                allocated_by_percent: true,
                allocated_percent: bad,
                ..Default::default()
            };
            assert!(options.validate().is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_rejects_wrong_meta_file_size() {
        let options = PoolOptions {
            meta_file_size: 8192,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_hot_update_touches_only_format_interval() {
        let mut current = PoolOptions::default();
        let newer = PoolOptions {
            format_interval_ms: 7,
            file_size: 1,
            retry_times: 99,
            ..Default::default()
        };
        current.hot_update(&newer);
        assert_eq!(current.format_interval_ms, 7);
        assert_eq!(current.file_size, PoolOptions::default().file_size);
        assert_eq!(current.retry_times, PoolOptions::default().retry_times);
    }

    #[test]
    fn test_from_toml() {
        let value: toml::Value = r#"
            file_pool_dir = "/data/pool"
            file_size = 1048576
            format_thread_num = 4
            need_clean = true
        "#
        .parse()
        .unwrap();
        let options = PoolOptions::from_toml(&value).unwrap();
        assert_eq!(options.file_pool_dir, PathBuf::from("/data/pool"));
        assert_eq!(options.file_size, 1048576);
        assert_eq!(options.format_thread_num, 4);
        assert!(options.need_clean);
        // Unlisted fields fall back to defaults.
        assert_eq!(options.meta_page_size, 4096);
    }
}

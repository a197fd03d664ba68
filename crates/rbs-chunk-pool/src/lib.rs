//! Pre-allocated chunk file pool for the RBS chunkserver.
//!
//! Writable blocks in the storage engine are fixed-size files: a metadata
//! page followed by a data region. Creating one on demand (create,
//! fallocate, zero-fill, fsync, rename) is far too slow for the write path,
//! and reusing a recycled file without reclaiming it first would leak stale
//! data to a new tenant. The pool keeps a reservoir of ready files on a
//! local filesystem, hands them out atomically, takes recycled files back,
//! and re-zeroes dirty ones in the background under an IOPS budget.

pub mod meta;
pub mod options;
pub mod pool;
pub mod state;

pub use meta::{PoolMeta, DEFAULT_BLOCK_SIZE, META_FILE_SIZE};
pub use options::{IsAllocatedFn, PoolOptions};
pub use pool::{FilePool, CLEAN_CHUNK_SUFFIX};
pub use state::{FormatStat, PoolState};

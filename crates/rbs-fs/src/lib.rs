//! Abstraction over the local filesystem used by the chunkserver.
//!
//! The chunk file pool borrows a [`LocalFs`] handle instead of owning one,
//! so tests and alternative backends can slot in behind the same trait.
//! All methods return `std::io::Result`; callers translate errors into
//! their own status codes. `ErrorKind::AlreadyExists` from
//! [`LocalFs::rename_noreplace`] is the one error kind callers are expected
//! to match on.

pub mod posix;

pub use posix::PosixFs;

use std::io;
use std::path::Path;

/// How [`FsFile::allocate`] manipulates the file's extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocateMode {
    /// Reserve extents without touching their contents (`fallocate(0)`).
    Reserve,
    /// Zero the byte range at extent level (`FALLOC_FL_ZERO_RANGE`).
    ZeroRange,
}

/// Options for [`LocalFs::open`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub write: bool,
    pub create: bool,
    pub sync: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn read_write() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    /// Create the file if it does not exist.
    pub fn with_create(mut self) -> Self {
        self.create = true;
        self
    }

    /// Open with `O_SYNC`: every write reaches the device before returning.
    pub fn with_sync(mut self) -> Self {
        self.sync = true;
        self
    }
}

/// Filesystem usage as reported by `statfs(2)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsUsage {
    /// Total size of the filesystem in bytes.
    pub total: u64,
    /// Bytes available to unprivileged callers.
    pub available: u64,
}

/// An open file handle.
pub trait FsFile: Send {
    /// Fill `buf` from the given offset, erroring on a short read.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()>;

    /// Write all of `buf` at the given offset.
    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()>;

    /// Flush data and metadata to the device (`fsync`).
    fn sync(&self) -> io::Result<()>;

    /// Current file size (`fstat`).
    fn file_size(&self) -> io::Result<u64>;

    /// Manipulate the file's extents (`fallocate`).
    fn allocate(&self, mode: AllocateMode, offset: u64, len: u64) -> io::Result<()>;
}

/// The local filesystem operations the pool depends on.
pub trait LocalFs: Send + Sync {
    fn open(&self, path: &Path, flags: OpenFlags) -> io::Result<Box<dyn FsFile>>;

    fn delete(&self, path: &Path) -> io::Result<()>;

    fn mkdir(&self, path: &Path) -> io::Result<()>;

    fn dir_exists(&self, path: &Path) -> bool;

    fn file_exists(&self, path: &Path) -> bool;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Rename refusing to replace an existing target (`RENAME_NOREPLACE`).
    ///
    /// Fails with `ErrorKind::AlreadyExists` when `to` is already present.
    fn rename_noreplace(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// File names in `dir`, without `.` and `..`.
    fn list(&self, dir: &Path) -> io::Result<Vec<String>>;

    fn statfs(&self, path: &Path) -> io::Result<FsUsage>;
}

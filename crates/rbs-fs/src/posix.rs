//! Production [`LocalFs`] backed by POSIX syscalls.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::{AllocateMode, FsFile, FsUsage, LocalFs, OpenFlags};

/// Local filesystem implementation over `std::fs` plus the libc calls the
/// standard library does not cover (`fallocate`, `renameat2`, `statfs`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixFs;

impl PosixFs {
    pub fn new() -> Self {
        Self
    }
}

struct PosixFile {
    file: File,
}

impl FsFile for PosixFile {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        FileExt::read_exact_at(&self.file, buf, offset)
    }

    fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        FileExt::write_all_at(&self.file, buf, offset)
    }

    fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn file_size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn allocate(&self, mode: AllocateMode, offset: u64, len: u64) -> io::Result<()> {
        let raw_mode = match mode {
            AllocateMode::Reserve => 0,
            AllocateMode::ZeroRange => libc::FALLOC_FL_ZERO_RANGE,
        };
        let ret = unsafe {
            libc::fallocate(
                self.file.as_raw_fd(),
                raw_mode,
                offset as libc::off_t,
                len as libc::off_t,
            )
        };
        if ret == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if mode == AllocateMode::ZeroRange && zero_range_unsupported(&err) {
            return self.zero_fill(offset, len);
        }
        Err(err)
    }
}

impl PosixFile {
    /// Fallback for filesystems without `FALLOC_FL_ZERO_RANGE` support.
    fn zero_fill(&self, offset: u64, len: u64) -> io::Result<()> {
        const SEGMENT: usize = 1 << 20;
        let zeros = vec![0u8; SEGMENT.min(len as usize)];
        let mut written = 0u64;
        while written < len {
            let n = ((len - written) as usize).min(zeros.len());
            FileExt::write_all_at(&self.file, &zeros[..n], offset + written)?;
            written += n as u64;
        }
        Ok(())
    }
}

fn zero_range_unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EOPNOTSUPP) | Some(libc::EINVAL)
    )
}

fn cpath(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))
}

impl LocalFs for PosixFs {
    fn open(&self, path: &Path, flags: OpenFlags) -> io::Result<Box<dyn FsFile>> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(flags.write);
        if flags.create {
            opts.create(true);
        }
        if flags.sync {
            opts.custom_flags(libc::O_SYNC);
        }
        let file = opts.open(path)?;
        Ok(Box::new(PosixFile { file }))
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn rename_noreplace(&self, from: &Path, to: &Path) -> io::Result<()> {
        let old = cpath(from)?;
        let new = cpath(to)?;
        let ret = unsafe {
            libc::renameat2(
                libc::AT_FDCWD,
                old.as_ptr(),
                libc::AT_FDCWD,
                new.as_ptr(),
                libc::RENAME_NOREPLACE,
            )
        };
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().into_string().map_err(|name| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("non-UTF8 file name: {:?}", name),
                )
            })?;
            names.push(name);
        }
        Ok(names)
    }

    fn statfs(&self, path: &Path) -> io::Result<FsUsage> {
        let c = cpath(path)?;
        let mut st: libc::statfs = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::statfs(c.as_ptr(), &mut st) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(FsUsage {
            total: st.f_blocks as u64 * st.f_bsize as u64,
            available: st.f_bavail as u64 * st.f_bsize as u64,
        })
    }
}

//! The chunk file pool.
//!
//! One `FilePool` owns a directory of preallocated chunk files. Foreground
//! callers acquire files with [`FilePool::get_file`] and return deleted ones
//! with [`FilePool::recycle_file`]; a startup formatting phase fills the
//! reservoir and a background cleaner re-zeroes recycled chunks. All queue
//! and counter state lives behind one mutex; the condition variable carries
//! both formatting progress and queue refills to blocked acquirers.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use rbs_config::Config;
use rbs_fs::{AllocateMode, LocalFs, OpenFlags};
use rbs_types::{make_error_msg, ChunkId, PoolCode, Result, Status, StatusCode};
use rbs_utils::{Sleeper, Throttle};

use crate::meta::{PoolMeta, DEFAULT_BLOCK_SIZE};
use crate::options::PoolOptions;
use crate::state::{FormatStat, PoolState};

/// Suffix of a pooled file whose whole extent is known to be zero.
pub const CLEAN_CHUNK_SUFFIX: &str = ".clean";

const SUCCESS_SLEEP: Duration = Duration::from_millis(10);
const FAIL_SLEEP: Duration = Duration::from_millis(500);

/// Queue and counter state guarded by the pool mutex.
#[derive(Default)]
struct Queues {
    dirty: Vec<ChunkId>,
    clean: Vec<ChunkId>,
    dirty_left: u64,
    clean_left: u64,
    preallocated_left: u64,
    chunk_num: u64,
}

impl Queues {
    fn pop_dirty(&mut self) -> Option<ChunkId> {
        let id = self.dirty.pop()?;
        self.dirty_left -= 1;
        self.preallocated_left -= 1;
        Some(id)
    }

    fn pop_clean(&mut self) -> Option<ChunkId> {
        let id = self.clean.pop()?;
        self.clean_left -= 1;
        self.preallocated_left -= 1;
        Some(id)
    }

    fn push_dirty(&mut self, id: ChunkId) {
        self.dirty.push(id);
        self.dirty_left += 1;
        self.preallocated_left += 1;
    }

    fn push_clean(&mut self, id: ChunkId) {
        self.clean.push(id);
        self.clean_left += 1;
        self.preallocated_left += 1;
    }
}

struct PoolCore {
    fs: Arc<dyn LocalFs>,
    options: RwLock<PoolOptions>,
    queues: Mutex<Queues>,
    cond: Condvar,
    /// Next id to assign. Strictly greater than every id ever assigned:
    /// every consumer takes the value returned by `fetch_add`.
    max_file_num: AtomicU64,
    format_stat: FormatStat,
    format_alived: AtomicBool,
    clean_alived: AtomicBool,
    format_sleeper: Sleeper,
    clean_sleeper: Sleeper,
    clean_throttle: Throttle,
}

/// The pre-allocated chunk file pool.
pub struct FilePool {
    core: Arc<PoolCore>,
    format_thread: Mutex<Option<JoinHandle<()>>>,
    clean_thread: Mutex<Option<JoinHandle<()>>>,
}

impl FilePool {
    /// Create a pool over a borrowed filesystem handle. Nothing touches the
    /// disk until [`FilePool::initialize`].
    pub fn new(fs: Arc<dyn LocalFs>, options: PoolOptions) -> Self {
        Self {
            core: Arc::new(PoolCore {
                fs,
                options: RwLock::new(options),
                queues: Mutex::new(Queues::default()),
                cond: Condvar::new(),
                max_file_num: AtomicU64::new(1),
                format_stat: FormatStat::new(),
                format_alived: AtomicBool::new(false),
                clean_alived: AtomicBool::new(false),
                format_sleeper: Sleeper::new(),
                clean_sleeper: Sleeper::new(),
                clean_throttle: Throttle::new(0),
            }),
            format_thread: Mutex::new(None),
            clean_thread: Mutex::new(None),
        }
    }

    /// Validate configuration and meta, rebuild the in-memory state from the
    /// pool directory, and start the formatting phase.
    pub fn initialize(&self) -> Result<()> {
        {
            let options = self.core.options.read();
            options
                .validate()
                .map_err(|e| Status::with_message(StatusCode::INVALID_CONFIG, e.to_string()))?;
        }

        if !self.core.options.read().get_file_from_pool {
            let dir = self.core.options.read().file_pool_dir.clone();
            if !self.core.fs.dir_exists(&dir) {
                self.core
                    .fs
                    .mkdir(&dir)
                    .map_err(|e| io_status("mkdir", &dir, e))?;
            }
            return Ok(());
        }

        self.core.verify_meta()?;
        self.core.scan()?;
        self.core.prepare_format()?;

        self.core.format_alived.store(true, Ordering::SeqCst);
        self.core.format_sleeper.reset();
        let core = Arc::clone(&self.core);
        *self.format_thread.lock() = Some(std::thread::spawn(move || core.format_worker()));
        Ok(())
    }

    /// Hand out one chunk as `target`.
    ///
    /// The header page is written and fsynced into the source file, which is
    /// then renamed to `target` refusing to replace an existing file. An
    /// existing target aborts immediately with [`PoolCode::ALREADY_EXISTS`];
    /// other I/O failures are retried up to `retry_times`.
    pub fn get_file(&self, target: &Path, meta_page: &[u8], need_clean: bool) -> Result<()> {
        let (from_pool, retry_times, meta_page_size, dir) = {
            let options = self.core.options.read();
            (
                options.get_file_from_pool,
                options.retry_times,
                options.meta_page_size,
                options.file_pool_dir.clone(),
            )
        };
        if meta_page.len() != meta_page_size as usize {
            return make_error_msg(
                StatusCode::INVALID_ARG,
                format!(
                    "meta page must be {} bytes, got {}",
                    meta_page_size,
                    meta_page.len()
                ),
            );
        }

        let mut last_err = Status::new(StatusCode::UNKNOWN);
        let mut retry = 0;
        while retry < retry_times {
            let src = if from_pool {
                let (id, is_clean) = match self.core.get_chunk(need_clean) {
                    Ok(popped) => popped,
                    Err(e) => {
                        tracing::error!(error = %e, "no available chunk");
                        return Err(e);
                    }
                };
                self.core.chunk_path(id, is_clean)
            } else {
                let id = self.core.max_file_num.fetch_add(1, Ordering::SeqCst);
                let path = dir.join(id.to_string());
                if let Err(e) = self.core.allocate_chunk(&path) {
                    tracing::error!(path = %path.display(), error = %e, "file allocate failed");
                    last_err = e;
                    retry += 1;
                    continue;
                }
                path
            };

            match self.core.write_meta_page(&src, meta_page) {
                Ok(()) => match self.core.fs.rename_noreplace(&src, target) {
                    Ok(()) => {
                        tracing::info!(
                            target = %target.display(),
                            pool_size = self.size(),
                            "get file success"
                        );
                        return Ok(());
                    }
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        tracing::error!(
                            target = %target.display(),
                            src = %src.display(),
                            "target already exists"
                        );
                        return make_error_msg(
                            PoolCode::ALREADY_EXISTS,
                            format!("{} already exists", target.display()),
                        );
                    }
                    Err(e) => {
                        tracing::error!(src = %src.display(), error = %e, "file rename failed");
                        last_err = io_status("rename", &src, e);
                    }
                },
                Err(e) => {
                    tracing::error!(src = %src.display(), error = %e, "write meta page failed");
                    last_err = e;
                }
            }
            retry += 1;
        }
        Err(last_err)
    }

    /// Take a deleted chunk file back into the pool.
    ///
    /// A file whose size does not match the pool geometry was never a real
    /// pool chunk (or is corrupt) and is deleted instead of being queued.
    pub fn recycle_file(&self, path: &Path) -> Result<()> {
        let (from_pool, chunk_len) = {
            let options = self.core.options.read();
            (options.get_file_from_pool, options.chunk_len())
        };

        if !from_pool {
            return self.core.fs.delete(path).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "recycle delete failed");
                io_status("delete", path, e)
            });
        }

        match self.core.stat_file(path) {
            Ok(size) if size == chunk_len => {}
            Ok(size) => {
                tracing::error!(
                    path = %path.display(),
                    expected = chunk_len,
                    actual = size,
                    "recycled file size illegal, deleting"
                );
                return self
                    .core
                    .fs
                    .delete(path)
                    .map_err(|e| io_status("delete", path, e));
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "recycled file unreadable, deleting");
                return self
                    .core
                    .fs
                    .delete(path)
                    .map_err(|e| io_status("delete", path, e));
            }
        }

        let id = {
            let _queues = self.core.queues.lock();
            ChunkId(self.core.max_file_num.fetch_add(1, Ordering::SeqCst))
        };
        let target = self.core.chunk_path(id, false);
        self.core.fs.rename(path, &target).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "recycle rename failed");
            io_status("rename", path, e)
        })?;

        {
            let mut queues = self.core.queues.lock();
            queues.push_dirty(id);
            tracing::info!(
                path = %path.display(),
                chunk = %id,
                pool_size = queues.preallocated_left,
                "recycled file into pool"
            );
        }
        self.core.cond.notify_all();
        Ok(())
    }

    /// Start the background cleaner. No-op unless `need_clean` is set, and
    /// idempotent while a cleaner is running.
    pub fn start_cleaning(&self) {
        let (need_clean, rate) = {
            let options = self.core.options.read();
            (
                options.need_clean,
                options.iops4clean as u64 * options.bytes_per_write as u64,
            )
        };
        if need_clean && !self.core.clean_alived.swap(true, Ordering::SeqCst) {
            self.core.clean_throttle.set_rate(rate);
            self.core.clean_sleeper.reset();
            let core = Arc::clone(&self.core);
            *self.clean_thread.lock() = Some(std::thread::spawn(move || core.clean_worker()));
            tracing::info!("clean thread started");
        }
    }

    /// Stop the background cleaner and join it. The join is bounded by one
    /// sleep interval.
    pub fn stop_cleaning(&self) {
        if self.core.clean_alived.swap(false, Ordering::SeqCst) {
            tracing::info!("stopping cleaner");
            self.core.clean_sleeper.interrupt();
            if let Some(handle) = self.clean_thread.lock().take() {
                let _ = handle.join();
            }
            tracing::info!("clean thread stopped");
        }
    }

    /// Block until the formatting phase created every targeted chunk (or
    /// failed), then join the worker. Returns whether it completed.
    pub fn wait_format_done(&self) -> bool {
        {
            let mut queues = self.core.queues.lock();
            while !self.core.format_stat.done() && !self.core.format_stat.is_wrong() {
                self.core.cond.wait(&mut queues);
            }
        }
        if let Some(handle) = self.format_thread.lock().take() {
            let _ = handle.join();
        }
        !self.core.format_stat.is_wrong()
    }

    /// Ask the format workers to exit and join them. The join is bounded by
    /// one format interval.
    pub fn stop_formatting(&self) {
        if self.core.format_alived.swap(false, Ordering::SeqCst) {
            tracing::info!("stopping formatter");
            self.core.format_sleeper.interrupt();
            if let Some(handle) = self.format_thread.lock().take() {
                let _ = handle.join();
            }
            tracing::info!("format thread stopped");
        }
    }

    /// Stop formatting and drop the in-memory queues. The files stay on disk
    /// and are rediscovered by the next initialization.
    pub fn uninitialize(&self) {
        self.stop_formatting();
        let mut queues = self.core.queues.lock();
        queues.dirty.clear();
        queues.clean.clear();
        queues.dirty_left = 0;
        queues.clean_left = 0;
        queues.preallocated_left = 0;
    }

    /// Number of preallocated chunks currently available.
    pub fn size(&self) -> u64 {
        self.core.queues.lock().preallocated_left
    }

    /// Whether the reserve satisfies the configured threshold.
    pub fn enough_chunk(&self) -> bool {
        self.size() >= self.core.options.read().chunk_reserved
    }

    /// Counter snapshot.
    pub fn state(&self) -> PoolState {
        let options = self.core.options.read();
        let queues = self.core.queues.lock();
        PoolState {
            chunk_size: options.file_size,
            meta_page_size: options.meta_page_size,
            block_size: options.block_size,
            dirty_left: queues.dirty_left,
            clean_left: queues.clean_left,
            preallocated_left: queues.preallocated_left,
            chunk_num: queues.chunk_num,
        }
    }

    /// Formatting progress and error flag.
    pub fn format_stat(&self) -> &FormatStat {
        &self.core.format_stat
    }

    /// Current options, including any fields overridden by the meta file.
    pub fn options(&self) -> PoolOptions {
        self.core.options.read().clone()
    }

    /// Change the pause between format allocations at runtime.
    pub fn set_format_interval(&self, interval_ms: u64) -> Result<()> {
        if interval_ms == 0 {
            return make_error_msg(StatusCode::INVALID_ARG, "format interval must be positive");
        }
        self.core.options.write().format_interval_ms = interval_ms;
        Ok(())
    }
}

impl Drop for FilePool {
    fn drop(&mut self) {
        self.stop_cleaning();
        self.uninitialize();
    }
}

impl PoolCore {
    fn chunk_path(&self, id: ChunkId, clean: bool) -> PathBuf {
        let options = self.options.read();
        if clean {
            options
                .file_pool_dir
                .join(format!("{}{}", id, CLEAN_CHUNK_SUFFIX))
        } else {
            options.file_pool_dir.join(id.to_string())
        }
    }

    fn stat_file(&self, path: &Path) -> io::Result<u64> {
        let file = self.fs.open(path, OpenFlags::read_write())?;
        file.file_size()
    }

    /// Reconcile configured geometry with the persisted meta. The meta wins:
    /// a pool formatted with one geometry must never be served with another.
    fn verify_meta(&self) -> Result<()> {
        let meta_path = self.options.read().meta_path.clone();
        let meta_file_size = self.options.read().meta_file_size;
        if !self.fs.file_exists(&meta_path) {
            tracing::info!(
                path = %meta_path.display(),
                "pool meta not found, first initialization"
            );
            return Ok(());
        }

        let meta = PoolMeta::decode(self.fs.as_ref(), &meta_path, meta_file_size)?;
        let mut options = self.options.write();
        if options.file_size != meta.chunk_size {
            tracing::warn!(
                old = options.file_size,
                new = meta.chunk_size,
                "resetting file size from pool meta"
            );
            options.file_size = meta.chunk_size;
        }
        if options.meta_page_size != meta.meta_page_size {
            tracing::warn!(
                old = options.meta_page_size,
                new = meta.meta_page_size,
                "resetting meta page size from pool meta"
            );
            options.meta_page_size = meta.meta_page_size;
        }
        let block_size = meta.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        if options.block_size != block_size {
            tracing::warn!(
                old = options.block_size,
                new = block_size,
                "resetting block size from pool meta"
            );
            options.block_size = block_size;
        }
        let pool_dir = PathBuf::from(&meta.pool_dir);
        if options.file_pool_dir != pool_dir {
            tracing::warn!(
                old = %options.file_pool_dir.display(),
                new = %pool_dir.display(),
                "resetting pool dir from pool meta"
            );
            options.file_pool_dir = pool_dir;
        }
        Ok(())
    }

    /// Rebuild both queues from the pool directory. Any entry that is not a
    /// correctly-sized chunk file with a numeric name fails startup: the
    /// pool refuses to serve rather than hand out a malformed chunk.
    fn scan(&self) -> Result<()> {
        let options = self.options.read().clone();
        let dir = &options.file_pool_dir;
        if !self.fs.dir_exists(dir) {
            self.fs.mkdir(dir).map_err(|e| io_status("mkdir", dir, e))?;
        }

        let entries = self.fs.list(dir).map_err(|e| io_status("list", dir, e))?;
        let chunk_len = options.chunk_len();
        let mut dirty = Vec::new();
        let mut clean = Vec::new();
        let mut max_seen = 0u64;

        for name in &entries {
            let (stem, is_clean) = match name.strip_suffix(CLEAN_CHUNK_SUFFIX) {
                Some(stem) => (stem, true),
                None => (name.as_str(), false),
            };
            if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
                return make_error_msg(
                    PoolCode::INCONSISTENT_POOL,
                    format!("illegal file name in pool dir: {}", name),
                );
            }
            let id: u64 = stem.parse().map_err(|_| {
                Status::with_message(
                    PoolCode::INCONSISTENT_POOL,
                    format!("illegal file name in pool dir: {}", name),
                )
            })?;

            let path = dir.join(name);
            if !self.fs.file_exists(&path) {
                return make_error_msg(
                    PoolCode::INCONSISTENT_POOL,
                    format!("pool dir has a non-regular entry: {}", path.display()),
                );
            }
            let size = self
                .stat_file(&path)
                .map_err(|e| io_status("stat", &path, e))?;
            if size != chunk_len {
                return make_error_msg(
                    PoolCode::INCONSISTENT_POOL,
                    format!(
                        "chunk file size illegal: {} is {} bytes, expected {}",
                        path.display(),
                        size,
                        chunk_len
                    ),
                );
            }

            // Id 0 is reserved: counted, never queued.
            if id != 0 {
                if is_clean {
                    clean.push(ChunkId(id));
                } else {
                    dirty.push(ChunkId(id));
                }
                max_seen = max_seen.max(id);
            }
        }

        let mut chunk_num = entries.len() as u64;
        if let Some(copyset_dir) = &options.copyset_dir {
            chunk_num += self.count_allocated(copyset_dir, &options);
        }
        if let Some(recycle_dir) = &options.recycle_dir {
            chunk_num += self.count_allocated(recycle_dir, &options);
        }

        let mut queues = self.queues.lock();
        queues.dirty_left = dirty.len() as u64;
        queues.clean_left = clean.len() as u64;
        queues.preallocated_left = queues.dirty_left + queues.clean_left;
        queues.chunk_num = chunk_num;
        queues.dirty = dirty;
        queues.clean = clean;
        self.max_file_num.store(max_seen + 1, Ordering::SeqCst);
        tracing::info!(
            dir = %dir.display(),
            pool_size = queues.preallocated_left,
            chunk_num = queues.chunk_num,
            "pool scan done"
        );
        Ok(())
    }

    /// Count allocated chunks under `path`, recursing into subdirectories.
    /// Listing failures are logged and count as zero; a missing copyset tree
    /// must not block pool startup.
    fn count_allocated(&self, path: &Path, options: &PoolOptions) -> u64 {
        let entries = match self.fs.list(path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to list allocated dir");
                return 0;
            }
        };

        let mut count = 0;
        for name in entries {
            let full = path.join(&name);
            if self.fs.dir_exists(&full) {
                count += self.count_allocated(&full, options);
            } else if let Some(is_allocated) = &options.is_allocated {
                if is_allocated(&name) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Size the formatting phase from the filesystem's capacity.
    fn prepare_format(&self) -> Result<()> {
        let mut options = self.options.write();
        let usage = self
            .fs
            .statfs(&options.file_pool_dir)
            .map_err(|e| io_status("statfs", &options.file_pool_dir, e))?;

        if options.allocated_by_percent {
            options.file_pool_size = usage.total * options.allocated_percent as u64 / 100;
        }

        let bytes_per_page = options.file_size as u64 + options.meta_file_size as u64;
        let chunk_num = self.queues.lock().chunk_num;

        if options.file_pool_size / bytes_per_page <= chunk_num {
            tracing::info!(chunk_num, "pool already at target size, nothing to format");
            self.format_stat.set_target(0);
            return Ok(());
        }

        let need_space = options.file_pool_size - chunk_num * bytes_per_page;
        tracing::info!(
            total = usage.total,
            available = usage.available,
            need = need_space,
            "sizing pool formatting"
        );
        if usage.available < need_space {
            return make_error_msg(
                PoolCode::NO_SPACE,
                format!(
                    "disk free space not enough: need {} bytes, available {}",
                    need_space, usage.available
                ),
            );
        }

        let target = (need_space / bytes_per_page) as u32;
        self.format_stat.set_target(target);
        tracing::info!(pre_allocate_num = target, "prepared formatting");
        Ok(())
    }

    /// Parent of the format phase: reserves the id range, runs the format
    /// tasks, joins them.
    fn format_worker(self: Arc<Self>) {
        let thread_num = self.options.read().format_thread_num;
        let offset = self
            .max_file_num
            .fetch_add(self.format_stat.target() as u64, Ordering::SeqCst);
        let next_index = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::with_capacity(thread_num as usize);
        for _ in 0..thread_num {
            let core = Arc::clone(&self);
            let next_index = Arc::clone(&next_index);
            handles.push(std::thread::spawn(move || {
                core.format_task(offset, &next_index)
            }));
        }
        for handle in handles {
            let _ = handle.join();
        }

        if self.format_stat.is_wrong() {
            tracing::error!("chunk formatting failed");
        } else {
            tracing::info!(created = self.format_stat.progress(), "format worker done");
        }
    }

    fn format_task(&self, offset: u64, next_index: &AtomicU32) {
        tracing::debug!("format thread started");
        while !self.format_stat.is_wrong() && self.format_alived.load(Ordering::SeqCst) {
            let index = next_index.fetch_add(1, Ordering::SeqCst);
            if index >= self.format_stat.target() {
                // Back off the overshoot so the counter stays equal to the
                // number of chunks actually claimed.
                next_index.fetch_sub(1, Ordering::SeqCst);
                break;
            }

            let interval = Duration::from_millis(self.options.read().format_interval_ms);
            self.format_sleeper.wait_for(interval);

            let id = ChunkId(offset + index as u64);
            let path = self.chunk_path(id, true);
            if let Err(e) = self.allocate_chunk(&path) {
                tracing::error!(path = %path.display(), error = %e, "chunk format failed");
                self.format_stat.set_wrong();
                self.cond.notify_all();
                break;
            }

            {
                let mut queues = self.queues.lock();
                queues.push_clean(id);
                queues.chunk_num += 1;
                self.format_stat.inc_progress();
            }
            self.cond.notify_all();
        }
        tracing::debug!("format thread done");
    }

    /// Create one new pool file: open-create, reserve extents, zero-fill,
    /// fsync. This is the slow path the pool exists to keep off the write
    /// critical section.
    fn allocate_chunk(&self, path: &Path) -> Result<()> {
        let chunk_len = self.options.read().chunk_len();
        let file = self
            .fs
            .open(path, OpenFlags::read_write().with_create())
            .map_err(|e| io_status("open", path, e))?;
        file.allocate(AllocateMode::Reserve, 0, chunk_len)
            .map_err(|e| io_status("fallocate", path, e))?;

        let zeros = vec![0u8; chunk_len as usize];
        file.write_all_at(&zeros, 0)
            .map_err(|e| io_status("write", path, e))?;
        file.sync().map_err(|e| io_status("fsync", path, e))?;
        Ok(())
    }

    /// Pop one chunk, preferring dirty for callers that overwrite everything
    /// anyway and clean for callers that need zeroes. Blocks while the
    /// formatting phase is still running and both queues are empty.
    fn get_chunk(&self, need_clean: bool) -> Result<(ChunkId, bool)> {
        let popped = {
            let mut queues = self.queues.lock();
            if !self.format_stat.done() {
                while !(self.format_stat.done()
                    || self.format_stat.is_wrong()
                    || !queues.dirty.is_empty()
                    || !queues.clean.is_empty())
                {
                    self.cond.wait(&mut queues);
                }
            }
            if need_clean {
                queues
                    .pop_clean()
                    .map(|id| (id, true))
                    .or_else(|| queues.pop_dirty().map(|id| (id, false)))
            } else {
                queues
                    .pop_dirty()
                    .map(|id| (id, false))
                    .or_else(|| queues.pop_clean().map(|id| (id, true)))
            }
        };

        let (id, is_clean) = match popped {
            Some(popped) => popped,
            None => return make_error_msg(PoolCode::POOL_EMPTY, "no preallocated chunk left"),
        };

        if need_clean && !is_clean {
            // Outside the lock. On failure the id stays out of the queues;
            // the file survives on disk and the next restart scan recovers it.
            self.clean_chunk(id, true, None)?;
            return Ok((id, true));
        }
        Ok((id, is_clean))
    }

    /// Write the caller's header page at offset 0 and fsync.
    fn write_meta_page(&self, path: &Path, meta_page: &[u8]) -> Result<()> {
        let file = self
            .fs
            .open(path, OpenFlags::read_write())
            .map_err(|e| io_status("open", path, e))?;
        file.write_all_at(meta_page, 0)
            .map_err(|e| io_status("write", path, e))?;
        file.sync().map_err(|e| io_status("fsync", path, e))?;
        Ok(())
    }

    fn clean_worker(&self) {
        let bytes_per_write = self.options.read().bytes_per_write as usize;
        // One zero buffer for the whole worker lifetime.
        let zero_buf = vec![0u8; bytes_per_write];

        let mut interval = SUCCESS_SLEEP;
        while self.clean_sleeper.wait_for(interval) {
            interval = if self.clean_one(&zero_buf) {
                SUCCESS_SLEEP
            } else {
                FAIL_SLEEP
            };
        }
    }

    /// Reclaim one dirty chunk. Returns false when the dirty queue is empty
    /// or the reclaim failed (the id is put back).
    fn clean_one(&self, zero_buf: &[u8]) -> bool {
        let id = match self.queues.lock().pop_dirty() {
            Some(id) => id,
            None => return false,
        };

        if let Err(e) = self.clean_chunk(id, false, Some(zero_buf)) {
            tracing::warn!(chunk = %id, error = %e, "clean chunk failed");
            self.queues.lock().push_dirty(id);
            return false;
        }

        tracing::info!(chunk = %id, "clean chunk success");
        self.queues.lock().push_clean(id);
        self.cond.notify_all();
        true
    }

    /// Re-zero a dirty chunk and retag it with the clean suffix.
    ///
    /// `only_marked` zeroes at extent level in one call; the full path
    /// overwrites the file in `bytes_per_write` segments, fsyncing and
    /// paying the throttle after each one.
    fn clean_chunk(&self, id: ChunkId, only_marked: bool, zero_buf: Option<&[u8]>) -> Result<()> {
        let (chunk_len, bytes_per_write) = {
            let options = self.options.read();
            (options.chunk_len(), options.bytes_per_write as u64)
        };
        let path = self.chunk_path(id, false);
        let file = self
            .fs
            .open(&path, OpenFlags::read_write())
            .map_err(|e| io_status("open", &path, e))?;

        if only_marked {
            file.allocate(AllocateMode::ZeroRange, 0, chunk_len)
                .map_err(|e| io_status("fallocate", &path, e))?;
        } else {
            let owned;
            let zeros = match zero_buf {
                Some(buf) => buf,
                None => {
                    owned = vec![0u8; bytes_per_write as usize];
                    &owned
                }
            };
            let mut written = 0u64;
            while written < chunk_len {
                let n = (chunk_len - written).min(bytes_per_write) as usize;
                file.write_all_at(&zeros[..n], written)
                    .map_err(|e| io_status("write", &path, e))?;
                file.sync().map_err(|e| io_status("fsync", &path, e))?;
                self.clean_throttle.acquire(bytes_per_write);
                written += n as u64;
            }
        }
        drop(file);

        let target = self.chunk_path(id, true);
        self.fs
            .rename(&path, &target)
            .map_err(|e| io_status("rename", &path, e))?;
        Ok(())
    }
}

fn io_status(op: &str, path: &Path, err: io::Error) -> Status {
    Status::with_message(
        StatusCode::IO_ERROR,
        format!("{} {}: {}", op, path.display(), err),
    )
}

//! Observable pool state.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Snapshot of the pool's aggregate counters, taken under the pool mutex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolState {
    /// Bytes in each chunk's data region.
    pub chunk_size: u32,
    /// Bytes in the header page of each chunk file.
    pub meta_page_size: u32,
    /// Device block alignment.
    pub block_size: u32,
    /// Chunks waiting to be re-zeroed.
    pub dirty_left: u64,
    /// Chunks known to be all-zero.
    pub clean_left: u64,
    /// `dirty_left + clean_left`.
    pub preallocated_left: u64,
    /// Chunks created by scan and formatting, plus allocated files counted
    /// under the copyset and recycle trees.
    pub chunk_num: u64,
}

/// Progress of the startup formatting phase.
///
/// The target is fixed once by `prepare_format`; the progress counter and
/// the sticky error flag are updated by the format workers and read by
/// acquisition waiters without the pool mutex.
#[derive(Debug, Default)]
pub struct FormatStat {
    pre_allocate_num: AtomicU32,
    allocate_chunk_num: AtomicU32,
    is_wrong: AtomicBool,
}

impl FormatStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of chunks the formatter must create and restart the
    /// progress counter.
    pub fn set_target(&self, target: u32) {
        self.pre_allocate_num.store(target, Ordering::SeqCst);
        self.allocate_chunk_num.store(0, Ordering::SeqCst);
        self.is_wrong.store(false, Ordering::SeqCst);
    }

    pub fn target(&self) -> u32 {
        self.pre_allocate_num.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> u32 {
        self.allocate_chunk_num.load(Ordering::SeqCst)
    }

    pub fn inc_progress(&self) {
        self.allocate_chunk_num.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether every targeted chunk has been created. Also true when the
    /// target is zero, so a pool with nothing to format never blocks
    /// acquirers.
    pub fn done(&self) -> bool {
        self.progress() == self.target()
    }

    /// Mark the format phase failed. Sticky for the phase's lifetime.
    pub fn set_wrong(&self) {
        self.is_wrong.store(true, Ordering::SeqCst);
    }

    pub fn is_wrong(&self) -> bool {
        self.is_wrong.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_stat_lifecycle() {
        let stat = FormatStat::new();
        assert!(stat.done()); // 0 of 0

        stat.set_target(3);
        assert_eq!(stat.target(), 3);
        assert_eq!(stat.progress(), 0);
        assert!(!stat.done());

        stat.inc_progress();
        stat.inc_progress();
        stat.inc_progress();
        assert!(stat.done());
    }

    #[test]
    fn test_set_target_resets_progress_and_error() {
        let stat = FormatStat::new();
        stat.set_target(1);
        stat.inc_progress();
        stat.set_wrong();

        stat.set_target(2);
        assert_eq!(stat.progress(), 0);
        assert!(!stat.is_wrong());
    }

    #[test]
    fn test_is_wrong_is_sticky() {
        let stat = FormatStat::new();
        stat.set_target(5);
        stat.set_wrong();
        stat.inc_progress();
        assert!(stat.is_wrong());
    }
}

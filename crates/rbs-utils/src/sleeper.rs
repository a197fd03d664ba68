use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A cooperative-cancellable sleep.
///
/// Background workers sleep on a `Sleeper` instead of `thread::sleep` so a
/// shutdown can wake them immediately instead of waiting out the interval.
/// Once interrupted the sleeper stays interrupted (every later `wait_for`
/// returns at once) until `reset` is called, which lets a stopped worker be
/// started again.
pub struct Sleeper {
    interrupted: Mutex<bool>,
    cond: Condvar,
}

impl Sleeper {
    pub fn new() -> Self {
        Self {
            interrupted: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Sleep for up to `timeout`.
    ///
    /// Returns `true` when the full interval elapsed and `false` when the
    /// sleeper was interrupted (before or during the wait).
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut interrupted = self.interrupted.lock();
        if *interrupted {
            return false;
        }
        let _ = self.cond.wait_for(&mut interrupted, timeout);
        !*interrupted
    }

    /// Wake every current waiter and make future waits return immediately.
    pub fn interrupt(&self) {
        let mut interrupted = self.interrupted.lock();
        *interrupted = true;
        self.cond.notify_all();
    }

    /// Clear the interrupted flag so the sleeper can be reused.
    pub fn reset(&self) {
        *self.interrupted.lock() = false;
    }
}

impl Default for Sleeper {
    fn default() -> Self {
        Self::new()
    }
}

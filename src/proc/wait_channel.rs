use std::sync::{Arc, Condvar};
use std::time::Duration;

use crate::kernel::KernelGuard;
use crate::ok_or;

/// A condition to sleep on, paired with the kernel mutex.
///
/// Every channel handle obtained by cloning refers to the same underlying
/// condition, so callers clone a channel out of the kernel state first and
/// then hand over the guard to `sleep`.
#[derive(Clone)]
pub struct WaitChannel {
    cond: Arc<Condvar>,
}

impl WaitChannel {
    pub fn new() -> Self {
        Self {
            cond: Arc::new(Condvar::new()),
        }
    }

    /// Atomically releases the kernel mutex and sleeps on this channel.
    /// Reacquires the mutex when awakened. Wakeups may be spurious; callers
    /// re-check their predicate in a loop.
    pub fn sleep<'s>(&self, guard: KernelGuard<'s>) -> KernelGuard<'s> {
        ok_or!(self.cond.wait(guard), panic!("kernel mutex poisoned"))
    }

    /// Like `sleep`, but gives up after `dur`. The returned flag is true when
    /// the wait timed out.
    pub fn sleep_timeout<'s>(
        &self,
        guard: KernelGuard<'s>,
        dur: Duration,
    ) -> (KernelGuard<'s>, bool) {
        let (guard, result) = ok_or!(
            self.cond.wait_timeout(guard, dur),
            panic!("kernel mutex poisoned")
        );
        (guard, result.timed_out())
    }

    /// Wakes up all threads sleeping on this channel.
    pub fn wakeup(&self) {
        self.cond.notify_all();
    }

    /// Wakes up at most one thread sleeping on this channel.
    pub fn wakeup_one(&self) {
        self.cond.notify_one();
    }
}

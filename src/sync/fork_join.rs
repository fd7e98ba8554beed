use crate::util::Backoff;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counts outstanding forked work and lets one or more threads wait for it
/// to reach zero.
///
/// Every `add(n)` must happen before the `n` matching decrements, which
/// means registering children before submitting them. Waiters spin for a
/// short while before parking, since many searches finish in microseconds.
#[derive(Debug, Default)]
pub struct ForkJoinCounter {
    count: AtomicU64,
    lock: Mutex<()>,
    zero: Condvar,
}

impl ForkJoinCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    pub fn increment(&self) {
        self.add(1);
    }

    /// # Panics
    ///
    /// If the count is already zero.
    pub fn decrement(&self) {
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            self.count.fetch_add(1, Ordering::AcqRel);
            panic!("ForkJoinCounter decremented below zero");
        }
        if previous == 1 {
            // Taking the lock orders this notify after any waiter's
            // check-then-wait.
            let _guard = self.lock.lock();
            self.zero.notify_all();
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Blocks until the count is zero.
    pub fn wait(&self) {
        if self.spin_until_zero() {
            return;
        }
        let mut guard = self.lock.lock();
        while self.count() != 0 {
            self.zero.wait(&mut guard);
        }
    }

    /// Blocks until the count is zero or `timeout` elapsed. Returns whether
    /// the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.spin_until_zero() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        while self.count() != 0 {
            if self.zero.wait_until(&mut guard, deadline).timed_out() {
                return self.count() == 0;
            }
        }
        true
    }

    /// Sets the count back to zero, releasing any waiters.
    pub fn reset(&self) {
        let _guard = self.lock.lock();
        self.count.store(0, Ordering::Release);
        self.zero.notify_all();
    }

    fn spin_until_zero(&self) -> bool {
        let mut backoff = Backoff::new();
        while !backoff.is_completed() {
            if self.count() == 0 {
                return true;
            }
            backoff.snooze();
        }
        self.count() == 0
    }
}

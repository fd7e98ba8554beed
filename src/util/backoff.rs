//! Spin-then-yield backoff for short waits that usually end quickly.

use std::hint::spin_loop;
use std::thread;

/// Exponential backoff that gives up after a bounded number of steps, at
/// which point the caller is expected to block instead.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;

    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// One backoff step: spin `2^step` times while cheap, then yield.
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
        } else {
            thread::yield_now();
        }

        if self.step <= Self::YIELD_LIMIT {
            self.step += 1;
        }
    }

    /// True once spinning and yielding are exhausted.
    pub fn is_completed(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }
}

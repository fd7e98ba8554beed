use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::info;

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Sense {
    Minimize,
    Maximize,
}

impl Sense {
    /// The value every real solution improves on.
    pub fn worst(self) -> i64 {
        match self {
            Sense::Minimize => i64::MAX,
            Sense::Maximize => i64::MIN,
        }
    }

    /// Whether `candidate` is strictly better than `current`.
    pub fn improves(self, candidate: i64, current: i64) -> bool {
        match self {
            Sense::Minimize => candidate < current,
            Sense::Maximize => candidate > current,
        }
    }
}

/// Best objective value found so far, shared by every worker of a run.
///
/// Reads are a single atomic load. Writes go through a compare-and-swap
/// loop that only ever moves the value in the improving direction, so
/// concurrent offers cannot lose an improvement.
#[derive(Debug)]
pub struct Incumbent {
    sense: Sense,
    best: AtomicI64,
    optimum: Option<i64>,
    improvements: AtomicU64,
}

impl Incumbent {
    pub fn new(sense: Sense, optimum: Option<i64>) -> Self {
        Self {
            sense,
            best: AtomicI64::new(sense.worst()),
            optimum,
            improvements: AtomicU64::new(0),
        }
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// Raw value, `sense.worst()` until the first solution.
    pub fn value(&self) -> i64 {
        self.best.load(Ordering::Acquire)
    }

    pub fn get(&self) -> Option<i64> {
        let value = self.value();
        (value != self.sense.worst()).then_some(value)
    }

    /// True once the incumbent reached the known optimum, if there is one.
    pub fn is_optimal(&self) -> bool {
        self.optimum == Some(self.value())
    }

    pub fn optimum(&self) -> Option<i64> {
        self.optimum
    }

    /// Whether a subtree with optimistic bound `bound` could still beat the
    /// current value.
    pub fn could_improve(&self, bound: i64) -> bool {
        self.sense.improves(bound, self.value())
    }

    /// Installs `candidate` if it improves on the current value. Returns
    /// whether it did.
    pub fn offer(&self, candidate: i64) -> bool {
        let mut current = self.value();
        loop {
            if !self.sense.improves(candidate, current) {
                return false;
            }
            match self.best.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.improvements.fetch_add(1, Ordering::Relaxed);
                    info!(value = candidate, "new incumbent");
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn improvements(&self) -> u64 {
        self.improvements.load(Ordering::Relaxed)
    }
}

/// A worker's private copy of the incumbent.
///
/// Pruning tests read the copy, which may be stale but is never better than
/// the shared value. The shared value is only touched when a candidate
/// beats the copy, and the copy is refreshed from it afterwards.
#[derive(Debug, Clone, Copy)]
pub struct CachedIncumbent {
    sense: Sense,
    value: i64,
}

impl CachedIncumbent {
    pub fn new(sense: Sense) -> Self {
        Self {
            sense,
            value: sense.worst(),
        }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn refresh(&mut self, shared: &Incumbent) {
        self.value = shared.value();
    }

    pub fn could_improve(&self, bound: i64) -> bool {
        self.sense.improves(bound, self.value)
    }

    /// Offers `candidate` to `shared` if it beats the cached value, then
    /// refreshes the cache. Returns whether the shared value changed.
    pub fn offer(&mut self, shared: &Incumbent, candidate: i64) -> bool {
        if !self.sense.improves(candidate, self.value) {
            return false;
        }
        let improved = shared.offer(candidate);
        self.refresh(shared);
        improved
    }
}

use super::task::WorkerId;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// What a worker does when a work item panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicStrategy {
    /// Log and abort the process. For runs where a lost subtree makes every
    /// later answer meaningless.
    Abort,
    /// Swallow the panic silently and keep the worker alive.
    Isolate,
    /// Log the panic and keep the worker alive.
    LogAndContinue,
}

impl Default for PanicStrategy {
    fn default() -> Self {
        PanicStrategy::LogAndContinue
    }
}

/// The part of an item's lifecycle a guarded call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `WorkItem::run`, on a worker or inline.
    Run,
    /// `WorkItem::retire`, including deliveries through `retire_on`.
    Retire,
    /// A closure sent with `execute_on`.
    Targeted,
}

impl Stage {
    fn index(self) -> usize {
        match self {
            Stage::Run => 0,
            Stage::Retire => 1,
            Stage::Targeted => 2,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Stage::Run => "run",
            Stage::Retire => "retire",
            Stage::Targeted => "targeted",
        }
    }
}

/// Catches panics out of work items and keeps the executor's panic tally.
///
/// This is the only place panics are counted; executor metrics read the
/// total from here.
#[derive(Debug)]
pub struct PanicHandler {
    strategy: PanicStrategy,
    by_stage: [AtomicU64; 3],
}

impl PanicHandler {
    pub fn new(strategy: PanicStrategy) -> Self {
        Self {
            strategy,
            by_stage: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
        }
    }

    /// Runs `f` for `stage` on `worker`. Returns `None` if it panicked.
    pub fn guard<F, R>(&self, stage: Stage, worker: Option<WorkerId>, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        let payload = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => return Some(result),
            Err(payload) => payload,
        };
        self.by_stage[stage.index()].fetch_add(1, Ordering::Relaxed);

        let message = panic_message(payload.as_ref());
        match self.strategy {
            PanicStrategy::Abort => {
                error!(
                    stage = stage.as_str(),
                    ?worker,
                    reason = message,
                    "work item panicked, aborting"
                );
                std::process::abort();
            }
            PanicStrategy::Isolate => {}
            PanicStrategy::LogAndContinue => {
                error!(
                    stage = stage.as_str(),
                    ?worker,
                    reason = message,
                    "work item panicked"
                );
            }
        }
        None
    }

    pub fn panic_count(&self) -> u64 {
        self.by_stage
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    pub fn panics_in(&self, stage: Stage) -> u64 {
        self.by_stage[stage.index()].load(Ordering::Relaxed)
    }

    pub fn strategy(&self) -> PanicStrategy {
        self.strategy
    }
}

impl Default for PanicHandler {
    fn default() -> Self {
        Self::new(PanicStrategy::default())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

// worker thread stuff
use super::panic_handler::Stage;
use super::priority_pool::{ExecutorHandle, Job, Targeted};
use super::task::{Outcome, WorkItem, WorkerId};
use crate::error::Unsubmitted;
use std::fmt;
use std::time::Instant;
use tracing::debug;

/// What a running item sees of the executor.
///
/// Holds the id of the worker it runs on (`None` for a detached run on a
/// foreign thread), a handle for re-entrant submission, and the worker's
/// local state. Each worker thread builds exactly one context and reuses it
/// for every item it runs.
pub struct WorkerContext<'a, W: WorkItem> {
    worker: Option<WorkerId>,
    executor: &'a ExecutorHandle<W>,
    local: &'a mut W::Local,
}

impl<'a, W: WorkItem> WorkerContext<'a, W> {
    pub(crate) fn new(
        worker: Option<WorkerId>,
        executor: &'a ExecutorHandle<W>,
        local: &'a mut W::Local,
    ) -> Self {
        Self {
            worker,
            executor,
            local,
        }
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker
    }

    pub fn executor(&self) -> &'a ExecutorHandle<W> {
        self.executor
    }

    pub fn local(&self) -> &W::Local {
        &*self.local
    }

    pub fn local_mut(&mut self) -> &mut W::Local {
        &mut *self.local
    }

    pub fn execute(&self, item: W) -> Result<(), W> {
        self.executor.execute(item)
    }

    pub fn execute_batch(&self, items: Vec<W>) -> Result<(), Unsubmitted<W>> {
        self.executor.execute_batch(items)
    }

    pub fn execute_on<F>(&self, worker: WorkerId, job: F) -> bool
    where
        F: FnOnce(&mut WorkerContext<'_, W>) + Send + 'static,
    {
        self.executor.execute_on(worker, job)
    }

    pub fn retire_on(&self, worker: WorkerId, item: W) -> Result<(), W> {
        self.executor.retire_on(worker, item)
    }

    /// Runs `item` right here, on the current thread, through the same
    /// run-then-retire path a worker uses. Returns `None` if `run` panicked.
    pub fn run_inline(&mut self, item: W) -> Option<Outcome> {
        execute_item(item, self, true)
    }
}

impl<W: WorkItem> fmt::Debug for WorkerContext<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker", &self.worker)
            .field("executor", self.executor)
            .finish_non_exhaustive()
    }
}

/// Runs one item to completion: `run` then `retire`, each under the
/// executor's panic handler. `retire` runs even when `run` panicked so
/// pooled resources still go home.
pub(crate) fn execute_item<W: WorkItem>(
    mut item: W,
    ctx: &mut WorkerContext<'_, W>,
    inline: bool,
) -> Option<Outcome> {
    let executor = ctx.executor;
    let shared = executor.shared();
    let start = Instant::now();

    let worker = ctx.worker;
    let outcome = shared.panic_handler.guard(Stage::Run, worker, || item.run(ctx));
    if outcome.is_some() {
        debug_assert!(item.is_done(), "run returned but item is not done");
    }
    shared
        .metrics
        .record_execution(worker, inline, start.elapsed());

    shared
        .panic_handler
        .guard(Stage::Retire, worker, || item.retire(ctx));

    outcome
}

fn run_targeted<W: WorkItem>(job: Targeted<W>, ctx: &mut WorkerContext<'_, W>) {
    let executor = ctx.executor;
    let handler = &executor.shared().panic_handler;
    let worker = ctx.worker;
    match job {
        Targeted::Call(f) => handler.guard(Stage::Targeted, worker, || f(ctx)),
        Targeted::Retire(item) => handler.guard(Stage::Retire, worker, || item.retire(ctx)),
    };
}

// main loop
pub(crate) fn run_worker<W: WorkItem>(id: WorkerId, handle: ExecutorHandle<W>, mut local: W::Local) {
    debug!(worker = id, "worker started");

    let mut ctx = WorkerContext::new(Some(id), &handle, &mut local);

    // Priority: own targeted lane -> shared queue -> park
    while let Some(job) = handle.next_job(id) {
        match job {
            Job::Targeted(targeted) => run_targeted(targeted, &mut ctx),
            Job::Item(item) => {
                execute_item(item, &mut ctx, false);
            }
        }
    }

    debug!(worker = id, "worker stopped");
}

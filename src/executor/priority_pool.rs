use super::panic_handler::PanicHandler;
use super::task::{Outcome, WorkItem, WorkerId};
use super::worker::{self, WorkerContext};
use crate::config::Config;
use crate::error::{Error, Result, Unsubmitted};
use crate::scheduler::PriorityQueue;
use crate::telemetry::{Metrics, MetricsSnapshot};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, warn};

#[cfg(target_os = "linux")]
fn pin_thread_to_core(core_id: usize) {
    unsafe {
        let mut cpuset: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        let result = libc::sched_setaffinity(
            0, // current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &cpuset,
        );
        if result != 0 {
            warn!(
                thread = thread::current().name().unwrap_or("unknown"),
                core = core_id,
                "failed to pin worker thread"
            );
        }
    }
}

pub(crate) type TargetedFn<W> = Box<dyn FnOnce(&mut WorkerContext<'_, W>) + Send>;

/// Work addressed to one specific worker.
pub(crate) enum Targeted<W: WorkItem> {
    /// Closure run with the target worker's context.
    Call(TargetedFn<W>),
    /// Already-run item whose `retire` hook must run on the target worker.
    Retire(W),
}

pub(crate) enum Job<W: WorkItem> {
    Targeted(Targeted<W>),
    Item(W),
}

struct QueueState<W: WorkItem> {
    queue: PriorityQueue<W::Key, W>,
    /// One FIFO lane per worker, drained before the shared queue.
    lanes: Vec<VecDeque<Targeted<W>>>,
    /// Workers parked on their signal, most recently parked last.
    idle: Vec<WorkerId>,
    exited: Vec<bool>,
    shutdown: bool,
}

pub(crate) struct Shared<W: WorkItem> {
    state: Mutex<QueueState<W>>,
    signals: Vec<Condvar>,
    capacity: usize,
    pub(crate) metrics: Metrics,
    pub(crate) panic_handler: PanicHandler,
}

/// Cloneable submission handle onto a [`PriorityExecutor`].
///
/// Handles stay valid after the executor shut down; submissions made then
/// are rejected.
pub struct ExecutorHandle<W: WorkItem> {
    shared: Arc<Shared<W>>,
}

impl<W: WorkItem> Clone for ExecutorHandle<W> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W: WorkItem> fmt::Debug for ExecutorHandle<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("num_workers", &self.num_worker_threads())
            .field("queue_len", &self.queue_len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl<W: WorkItem> ExecutorHandle<W> {
    fn new(num_workers: usize, config: &Config) -> Self {
        let state = QueueState {
            queue: PriorityQueue::with_capacity(config.max_queue_capacity.min(4096)),
            lanes: (0..num_workers).map(|_| VecDeque::new()).collect(),
            idle: Vec::with_capacity(num_workers),
            exited: vec![false; num_workers],
            shutdown: false,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                signals: (0..num_workers).map(|_| Condvar::new()).collect(),
                capacity: config.max_queue_capacity,
                metrics: Metrics::new(num_workers),
                panic_handler: PanicHandler::new(config.panic_strategy),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Shared<W> {
        &self.shared
    }

    /// Enqueues `item`, or hands it back when the queue is at capacity or
    /// shutdown has begun. Never blocks waiting for a worker.
    pub fn execute(&self, item: W) -> std::result::Result<(), W> {
        let key = item.priority_key();
        let shared = &*self.shared;

        let mut state = shared.state.lock();
        if state.shutdown || state.queue.len() >= shared.capacity {
            drop(state);
            shared.metrics.record_rejected(1);
            return Err(item);
        }
        state.queue.push(key, item);
        let depth = state.queue.len();
        let idle = state.idle.pop();
        drop(state);

        shared.metrics.record_submitted(1, depth);
        if let Some(id) = idle {
            shared.signals[id].notify_one();
        }
        Ok(())
    }

    /// Enqueues `items` under a single lock acquisition. Items that do not
    /// fit come back in submission order.
    pub fn execute_batch(&self, items: Vec<W>) -> std::result::Result<(), Unsubmitted<W>> {
        if items.is_empty() {
            return Ok(());
        }
        let keyed: Vec<_> = items
            .into_iter()
            .map(|item| (item.priority_key(), item))
            .collect();
        let shared = &*self.shared;

        let mut rejected = Vec::new();
        let mut woken = Vec::new();
        let mut state = shared.state.lock();
        let mut accepted = 0;
        for (key, item) in keyed {
            if state.shutdown || state.queue.len() >= shared.capacity {
                rejected.push(item);
            } else {
                state.queue.push(key, item);
                accepted += 1;
            }
        }
        let depth = state.queue.len();
        while woken.len() < accepted {
            match state.idle.pop() {
                Some(id) => woken.push(id),
                None => break,
            }
        }
        drop(state);

        if accepted > 0 {
            shared.metrics.record_submitted(accepted as u64, depth);
        }
        for id in woken {
            shared.signals[id].notify_one();
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            shared.metrics.record_rejected(rejected.len() as u64);
            Err(Unsubmitted::new(rejected))
        }
    }

    /// Runs `job` on worker `worker`, ahead of any shared work.
    ///
    /// Targeted jobs are not bounded by the queue capacity and are accepted
    /// while shutdown drains. Returns `false` only if the worker does not
    /// exist or has already exited, in which case `job` is dropped.
    pub fn execute_on<F>(&self, worker: WorkerId, job: F) -> bool
    where
        F: FnOnce(&mut WorkerContext<'_, W>) + Send + 'static,
    {
        match self.push_targeted(worker, Targeted::Call(Box::new(job))) {
            Ok(()) => true,
            Err(_) => {
                debug!(worker, "targeted job dropped, worker unavailable");
                false
            }
        }
    }

    /// Delivers an already-run item to `worker` so that its `retire` hook
    /// runs there. The item comes back if the worker is unavailable.
    pub fn retire_on(&self, worker: WorkerId, item: W) -> std::result::Result<(), W> {
        match self.push_targeted(worker, Targeted::Retire(item)) {
            Ok(()) => {
                self.shared.metrics.record_retired_on();
                Ok(())
            }
            Err(Targeted::Retire(item)) => Err(item),
            Err(Targeted::Call(_)) => unreachable!("retire_on pushes a retire job"),
        }
    }

    fn push_targeted(
        &self,
        worker: WorkerId,
        job: Targeted<W>,
    ) -> std::result::Result<(), Targeted<W>> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        if worker >= state.lanes.len() || state.exited[worker] {
            return Err(job);
        }
        state.lanes[worker].push_back(job);
        state.idle.retain(|&id| id != worker);
        drop(state);

        shared.metrics.record_targeted();
        shared.signals[worker].notify_one();
        Ok(())
    }

    /// Runs `item` synchronously on the calling thread, which need not be a
    /// worker. `local` stands in for the per-worker state.
    pub fn run_detached(&self, item: W, local: &mut W::Local) -> Option<Outcome> {
        let mut ctx = WorkerContext::new(None, self, local);
        worker::execute_item(item, &mut ctx, true)
    }

    /// Next job for worker `id`, parking until one arrives. `None` once
    /// shutdown was requested and nothing is left for this worker.
    pub(crate) fn next_job(&self, id: WorkerId) -> Option<Job<W>> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        loop {
            if let Some(targeted) = state.lanes[id].pop_front() {
                return Some(Job::Targeted(targeted));
            }
            if let Some(item) = state.queue.pop() {
                return Some(Job::Item(item));
            }
            if state.shutdown {
                state.exited[id] = true;
                return None;
            }
            state.idle.push(id);
            shared.signals[id].wait(&mut state);
            state.idle.retain(|&w| w != id);
        }
    }

    /// Stops accepting shared work and wakes every worker. Already queued
    /// items still run. Does not wait for the workers.
    pub fn request_shutdown(&self) {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        state.idle.clear();
        drop(state);

        for signal in &shared.signals {
            signal.notify_all();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn num_worker_threads(&self) -> usize {
        self.shared.signals.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let shared = &*self.shared;
        shared.metrics.snapshot(shared.panic_handler.panic_count())
    }
}

struct WorkerHandle {
    id: WorkerId,
    thread: Option<JoinHandle<()>>,
}

/// Fixed pool of worker threads pulling from one shared priority queue.
///
/// Dropping the executor shuts it down and joins the workers.
pub struct PriorityExecutor<W: WorkItem> {
    handle: ExecutorHandle<W>,
    workers: Mutex<Vec<WorkerHandle>>,
    worker_threads: Vec<ThreadId>,
}

impl<W: WorkItem> PriorityExecutor<W> {
    /// Starts `config.worker_threads()` workers. `local` builds each
    /// worker's local state on that worker's own thread.
    pub fn new<F>(config: &Config, local: F) -> Result<Self>
    where
        F: Fn(WorkerId) -> W::Local + Send + Sync + 'static,
    {
        config.validate()?;
        let num_threads = config.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let handle = ExecutorHandle::new(num_threads, config);
        let local = Arc::new(local);
        let mut workers = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let name = format!("{}-{}", config.thread_name_prefix, id);
            let mut builder = thread::Builder::new().name(name);
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let worker_handle = handle.clone();
            let local = Arc::clone(&local);
            let pin_workers = config.pin_workers;
            let spawned = builder.spawn(move || {
                // Pin worker to core if requested
                #[cfg(target_os = "linux")]
                if pin_workers {
                    pin_thread_to_core(id);
                }
                #[cfg(not(target_os = "linux"))]
                let _ = pin_workers;

                let local = local(id);
                worker::run_worker(id, worker_handle, local);
            });

            match spawned {
                Ok(thread) => workers.push(WorkerHandle {
                    id,
                    thread: Some(thread),
                }),
                Err(e) => {
                    handle.request_shutdown();
                    for worker in &mut workers {
                        if let Some(thread) = worker.thread.take() {
                            let _ = thread.join();
                        }
                    }
                    return Err(Error::executor(format!("spawn failed: {}", e)));
                }
            }
        }

        let worker_threads = workers
            .iter()
            .filter_map(|w| w.thread.as_ref().map(|t| t.thread().id()))
            .collect();

        debug!(num_threads, capacity = config.max_queue_capacity, "executor started");

        Ok(Self {
            handle,
            workers: Mutex::new(workers),
            worker_threads,
        })
    }

    pub fn handle(&self) -> &ExecutorHandle<W> {
        &self.handle
    }

    pub fn execute(&self, item: W) -> std::result::Result<(), W> {
        self.handle.execute(item)
    }

    pub fn execute_batch(&self, items: Vec<W>) -> std::result::Result<(), Unsubmitted<W>> {
        self.handle.execute_batch(items)
    }

    pub fn execute_on<F>(&self, worker: WorkerId, job: F) -> bool
    where
        F: FnOnce(&mut WorkerContext<'_, W>) + Send + 'static,
    {
        self.handle.execute_on(worker, job)
    }

    pub fn retire_on(&self, worker: WorkerId, item: W) -> std::result::Result<(), W> {
        self.handle.retire_on(worker, item)
    }

    pub fn run_detached(&self, item: W, local: &mut W::Local) -> Option<Outcome> {
        self.handle.run_detached(item, local)
    }

    pub fn num_worker_threads(&self) -> usize {
        self.handle.num_worker_threads()
    }

    pub fn queue_len(&self) -> usize {
        self.handle.queue_len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.handle.is_shutdown()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.handle.metrics()
    }

    /// Requests shutdown and joins the workers once queued work has drained.
    ///
    /// Idempotent. From a worker thread this only requests shutdown; the
    /// join is left to whoever owns the executor.
    pub fn shutdown(&self) {
        self.handle.request_shutdown();

        if self.worker_threads.contains(&thread::current().id()) {
            return;
        }

        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!(worker = worker.id, "worker thread panicked outside a work item");
                }
            }
        }
    }
}

impl<W: WorkItem> fmt::Debug for PriorityExecutor<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityExecutor")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<W: WorkItem> Drop for PriorityExecutor<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct Probe {
        key: u32,
        done: bool,
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl Probe {
        fn new(key: u32, log: &Arc<Mutex<Vec<u32>>>) -> Self {
            Self {
                key,
                done: false,
                log: Arc::clone(log),
            }
        }
    }

    impl WorkItem for Probe {
        type Key = u32;
        type Local = ();

        fn priority_key(&self) -> u32 {
            self.key
        }

        fn run(&mut self, _ctx: &mut WorkerContext<'_, Self>) -> Outcome {
            self.log.lock().push(self.key);
            self.done = true;
            Outcome::Completed
        }

        fn is_done(&self) -> bool {
            self.done
        }
    }

    fn config(threads: usize, capacity: usize) -> Config {
        Config::builder()
            .num_threads(threads)
            .max_queue_capacity(capacity)
            .build()
            .unwrap()
    }

    #[test]
    fn test_runs_in_priority_order_behind_a_blocker() {
        let executor = PriorityExecutor::<Probe>::new(&config(1, 64), |_| ()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        // Park the only worker so the queue fills up behind it.
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (parked_tx, parked_rx) = mpsc::channel::<()>();
        assert!(executor.execute_on(0, move |_| {
            parked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        }));
        parked_rx.recv().unwrap();

        for key in [1, 5, 3, 5, 2] {
            executor.execute(Probe::new(key, &log)).ok().unwrap();
        }
        release_tx.send(()).unwrap();
        executor.shutdown();

        assert_eq!(*log.lock(), vec![5, 5, 3, 2, 1]);
    }

    #[test]
    fn test_rejects_when_full() {
        let executor = PriorityExecutor::<Probe>::new(&config(1, 2), |_| ()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (parked_tx, parked_rx) = mpsc::channel::<()>();
        executor.execute_on(0, move |_| {
            parked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        parked_rx.recv().unwrap();

        assert!(executor.execute(Probe::new(1, &log)).is_ok());
        assert!(executor.execute(Probe::new(2, &log)).is_ok());
        let rejected = executor.execute(Probe::new(3, &log)).unwrap_err();
        assert_eq!(rejected.key, 3);

        let batch = vec![Probe::new(4, &log), Probe::new(5, &log)];
        let back = executor.execute_batch(batch).unwrap_err().into_inner();
        assert_eq!(back.iter().map(|p| p.key).collect::<Vec<_>>(), vec![4, 5]);

        release_tx.send(()).unwrap();
        executor.shutdown();
        assert_eq!(executor.metrics().items_rejected, 3);
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_targeted_job_runs_on_its_worker() {
        let executor = PriorityExecutor::<Probe>::new(&config(4, 16), |_| ()).unwrap();
        let (tx, rx) = mpsc::channel();

        for worker in 0..4 {
            let tx = tx.clone();
            assert!(executor.execute_on(worker, move |ctx| {
                tx.send((worker, ctx.worker_id())).unwrap();
            }));
        }
        drop(tx);

        let mut seen: Vec<_> = rx.iter().collect();
        seen.sort();
        assert_eq!(
            seen,
            (0..4).map(|w| (w, Some(w))).collect::<Vec<_>>()
        );
        assert!(!executor.execute_on(4, |_| {}));
    }

    #[test]
    fn test_panicking_targeted_job_is_counted() {
        let cfg = Config::builder()
            .num_threads(1)
            .panic_strategy(crate::executor::PanicStrategy::Isolate)
            .build()
            .unwrap();
        let executor = PriorityExecutor::<Probe>::new(&cfg, |_| ()).unwrap();
        let (tx, rx) = mpsc::channel();

        assert!(executor.execute_on(0, |_| panic!("targeted")));
        assert!(executor.execute_on(0, move |ctx| {
            tx.send(ctx.worker_id()).unwrap();
        }));
        assert_eq!(rx.recv().unwrap(), Some(0));
        executor.shutdown();

        let handler = &executor.handle.shared().panic_handler;
        assert_eq!(handler.panics_in(crate::executor::Stage::Targeted), 1);
        assert_eq!(executor.metrics().tasks_panicked, 1);
    }

    #[test]
    fn test_shutdown_rejects_and_is_idempotent() {
        let executor = PriorityExecutor::<Probe>::new(&config(2, 16), |_| ()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        executor.shutdown();
        executor.shutdown();

        assert!(executor.is_shutdown());
        assert!(executor.execute(Probe::new(1, &log)).is_err());
        assert!(!executor.execute_on(0, |_| {}));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_shutdown_drains_queued_items() {
        let executor = PriorityExecutor::<Probe>::new(&config(2, 1024), |_| ()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        for key in 0..200 {
            executor.execute(Probe::new(key, &log)).ok().unwrap();
        }
        executor.shutdown();

        assert_eq!(log.lock().len(), 200);
        assert_eq!(executor.metrics().items_executed, 200);
    }

    #[test]
    fn test_local_state_built_per_worker() {
        struct Count {
            done: bool,
        }
        impl WorkItem for Count {
            type Key = u8;
            type Local = (WorkerId, usize);

            fn priority_key(&self) -> u8 {
                0
            }

            fn run(&mut self, ctx: &mut WorkerContext<'_, Self>) -> Outcome {
                let worker = ctx.worker_id();
                let (id, runs) = ctx.local_mut();
                assert_eq!(Some(*id), worker);
                *runs += 1;
                self.done = true;
                Outcome::Completed
            }

            fn is_done(&self) -> bool {
                self.done
            }
        }

        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let executor = PriorityExecutor::<Count>::new(&config(3, 64), move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            (id, 0)
        })
        .unwrap();

        for _ in 0..30 {
            executor.execute(Count { done: false }).ok().unwrap();
        }
        executor.shutdown();
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panicking_item_does_not_kill_worker() {
        struct Boom {
            explode: bool,
            done: bool,
            ran: Arc<AtomicUsize>,
        }
        impl WorkItem for Boom {
            type Key = u8;
            type Local = ();

            fn priority_key(&self) -> u8 {
                0
            }

            fn run(&mut self, _ctx: &mut WorkerContext<'_, Self>) -> Outcome {
                if self.explode {
                    panic!("boom");
                }
                self.ran.fetch_add(1, Ordering::SeqCst);
                self.done = true;
                Outcome::Completed
            }

            fn is_done(&self) -> bool {
                self.done
            }
        }

        let cfg = Config::builder()
            .num_threads(1)
            .panic_strategy(crate::executor::PanicStrategy::Isolate)
            .build()
            .unwrap();
        let executor = PriorityExecutor::<Boom>::new(&cfg, |_| ()).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for explode in [true, false, true, false] {
            let item = Boom {
                explode,
                done: false,
                ran: Arc::clone(&ran),
            };
            executor.execute(item).ok().unwrap();
        }
        executor.shutdown();

        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(executor.metrics().tasks_panicked, 2);
        let handler = &executor.handle.shared().panic_handler;
        assert_eq!(handler.panics_in(crate::executor::Stage::Run), 2);
        assert_eq!(handler.panics_in(crate::executor::Stage::Retire), 0);
    }

    #[test]
    fn test_run_detached_uses_caller_thread() {
        let executor = PriorityExecutor::<Probe>::new(&config(1, 4), |_| ()).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let outcome = executor.run_detached(Probe::new(9, &log), &mut ());
        assert_eq!(outcome, Some(Outcome::Completed));
        assert_eq!(*log.lock(), vec![9]);

        let snapshot = executor.metrics();
        assert_eq!(snapshot.inline_runs, 1);
        assert_eq!(executor.queue_len(), 0);
    }
}

use super::node::{DriverLocal, Node};
use super::Problem;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::PriorityExecutor;
use crate::pool::Pooled;
use crate::sync::{ForkJoinCounter, Incumbent};
use crate::telemetry::MetricsSnapshot;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub(crate) struct RunStats {
    pub(crate) nodes_pruned: AtomicU64,
    pub(crate) leaves: AtomicU64,
    pub(crate) nodes_branched: AtomicU64,
    pub(crate) nodes_submitted: AtomicU64,
    pub(crate) inline_fallbacks: AtomicU64,
    pub(crate) late_branches: AtomicU64,
    pub(crate) sentinel_stops: AtomicU64,
    pub(crate) release_requests: AtomicU64,
    pub(crate) resubmitted_releases: AtomicU64,
    pub(crate) pool_overflow_allocations: AtomicU64,
    pub(crate) pool_slots_lost: AtomicU64,
}

/// Everything one `solve` call shares between its workers.
pub(crate) struct Run<P: Problem> {
    pub(crate) problem: Arc<P>,
    pub(crate) config: Config,
    pub(crate) incumbent: Incumbent,
    /// Nodes created but not yet retired.
    pub(crate) pending: ForkJoinCounter,
    pub(crate) next_id: AtomicU64,
    pub(crate) stats: RunStats,
}

impl<P: Problem> Run<P> {
    fn new(problem: Arc<P>, config: Config) -> Self {
        let incumbent = Incumbent::new(problem.sense(), problem.known_optimum());
        Self {
            problem,
            config,
            incumbent,
            pending: ForkJoinCounter::new(),
            next_id: AtomicU64::new(0),
            stats: RunStats::default(),
        }
    }
}

/// Counters gathered over one search.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SearchStats {
    pub nodes_pruned: u64,
    pub leaves: u64,
    pub nodes_branched: u64,
    /// Nodes accepted by the executor, the root included.
    pub nodes_submitted: u64,
    /// Submissions the executor rejected that ran inline instead.
    pub inline_fallbacks: u64,
    /// Branches taken after the known optimum had already been found.
    pub late_branches: u64,
    /// Visits cut short because the known optimum had been found.
    pub sentinel_stops: u64,
    pub release_requests: u64,
    pub resubmitted_releases: u64,
    pub pool_overflow_allocations: u64,
    /// Pool slots still checked out when their worker stopped. Zero unless a
    /// node panicked or its state could not be sent home.
    pub pool_slots_lost: u64,
    pub incumbent_improvements: u64,
    pub executor: MetricsSnapshot,
}

impl SearchStats {
    /// Every node visit, inline or submitted.
    pub fn nodes_visited(&self) -> u64 {
        self.nodes_pruned + self.leaves + self.nodes_branched
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SearchReport {
    /// Best objective value found, `None` if no state produced a candidate.
    pub best: Option<i64>,
    /// Whether the search stopped at the problem's known optimum.
    pub optimal_sentinel_hit: bool,
    pub stats: SearchStats,
    pub elapsed: Duration,
}

/// Parallel branch-and-bound driver.
///
/// # Example
///
/// ```
/// use forkbound::prelude::*;
/// use forkbound::problems::partition::NumberPartition;
///
/// let problem = NumberPartition::new(vec![8, 7, 6, 5, 4]).unwrap();
/// let root = problem.root_state();
/// let config = Config::builder().num_threads(2).build().unwrap();
///
/// let report = BranchAndBound::new(problem, config).unwrap().solve(root).unwrap();
/// assert_eq!(report.best, Some(0));
/// ```
pub struct BranchAndBound<P: Problem> {
    problem: Arc<P>,
    config: Config,
}

impl<P: Problem + fmt::Debug> fmt::Debug for BranchAndBound<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchAndBound")
            .field("problem", &self.problem)
            .field("config", &self.config)
            .finish()
    }
}

impl<P: Problem> BranchAndBound<P> {
    pub fn new(problem: P, config: Config) -> Result<Self> {
        Self::with_shared(Arc::new(problem), config)
    }

    pub fn with_shared(problem: Arc<P>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { problem, config })
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Explores the tree below `root` and blocks until every node is done.
    ///
    /// Each call runs on its own executor, incumbent and counter, so
    /// concurrent calls do not interfere.
    ///
    /// # Errors
    ///
    /// [`Error::Executor`] if the workers cannot be started, and
    /// [`Error::SearchAborted`] if any node panicked, since the explored
    /// tree is then incomplete and the best value may be wrong.
    pub fn solve(&self, root: P::State) -> Result<SearchReport> {
        let start = Instant::now();
        let run = Arc::new(Run::new(Arc::clone(&self.problem), self.config.clone()));

        let executor = {
            let run = Arc::clone(&run);
            let capacity = self.config.pool_capacity_per_thread;
            PriorityExecutor::<Node<P>>::new(&self.config, move |worker| {
                DriverLocal::new(Arc::clone(&run), Some(worker), capacity)
            })?
        };

        let root = Node::new(&run, Pooled::unpooled(root));
        run.pending.increment();
        match executor.execute(root) {
            Ok(()) => {
                run.stats.nodes_submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(root) => {
                // Only possible if the executor is already refusing work.
                run.stats.inline_fallbacks.fetch_add(1, Ordering::Relaxed);
                let mut local = DriverLocal::new(Arc::clone(&run), None, 0);
                executor.run_detached(root, &mut local);
            }
        }

        run.pending.wait();
        executor.shutdown();
        let metrics = executor.metrics();
        drop(executor);

        if metrics.tasks_panicked > 0 {
            warn!(panics = metrics.tasks_panicked, "search aborted");
            return Err(Error::SearchAborted {
                panics: metrics.tasks_panicked,
            });
        }

        let report = SearchReport {
            best: run.incumbent.get(),
            optimal_sentinel_hit: run.incumbent.is_optimal(),
            stats: run.snapshot(metrics),
            elapsed: start.elapsed(),
        };
        debug!(
            best = ?report.best,
            nodes = report.stats.nodes_visited(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "search finished"
        );
        Ok(report)
    }
}

impl<P: Problem> Run<P> {
    fn snapshot(&self, executor: MetricsSnapshot) -> SearchStats {
        let s = &self.stats;
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SearchStats {
            nodes_pruned: load(&s.nodes_pruned),
            leaves: load(&s.leaves),
            nodes_branched: load(&s.nodes_branched),
            nodes_submitted: load(&s.nodes_submitted),
            inline_fallbacks: load(&s.inline_fallbacks),
            late_branches: load(&s.late_branches),
            sentinel_stops: load(&s.sentinel_stops),
            release_requests: load(&s.release_requests),
            resubmitted_releases: load(&s.resubmitted_releases),
            pool_overflow_allocations: load(&s.pool_overflow_allocations),
            pool_slots_lost: load(&s.pool_slots_lost),
            incumbent_improvements: self.incumbent.improvements(),
            executor,
        }
    }
}

use forkbound::prelude::*;
use forkbound::problems::partition::{random_instance, NumberPartition, PartitionState};
use forkbound::problems::{CliqueState, MaxClique};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const THREADS: [usize; 4] = [1, 2, 4, 8];

fn thresholds() -> Vec<ConfigBuilder> {
    vec![
        Config::builder().fork_depth_threshold(0),
        Config::builder().fork_depth_threshold(1),
        Config::builder().fork_depth_threshold(2),
        Config::builder().never_fork(),
    ]
}

fn five_node_graph() -> MaxClique {
    MaxClique::new(5, &[(0, 1), (0, 2), (1, 2), (2, 3), (3, 4), (1, 3)]).unwrap()
}

#[test]
fn test_partition_result_is_deterministic() {
    for threads in THREADS {
        for builder in thresholds() {
            for strategy in [ReleaseStrategy::Request, ReleaseStrategy::Resubmit] {
                let config = builder
                    .clone()
                    .num_threads(threads)
                    .release_strategy(strategy)
                    .pool_capacity_per_thread(2)
                    .max_queue_capacity(4)
                    .build()
                    .unwrap();

                let problem = NumberPartition::new(vec![8, 7, 6, 5, 4]).unwrap();
                let root = problem.root_state();
                let report = BranchAndBound::new(problem, config)
                    .unwrap()
                    .solve(root)
                    .unwrap();

                assert_eq!(report.best, Some(0), "threads={} {:?}", threads, strategy);
                assert!(report.optimal_sentinel_hit);
                // The node that produced the optimum resolved as a leaf.
                assert!(report.stats.leaves > 0);
            }
        }
    }
}

#[test]
fn test_clique_result_is_deterministic() {
    for threads in THREADS {
        for builder in thresholds() {
            for batch in [true, false] {
                let config = builder
                    .clone()
                    .num_threads(threads)
                    .batch_submission(batch)
                    .pool_capacity_per_thread(1)
                    .max_queue_capacity(2)
                    .build()
                    .unwrap();

                let graph = five_node_graph();
                let root = graph.root_state();
                let report = BranchAndBound::new(graph, config)
                    .unwrap()
                    .solve(root)
                    .unwrap();

                assert_eq!(report.best, Some(3), "threads={} batch={}", threads, batch);
                assert!(!report.optimal_sentinel_hit);
                assert!(report.stats.leaves > 0);
            }
        }
    }
}

fn brute_force_partition(numbers: &[i64]) -> i64 {
    let total: i64 = numbers.iter().sum();
    (0u32..1 << numbers.len())
        .map(|mask| {
            let side: i64 = numbers
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, n)| n)
                .sum();
            (total - 2 * side).abs()
        })
        .min()
        .unwrap()
}

#[test]
fn test_partition_matches_brute_force() {
    for seed in 0..20 {
        let numbers = random_instance(11, 1 << 20, seed);
        let expected = brute_force_partition(&numbers);

        let problem = NumberPartition::new(numbers).unwrap();
        let root = problem.root_state();
        let config = Config::builder().num_threads(4).build().unwrap();
        let report = BranchAndBound::new(problem, config)
            .unwrap()
            .solve(root)
            .unwrap();

        assert_eq!(report.best, Some(expected), "seed {}", seed);
    }
}

#[test]
fn test_clique_matches_brute_force() {
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    for seed in 0..20 {
        let mut rng = Pcg64::seed_from_u64(seed);
        let n = 12;
        let mut edges = Vec::new();
        for u in 0..n {
            for v in u + 1..n {
                if rng.gen_bool(0.5) {
                    edges.push((u, v));
                }
            }
        }
        let graph = MaxClique::new(n, &edges).unwrap();
        let expected = (0u64..1 << n)
            .filter(|&set| graph.is_clique(set))
            .map(|set| set.count_ones() as i64)
            .max()
            .unwrap();

        let root = graph.root_state();
        let config = Config::builder()
            .num_threads(3)
            .release_strategy(ReleaseStrategy::Resubmit)
            .build()
            .unwrap();
        let report = BranchAndBound::new(graph, config)
            .unwrap()
            .solve(root)
            .unwrap();

        assert_eq!(report.best, Some(expected), "seed {}", seed);
    }
}

/// Number partitioning that records every node visit.
struct Recorded {
    inner: NumberPartition,
    visits: Mutex<Vec<(Vec<i64>, Outcome)>>,
}

impl Problem for Recorded {
    type State = PartitionState;
    type Progress = (u32, u32);

    fn sense(&self) -> Sense {
        self.inner.sense()
    }

    fn known_optimum(&self) -> Option<i64> {
        self.inner.known_optimum()
    }

    fn blank_state(&self) -> PartitionState {
        self.inner.blank_state()
    }

    fn size(&self, state: &PartitionState) -> usize {
        self.inner.size(state)
    }

    fn bound(&self, state: &PartitionState) -> i64 {
        self.inner.bound(state)
    }

    fn candidate(&self, state: &PartitionState) -> Option<i64> {
        self.inner.candidate(state)
    }

    fn is_leaf(&self, state: &PartitionState) -> bool {
        self.inner.is_leaf(state)
    }

    fn branch(
        &self,
        state: &PartitionState,
        left: &mut PartitionState,
        right: &mut PartitionState,
    ) {
        self.inner.branch(state, left, right)
    }

    fn progress(&self, state: &PartitionState) -> (u32, u32) {
        self.inner.progress(state)
    }

    fn on_resolve(&self, state: &PartitionState, outcome: Outcome) {
        self.visits.lock().push((state.numbers().to_vec(), outcome));
    }
}

/// Plain recursive depth-first search with the same visit order.
fn sequential_visits(
    problem: &NumberPartition,
    state: &PartitionState,
    best: &mut i64,
    visits: &mut Vec<(Vec<i64>, Outcome)>,
) {
    let mut record = |outcome| visits.push((state.numbers().to_vec(), outcome));

    if problem.known_optimum() == Some(*best) {
        record(Outcome::Pruned);
        return;
    }
    if let Some(value) = problem.candidate(state) {
        *best = (*best).min(value);
    }
    if problem.is_leaf(state) {
        record(Outcome::Leaf);
        return;
    }
    if problem.bound(state) >= *best {
        record(Outcome::Pruned);
        return;
    }

    let mut left = problem.blank_state();
    let mut right = problem.blank_state();
    problem.branch(state, &mut left, &mut right);
    record(Outcome::Branched);

    sequential_visits(problem, &left, best, visits);
    sequential_visits(problem, &right, best, visits);
}

#[test]
fn test_single_thread_never_fork_is_depth_first() {
    for seed in [3, 11, 42] {
        let numbers = random_instance(14, 1_000_000, seed);
        let inner = NumberPartition::new(numbers).unwrap();

        let mut expected = Vec::new();
        let mut best = i64::MAX;
        sequential_visits(&inner, &inner.root_state(), &mut best, &mut expected);

        let root = inner.root_state();
        let problem = Arc::new(Recorded {
            inner,
            visits: Mutex::new(Vec::new()),
        });
        let config = Config::builder().num_threads(1).never_fork().build().unwrap();
        let report = BranchAndBound::with_shared(Arc::clone(&problem), config)
            .unwrap()
            .solve(root)
            .unwrap();

        assert_eq!(report.best, Some(best));
        assert_eq!(*problem.visits.lock(), expected, "seed {}", seed);
        assert_eq!(report.stats.nodes_submitted, 1);

        let expected_leaves = expected
            .iter()
            .filter(|(_, outcome)| *outcome == Outcome::Leaf)
            .count() as u64;
        assert!(expected_leaves > 0, "seed {}", seed);
        assert_eq!(report.stats.leaves, expected_leaves);
    }
}

#[test]
fn test_early_termination_bounds_late_branches() {
    for threads in [2, 4, 8] {
        // Forty numbers below 1000 are far past the point where a perfect
        // split exists.
        let numbers = random_instance(40, 1_000, threads as u64);
        let problem = NumberPartition::new(numbers).unwrap();
        let root = problem.root_state();
        let config = Config::builder().num_threads(threads).build().unwrap();

        let report = BranchAndBound::new(problem, config)
            .unwrap()
            .solve(root)
            .unwrap();

        assert!(report.optimal_sentinel_hit, "{} workers", threads);
        assert!(
            report.stats.late_branches <= threads as u64,
            "{} late branches with {} workers",
            report.stats.late_branches,
            threads
        );
    }
}

#[test]
fn test_pooled_states_go_home() {
    for strategy in [ReleaseStrategy::Request, ReleaseStrategy::Resubmit] {
        let numbers = random_instance(22, 1 << 30, 5);
        let problem = NumberPartition::new(numbers).unwrap();
        let root = problem.root_state();
        let config = Config::builder()
            .num_threads(4)
            .release_strategy(strategy)
            .pool_capacity_per_thread(64)
            .build()
            .unwrap();

        let report = BranchAndBound::new(problem, config)
            .unwrap()
            .solve(root)
            .unwrap();

        let stats = &report.stats;
        assert_eq!(stats.pool_slots_lost, 0, "{:?}", strategy);
        match strategy {
            ReleaseStrategy::Request => {
                assert!(stats.release_requests > 0);
                assert_eq!(stats.resubmitted_releases, 0);
            }
            ReleaseStrategy::Resubmit => {
                assert!(stats.resubmitted_releases > 0);
                assert_eq!(stats.release_requests, 0);
            }
        }
        assert_eq!(
            stats.executor.retired_on, stats.resubmitted_releases,
            "{:?}",
            strategy
        );
    }
}

/// Clique search whose `branch` panics on one particular state.
struct Faulty(MaxClique);

impl Problem for Faulty {
    type State = CliqueState;
    type Progress = u32;

    fn sense(&self) -> Sense {
        self.0.sense()
    }

    fn blank_state(&self) -> CliqueState {
        self.0.blank_state()
    }

    fn size(&self, state: &CliqueState) -> usize {
        self.0.size(state)
    }

    fn bound(&self, state: &CliqueState) -> i64 {
        self.0.bound(state)
    }

    fn candidate(&self, state: &CliqueState) -> Option<i64> {
        self.0.candidate(state)
    }

    fn is_leaf(&self, state: &CliqueState) -> bool {
        self.0.is_leaf(state)
    }

    fn branch(&self, state: &CliqueState, left: &mut CliqueState, right: &mut CliqueState) {
        if state.clique == 0 {
            panic!("cannot branch the root");
        }
        self.0.branch(state, left, right)
    }

    fn progress(&self, state: &CliqueState) -> u32 {
        self.0.progress(state)
    }
}

#[test]
fn test_panicking_node_aborts_search() {
    let graph = five_node_graph();
    let root = graph.root_state();
    let config = Config::builder()
        .num_threads(2)
        .panic_strategy(PanicStrategy::Isolate)
        .build()
        .unwrap();

    let result = BranchAndBound::new(Faulty(graph), config).unwrap().solve(root);

    match result {
        Err(Error::SearchAborted { panics }) => assert_eq!(panics, 1),
        other => panic!("expected SearchAborted, got {:?}", other.map(|r| r.best)),
    }
}

#[test]
fn test_solve_twice_on_one_driver() {
    let graph = five_node_graph().with_known_optimum(3);
    let root = graph.root_state();
    let driver = BranchAndBound::new(graph, Config::builder().num_threads(2).build().unwrap())
        .unwrap();

    let first = driver.solve(root).unwrap();
    let second = driver.solve(root).unwrap();

    assert_eq!(first.best, Some(3));
    assert_eq!(second.best, Some(3));
    assert!(first.optimal_sentinel_hit && second.optimal_sentinel_hit);
}

struct Tick {
    id: u64,
    done: bool,
    seen: Arc<Mutex<Vec<u64>>>,
}

impl WorkItem for Tick {
    type Key = Reverse<u64>;
    type Local = ();

    fn priority_key(&self) -> Reverse<u64> {
        Reverse(self.id)
    }

    fn run(&mut self, _ctx: &mut WorkerContext<'_, Self>) -> Outcome {
        self.seen.lock().push(self.id);
        self.done = true;
        Outcome::Completed
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

#[test]
fn test_every_item_runs_once_or_comes_back() {
    let config = Config::builder()
        .num_threads(4)
        .max_queue_capacity(8)
        .build()
        .unwrap();
    let executor = PriorityExecutor::<Tick>::new(&config, |_| ()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut returned = 0;
    for chunk in (0..2_000u64).collect::<Vec<_>>().chunks(10) {
        let items = chunk
            .iter()
            .map(|&id| Tick {
                id,
                done: false,
                seen: Arc::clone(&seen),
            })
            .collect();
        if let Err(rejected) = executor.execute_batch(items) {
            for item in rejected.into_inner() {
                returned += 1;
                executor.run_detached(item, &mut ());
            }
        }
    }
    executor.shutdown();

    let mut seen = seen.lock().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..2_000).collect::<Vec<_>>());

    let metrics = executor.metrics();
    assert_eq!(metrics.items_rejected, returned);
    assert_eq!(metrics.items_submitted + returned, 2_000);
    assert_eq!(metrics.inline_runs, returned);
    assert!(metrics.peak_queue_depth <= 8);
}

/// Binary tree of work where every node submits its children itself.
struct Split {
    depth: u32,
    done: bool,
    pending: Arc<ForkJoinCounter>,
    leaves: Arc<AtomicU64>,
}

impl WorkItem for Split {
    type Key = u32;
    type Local = ();

    fn priority_key(&self) -> u32 {
        // Deeper nodes are closer to being finished.
        u32::MAX - self.depth
    }

    fn run(&mut self, ctx: &mut WorkerContext<'_, Self>) -> Outcome {
        self.done = true;
        if self.depth == 0 {
            self.leaves.fetch_add(1, Ordering::Relaxed);
            return Outcome::Leaf;
        }

        let children: Vec<_> = (0..2)
            .map(|_| Split {
                depth: self.depth - 1,
                done: false,
                pending: Arc::clone(&self.pending),
                leaves: Arc::clone(&self.leaves),
            })
            .collect();
        self.pending.add(2);
        if let Err(rejected) = ctx.execute_batch(children) {
            for child in rejected.into_inner() {
                ctx.run_inline(child);
            }
        }
        Outcome::Branched
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn retire(self, _ctx: &mut WorkerContext<'_, Self>) {
        self.pending.decrement();
    }
}

#[test]
fn test_reentrant_submission_joins() {
    let config = Config::builder()
        .num_threads(4)
        .max_queue_capacity(32)
        .build()
        .unwrap();
    let executor = PriorityExecutor::<Split>::new(&config, |_| ()).unwrap();
    let pending = Arc::new(ForkJoinCounter::new());
    let leaves = Arc::new(AtomicU64::new(0));

    pending.increment();
    let root = Split {
        depth: 12,
        done: false,
        pending: Arc::clone(&pending),
        leaves: Arc::clone(&leaves),
    };
    if let Err(root) = executor.execute(root) {
        executor.run_detached(root, &mut ());
    }

    pending.wait();
    assert_eq!(leaves.load(Ordering::Relaxed), 1 << 12);
    assert_eq!(pending.count(), 0);
}

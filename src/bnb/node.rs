use super::driver::Run;
use super::Problem;
use crate::config::ReleaseStrategy;
use crate::executor::{Outcome, WorkItem, WorkerContext, WorkerId};
use crate::pool::{Pooled, ThreadOwnedPool};
use crate::sync::CachedIncumbent;
use std::cmp::Reverse;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

type Ctx<'a, P> = WorkerContext<'a, Node<P>>;

/// Per-worker state of a search: the worker's node pool and its copy of
/// the incumbent.
pub(crate) struct DriverLocal<P: Problem> {
    run: Arc<Run<P>>,
    pool: ThreadOwnedPool<P::State>,
    cache: CachedIncumbent,
}

impl<P: Problem> DriverLocal<P> {
    pub(crate) fn new(run: Arc<Run<P>>, owner: Option<WorkerId>, capacity: usize) -> Self {
        let problem = Arc::clone(&run.problem);
        let sense = problem.sense();
        let pool = ThreadOwnedPool::new(owner, capacity, move || problem.blank_state());
        let mut cache = CachedIncumbent::new(sense);
        cache.refresh(&run.incumbent);
        Self { run, pool, cache }
    }
}

impl<P: Problem> Drop for DriverLocal<P> {
    /// Runs after the worker drained its targeted lane, so every slot that
    /// was sent home is back by now.
    fn drop(&mut self) {
        let pool = self.pool.stats();
        let stats = &self.run.stats;
        stats
            .pool_overflow_allocations
            .fetch_add(pool.overflow_allocations, Ordering::Relaxed);
        if pool.outstanding > 0 {
            debug!(
                worker = ?self.pool.owner(),
                outstanding = pool.outstanding,
                "pool dropped with slots checked out"
            );
            stats
                .pool_slots_lost
                .fetch_add(pool.outstanding as u64, Ordering::Relaxed);
        }
    }
}

/// A submitted search-tree node.
pub(crate) struct Node<P: Problem> {
    state: Pooled<P::State>,
    id: u64,
    progress: P::Progress,
    done: bool,
}

impl<P: Problem> Node<P> {
    pub(crate) fn new(run: &Run<P>, state: Pooled<P::State>) -> Self {
        Self {
            id: run.next_id.fetch_add(1, Ordering::Relaxed),
            progress: run.problem.progress(&state),
            state,
            done: false,
        }
    }
}

impl<P: Problem> WorkItem for Node<P> {
    /// More progress first, then older nodes first.
    type Key = (P::Progress, Reverse<u64>);
    type Local = DriverLocal<P>;

    fn priority_key(&self) -> Self::Key {
        (self.progress.clone(), Reverse(self.id))
    }

    fn run(&mut self, ctx: &mut Ctx<'_, P>) -> Outcome {
        let run = Arc::clone(&ctx.local().run);
        let local = ctx.local_mut();
        local.cache.refresh(&run.incumbent);

        let outcome = explore(&run, &self.state, 0, ctx);
        self.done = true;
        outcome
    }

    fn is_done(&self) -> bool {
        self.done
    }

    /// Sends the node's state back to the pool it came from, then marks the
    /// node finished on the run's counter.
    fn retire(self, ctx: &mut Ctx<'_, P>) {
        let run = Arc::clone(&ctx.local().run);
        let here = ctx.worker_id();

        if self.state.is_overflow() || ctx.local().pool.owns(&self.state) {
            ctx.local_mut().pool.release(self.state);
        } else if let Some(owner) = self.state.owner().filter(|&w| Some(w) != here) {
            match run.config.release_strategy {
                ReleaseStrategy::Request => {
                    let state = self.state;
                    if ctx.execute_on(owner, move |ctx| ctx.local_mut().pool.release(state)) {
                        run.stats.release_requests.fetch_add(1, Ordering::Relaxed);
                    }
                }
                ReleaseStrategy::Resubmit => match ctx.retire_on(owner, self) {
                    // The owner retires it again and finishes it there.
                    Ok(()) => {
                        run.stats
                            .resubmitted_releases
                            .fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    Err(node) => {
                        debug!(owner, node = node.id, "owner gone, dropping node state");
                    }
                },
            }
        }

        run.pending.decrement();
    }
}

/// Applies the search policy to one node and everything below it that
/// stays on this thread.
fn explore<P: Problem>(
    run: &Run<P>,
    state: &P::State,
    depth: usize,
    ctx: &mut Ctx<'_, P>,
) -> Outcome {
    let problem = &*run.problem;

    if run.incumbent.is_optimal() {
        run.stats.sentinel_stops.fetch_add(1, Ordering::Relaxed);
        return resolve(run, state, Outcome::Pruned);
    }

    let cache = &mut ctx.local_mut().cache;
    if let Some(value) = problem.candidate(state) {
        cache.offer(&run.incumbent, value);
    }
    // A terminal state has already given its value above, so it counts as a
    // leaf even when that value did not improve anything.
    if problem.is_leaf(state) {
        return resolve(run, state, Outcome::Leaf);
    }
    if !cache.could_improve(problem.bound(state)) {
        return resolve(run, state, Outcome::Pruned);
    }

    let pool = &mut ctx.local_mut().pool;
    let (mut left, mut right) = (pool.get(), pool.get());
    problem.branch(state, &mut left, &mut right);
    if run.incumbent.is_optimal() {
        run.stats.late_branches.fetch_add(1, Ordering::Relaxed);
    }
    resolve(run, state, Outcome::Branched);

    let fork_left = run.config.should_fork(depth, problem.size(&left));
    let fork_right = run.config.should_fork(depth, problem.size(&right));
    let inline = match (fork_left, fork_right) {
        (true, true) => {
            submit_pair(run, ctx, left, right);
            [None, None]
        }
        (true, false) => {
            submit(run, ctx, left);
            [None, Some(right)]
        }
        (false, true) => {
            submit(run, ctx, right);
            [Some(left), None]
        }
        (false, false) => [Some(left), Some(right)],
    };

    for child in inline.into_iter().flatten() {
        explore(run, &child, depth + 1, ctx);
        ctx.local_mut().pool.release(child);
    }

    Outcome::Branched
}

fn resolve<P: Problem>(run: &Run<P>, state: &P::State, outcome: Outcome) -> Outcome {
    let counter = match outcome {
        Outcome::Pruned => Some(&run.stats.nodes_pruned),
        Outcome::Leaf => Some(&run.stats.leaves),
        Outcome::Branched => Some(&run.stats.nodes_branched),
        Outcome::Completed => None,
    };
    if let Some(counter) = counter {
        counter.fetch_add(1, Ordering::Relaxed);
    }
    run.problem.on_resolve(state, outcome);
    outcome
}

fn submit<P: Problem>(run: &Run<P>, ctx: &mut Ctx<'_, P>, state: Pooled<P::State>) {
    let node = Node::new(run, state);
    run.pending.increment();
    match ctx.execute(node) {
        Ok(()) => {
            run.stats.nodes_submitted.fetch_add(1, Ordering::Relaxed);
        }
        Err(node) => run_fallback(run, ctx, node),
    }
}

fn submit_pair<P: Problem>(
    run: &Run<P>,
    ctx: &mut Ctx<'_, P>,
    left: Pooled<P::State>,
    right: Pooled<P::State>,
) {
    if !run.config.batch_submission {
        submit(run, ctx, left);
        submit(run, ctx, right);
        return;
    }

    let nodes = vec![Node::new(run, left), Node::new(run, right)];
    run.pending.add(2);
    match ctx.execute_batch(nodes) {
        Ok(()) => {
            run.stats.nodes_submitted.fetch_add(2, Ordering::Relaxed);
        }
        Err(rejected) => {
            let accepted = 2 - rejected.len() as u64;
            run.stats
                .nodes_submitted
                .fetch_add(accepted, Ordering::Relaxed);
            for node in rejected.into_inner() {
                run_fallback(run, ctx, node);
            }
        }
    }
}

/// The executor is saturated: run the node here instead.
fn run_fallback<P: Problem>(run: &Run<P>, ctx: &mut Ctx<'_, P>, node: Node<P>) {
    run.stats.inline_fallbacks.fetch_add(1, Ordering::Relaxed);
    ctx.run_inline(node);
}

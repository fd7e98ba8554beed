//! Parallel branch-and-bound on top of the priority executor.
//!
//! A [`Problem`] describes states, bounds and a binary branching rule. The
//! [`BranchAndBound`] driver explores the tree with one executor per
//! [`solve`](BranchAndBound::solve) call:
//!
//! - every node visit first checks whether the known optimum was already
//!   reached, then offers its own candidate value, then prunes against the
//!   worker's cached incumbent,
//! - surviving nodes branch into two children taken from the worker's
//!   [`ThreadOwnedPool`](crate::pool::ThreadOwnedPool),
//! - each child runs inline or is submitted, depending on its depth and
//!   size; submissions the executor rejects run inline as well,
//! - children that finish on a foreign worker are sent home to the worker
//!   whose pool they came from.

mod driver;
mod node;

pub use driver::{BranchAndBound, SearchReport, SearchStats};

use crate::executor::Outcome;
use crate::sync::Sense;

/// A combinatorial optimization problem with binary branching.
///
/// Objective values, bounds and candidates are `i64` in the problem's
/// [`Sense`]. `bound` must be optimistic: no state in the subtree may
/// realize a better value than the bound of its root.
pub trait Problem: Send + Sync + 'static {
    type State: Send + 'static;

    /// How far a state is from the root. Larger progress is scheduled
    /// first, which keeps concurrent exploration close to depth-first.
    type Progress: Ord + Clone + Send + 'static;

    fn sense(&self) -> Sense;

    /// A value nothing can beat. Reaching it stops the search.
    fn known_optimum(&self) -> Option<i64> {
        None
    }

    /// A state to preallocate pool slots with. Its contents are always
    /// overwritten by `branch` before use.
    fn blank_state(&self) -> Self::State;

    /// Remaining work below `state`, compared against `min_fork_size`.
    fn size(&self, state: &Self::State) -> usize;

    fn bound(&self, state: &Self::State) -> i64;

    /// The objective value `state` realizes as a complete solution, if any.
    fn candidate(&self, state: &Self::State) -> Option<i64>;

    fn is_leaf(&self, state: &Self::State) -> bool;

    /// Writes the two children of `state` into `left` and `right`. The left
    /// child is explored first.
    fn branch(&self, state: &Self::State, left: &mut Self::State, right: &mut Self::State);

    fn progress(&self, state: &Self::State) -> Self::Progress;

    /// Called once per visited node, with how it resolved. Branched nodes
    /// report before their children are visited.
    fn on_resolve(&self, _state: &Self::State, _outcome: Outcome) {}
}

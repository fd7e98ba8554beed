//! Work items and their lifecycle.

use super::worker::WorkerContext;

/// Index of a worker thread, assigned at executor startup.
pub type WorkerId = usize;

/// How a work item resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Outcome {
    /// Plain work that has no search-tree meaning.
    Completed,
    /// Cut off against the incumbent or the optimality sentinel.
    Pruned,
    /// Could not be split any further.
    Leaf,
    /// Split into children.
    Branched,
}

/// A unit of schedulable work.
///
/// Items are ordered by [`priority_key`](WorkItem::priority_key): the largest
/// key runs first, and equal keys run in submission order. Keys that grow as
/// a branch gets more specialized make concurrent workers approximate a
/// depth-first walk, which keeps the number of open items bounded.
///
/// The executor drives each item through `run` and then `retire`, both on
/// the same worker. `run` may submit more items through the context.
/// `retire` consumes the item and is where pooled resources go home; it is
/// also called after `run` panicked.
pub trait WorkItem: Send + Sized + 'static {
    /// Scheduling key, larger is more urgent.
    type Key: Ord + Send + 'static;

    /// Per-worker state built once on each worker thread and handed to every
    /// item that runs there.
    type Local: 'static;

    fn priority_key(&self) -> Self::Key;

    fn run(&mut self, ctx: &mut WorkerContext<'_, Self>) -> Outcome;

    fn is_done(&self) -> bool;

    fn retire(self, _ctx: &mut WorkerContext<'_, Self>) {}
}

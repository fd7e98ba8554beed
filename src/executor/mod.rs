//! Task execution infrastructure.
//!
//! A fixed set of worker threads pulls [`WorkItem`]s from one shared
//! priority queue. Each worker also has a targeted lane for jobs that must
//! run on that specific thread, such as returning pooled objects to the
//! worker that owns them.

pub mod panic_handler;
pub mod priority_pool;
pub mod task;
pub mod worker;

pub use panic_handler::{PanicHandler, PanicStrategy, Stage};
pub use priority_pool::{ExecutorHandle, PriorityExecutor};
pub use task::{Outcome, WorkItem, WorkerId};
pub use worker::WorkerContext;

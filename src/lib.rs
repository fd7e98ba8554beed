//! forkbound - parallel branch-and-bound on a priority executor
//!
//! The crate combines four pieces:
//!
//! - a fixed worker pool whose shared queue is ordered by a per-item
//!   priority key, so that concurrent workers stay close to depth-first
//!   order instead of fanning out,
//! - per-worker object pools whose slots can travel between workers and
//!   are sent back to their owner when done,
//! - a fork-join counter to wait for a whole tree of submitted work,
//! - a generic branch-and-bound driver built on the three above.
//!
//! # Quick Start
//!
//! ```
//! use forkbound::prelude::*;
//! use forkbound::problems::MaxClique;
//!
//! let graph = MaxClique::new(5, &[(0, 1), (0, 2), (1, 2), (2, 3), (3, 4), (1, 3)]).unwrap();
//! let root = graph.root_state();
//!
//! let config = Config::builder().num_threads(4).build().unwrap();
//! let report = BranchAndBound::new(graph, config).unwrap().solve(root).unwrap();
//!
//! assert_eq!(report.best, Some(3));
//! ```
//!
//! # Features
//!
//! - `telemetry` (default): run-time histogram in executor metrics
//! - `serde`: `Serialize` for reports and metric snapshots

// Lint configuration
#![warn(missing_debug_implementations)]

pub mod bnb;
pub mod config;
pub mod error;
pub mod executor;
pub mod pool;
pub mod prelude;
pub mod problems;
pub mod scheduler;
pub mod sync;
pub mod telemetry;
pub mod util;

// Re-export key types at crate root
pub use bnb::{BranchAndBound, Problem, SearchReport, SearchStats};
pub use config::{Config, ConfigBuilder, ReleaseStrategy};
pub use error::{Error, Result, Unsubmitted};
pub use executor::{ExecutorHandle, Outcome, PriorityExecutor, WorkItem, WorkerContext};

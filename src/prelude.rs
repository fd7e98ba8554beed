pub use crate::bnb::{BranchAndBound, Problem, SearchReport, SearchStats};
pub use crate::config::{Config, ConfigBuilder, ReleaseStrategy};
pub use crate::error::{Error, Result, Unsubmitted};
pub use crate::executor::{
    ExecutorHandle, Outcome, PanicStrategy, PriorityExecutor, WorkItem, WorkerContext, WorkerId,
};
pub use crate::pool::{Pooled, ThreadOwnedPool};
pub use crate::sync::{ForkJoinCounter, Incumbent, Sense};

pub use crate::telemetry::MetricsSnapshot;

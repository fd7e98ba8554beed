//! Reference problems for exercising the branch-and-bound driver.

pub mod clique;
pub mod partition;

pub use clique::{CliqueState, MaxClique};
pub use partition::{NumberPartition, PartitionState};

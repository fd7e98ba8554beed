//! Synchronization shared by all workers of one search.

pub mod fork_join;
pub mod incumbent;

pub use fork_join::ForkJoinCounter;
pub use incumbent::{CachedIncumbent, Incumbent, Sense};

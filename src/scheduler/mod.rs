//! Scheduling order for ready work.
//!
//! The executor keeps one shared priority queue, ordered by a problem's
//! progress metric first and by age second.

pub mod priority;

pub use priority::PriorityQueue;

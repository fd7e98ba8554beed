//! Two-way number partitioning with the Complete Karmarkar-Karp tree.
//!
//! Each node is a multiset of numbers. Branching takes the two largest,
//! `a >= b`, and either commits them to different sides (replace both by
//! `a - b`) or to the same side (replace both by `a + b`). The difference
//! branch is tried first since it is the Karmarkar-Karp heuristic move.
//! A node whose largest number is at least the sum of the rest is a leaf:
//! that number alone on one side is its best split.

use crate::bnb::Problem;
use crate::error::{Error, Result};
use crate::sync::Sense;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionState {
    /// Sorted largest first.
    numbers: Vec<i64>,
    sum: i64,
    differences: u32,
    sums: u32,
}

impl PartitionState {
    pub fn numbers(&self) -> &[i64] {
        &self.numbers
    }

    pub fn sum(&self) -> i64 {
        self.sum
    }

    /// Difference and sum steps taken from the root.
    pub fn steps(&self) -> (u32, u32) {
        (self.differences, self.sums)
    }

    fn largest_and_rest(&self) -> (i64, i64) {
        let largest = self.numbers.first().copied().unwrap_or(0);
        (largest, self.sum - largest)
    }
}

/// Minimizes the difference between the sums of two subsets.
#[derive(Debug, Clone)]
pub struct NumberPartition {
    numbers: Vec<i64>,
    sum: i64,
}

impl NumberPartition {
    pub fn new(mut numbers: Vec<i64>) -> Result<Self> {
        if numbers.is_empty() {
            return Err(Error::instance("nothing to partition"));
        }
        if numbers.iter().any(|&n| n < 0) {
            return Err(Error::instance("numbers must be non-negative"));
        }
        let sum = numbers
            .iter()
            .try_fold(0i64, |acc, &n| acc.checked_add(n))
            .ok_or_else(|| Error::instance("sum of numbers overflows i64"))?;

        numbers.sort_unstable_by(|a, b| b.cmp(a));
        Ok(Self { numbers, sum })
    }

    pub fn numbers(&self) -> &[i64] {
        &self.numbers
    }

    pub fn root_state(&self) -> PartitionState {
        PartitionState {
            numbers: self.numbers.clone(),
            sum: self.sum,
            differences: 0,
            sums: 0,
        }
    }
}

impl Problem for NumberPartition {
    type State = PartitionState;
    type Progress = (u32, u32);

    fn sense(&self) -> Sense {
        Sense::Minimize
    }

    /// Parity of the total: an odd sum cannot split evenly.
    fn known_optimum(&self) -> Option<i64> {
        Some(self.sum % 2)
    }

    fn blank_state(&self) -> PartitionState {
        PartitionState {
            numbers: Vec::with_capacity(self.numbers.len()),
            ..PartitionState::default()
        }
    }

    fn size(&self, state: &PartitionState) -> usize {
        state.numbers.len()
    }

    fn bound(&self, state: &PartitionState) -> i64 {
        let (largest, rest) = state.largest_and_rest();
        (largest - rest).max(state.sum % 2)
    }

    /// Once the largest number outweighs all others together, putting it
    /// alone on one side is optimal for the whole subtree.
    fn candidate(&self, state: &PartitionState) -> Option<i64> {
        let (largest, rest) = state.largest_and_rest();
        (largest >= rest).then_some(largest - rest)
    }

    /// Either too few numbers to branch on, or the candidate above is
    /// already exact for the whole subtree.
    fn is_leaf(&self, state: &PartitionState) -> bool {
        let (largest, rest) = state.largest_and_rest();
        state.numbers.len() <= 2 || largest >= rest
    }

    fn branch(
        &self,
        state: &PartitionState,
        left: &mut PartitionState,
        right: &mut PartitionState,
    ) {
        let (a, b) = (state.numbers[0], state.numbers[1]);
        let rest = &state.numbers[2..];

        let difference = a - b;
        let at = rest.partition_point(|&n| n > difference);
        left.numbers.clear();
        left.numbers.extend_from_slice(&rest[..at]);
        left.numbers.push(difference);
        left.numbers.extend_from_slice(&rest[at..]);
        left.sum = state.sum - 2 * b;
        left.differences = state.differences + 1;
        left.sums = state.sums;

        right.numbers.clear();
        right.numbers.push(a + b);
        right.numbers.extend_from_slice(rest);
        right.sum = state.sum;
        right.differences = state.differences;
        right.sums = state.sums + 1;
    }

    fn progress(&self, state: &PartitionState) -> (u32, u32) {
        (state.differences, state.sums)
    }
}

/// `n` numbers drawn uniformly from `0..=max`, reproducible from `seed`.
pub fn random_instance(n: usize, max: i64, seed: u64) -> Vec<i64> {
    let mut rng = Pcg64::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..=max)).collect()
}

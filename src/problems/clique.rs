//! Maximum clique on small graphs, with vertex sets as `u64` bitmasks.

use crate::bnb::Problem;
use crate::error::{Error, Result};
use crate::sync::Sense;

/// Largest graph [`MaxClique`] accepts.
pub const MAX_VERTICES: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CliqueState {
    /// Vertices committed to the clique.
    pub clique: u64,
    /// Vertices adjacent to every clique member and not yet decided.
    pub candidates: u64,
}

impl CliqueState {
    pub fn clique_size(&self) -> u32 {
        self.clique.count_ones()
    }

    pub fn members(&self) -> Vec<usize> {
        (0..MAX_VERTICES)
            .filter(|&v| self.clique & (1 << v) != 0)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MaxClique {
    num_vertices: usize,
    adjacency: Vec<u64>,
    optimum: Option<i64>,
}

impl MaxClique {
    pub fn new(num_vertices: usize, edges: &[(usize, usize)]) -> Result<Self> {
        if num_vertices == 0 || num_vertices > MAX_VERTICES {
            return Err(Error::instance(format!(
                "graph must have 1 to {} vertices, got {}",
                MAX_VERTICES, num_vertices
            )));
        }

        let mut adjacency = vec![0u64; num_vertices];
        for &(u, v) in edges {
            if u >= num_vertices || v >= num_vertices {
                return Err(Error::instance(format!("edge ({}, {}) out of range", u, v)));
            }
            if u == v {
                continue;
            }
            adjacency[u] |= 1 << v;
            adjacency[v] |= 1 << u;
        }

        Ok(Self {
            num_vertices,
            adjacency,
            optimum: None,
        })
    }

    /// Stops the search as soon as a clique of `size` is found.
    pub fn with_known_optimum(mut self, size: usize) -> Self {
        self.optimum = Some(size as i64);
        self
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn root_state(&self) -> CliqueState {
        let all = if self.num_vertices == MAX_VERTICES {
            u64::MAX
        } else {
            (1u64 << self.num_vertices) - 1
        };
        CliqueState {
            clique: 0,
            candidates: all,
        }
    }

    pub fn is_clique(&self, vertices: u64) -> bool {
        (0..self.num_vertices)
            .filter(|&v| vertices & (1 << v) != 0)
            .all(|v| vertices & !(1 << v) & !self.adjacency[v] == 0)
    }
}

impl Problem for MaxClique {
    type State = CliqueState;
    type Progress = u32;

    fn sense(&self) -> Sense {
        Sense::Maximize
    }

    fn known_optimum(&self) -> Option<i64> {
        self.optimum
    }

    fn blank_state(&self) -> CliqueState {
        CliqueState::default()
    }

    fn size(&self, state: &CliqueState) -> usize {
        state.candidates.count_ones() as usize
    }

    fn bound(&self, state: &CliqueState) -> i64 {
        (state.clique.count_ones() + state.candidates.count_ones()) as i64
    }

    fn candidate(&self, state: &CliqueState) -> Option<i64> {
        Some(state.clique.count_ones() as i64)
    }

    fn is_leaf(&self, state: &CliqueState) -> bool {
        state.candidates == 0
    }

    /// Include the lowest candidate vertex, or exclude it.
    fn branch(&self, state: &CliqueState, left: &mut CliqueState, right: &mut CliqueState) {
        let v = state.candidates.trailing_zeros() as usize;
        let rest = state.candidates & !(1 << v);

        left.clique = state.clique | (1 << v);
        left.candidates = rest & self.adjacency[v];

        right.clique = state.clique;
        right.candidates = rest;
    }

    fn progress(&self, state: &CliqueState) -> u32 {
        state.clique.count_ones()
    }
}

// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! A route through the network, stored as an ordered edge chain.
use anyhow::Result;

use super::Edge;
use crate::rsuet::SolveError;

/// An acyclic route between an origin and a destination.
///
/// The path references the network edges by index; two paths on the same OD pair are
/// equal iff their edge sequences are identical. Flow lives on paths and is written
/// back to the edges by [Network::load_network](super::Network::load_network).
#[derive(Clone, Debug)]
pub struct Path {
    /// Ordered edge indices forming a tail-head chain.
    pub edges: Vec<usize>,
    /// Sum of the generalized costs of the edges, valid after the last cost refresh.
    pub gen_cost: f64,
    /// Sum of the lengths of the edges; does not vary with network conditions.
    pub length: f64,
    /// Flow assigned to this path. Always finite and non-negative.
    flow: f64,
    /// Auxiliary flow of the current equilibration step.
    pub(crate) aux_flow: f64,
    /// Probability of choosing this path, conditional on the restricted choice set.
    pub probability: f64,
    /// Path-size overlap factor, 1 when the path shares no edge with another member.
    pub path_size: f64,
    /// Cost transform `flow / enumerator` used by the relative used gap; 0 by
    /// definition when the flow is 0.
    pub transformed_cost: f64,
    /// Set when threshold pruning schedules this path for removal.
    pub(crate) marked_for_removal: bool,
}

impl Path {
    /// Creates a path from an edge-index chain, with cost and length taken from the
    /// current edge state.
    pub fn new(edges: Vec<usize>, edge_data: &[Edge]) -> Self {
        let length = edges.iter().map(|&e| edge_data[e].length).sum();
        let gen_cost = edges.iter().map(|&e| edge_data[e].gen_cost).sum();
        Path {
            edges,
            gen_cost,
            length,
            flow: 0.0,
            aux_flow: 0.0,
            probability: 0.0,
            path_size: 1.0,
            transformed_cost: 0.0,
            marked_for_removal: false,
        }
    }

    pub fn flow(&self) -> f64 {
        self.flow
    }

    /// Assigns flow to the path.
    ///
    /// Non-finite values are rejected: a NaN or infinite flow means the equilibration
    /// arithmetic broke down and the solve must stop.
    pub fn set_flow(&mut self, flow: f64) -> Result<()> {
        if !flow.is_finite() {
            return Err(SolveError::NumericFailure {
                detail: format!("path flow set to {flow}"),
            }
            .into());
        }
        self.flow = flow;
        Ok(())
    }

    /// Sets `gen_cost` to the sum of the generalized costs of the edges and returns it.
    pub fn update_cost(&mut self, edge_data: &[Edge]) -> f64 {
        self.gen_cost = self.edges.iter().map(|&e| edge_data[e].gen_cost).sum();
        self.gen_cost
    }

    /// Edge-sequence equality.
    pub fn same_route(&self, other: &Path) -> bool {
        self.edges == other.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Edge;

    fn edge_data() -> Vec<Edge> {
        let mut edges = vec![
            Edge::new(1, 2, 100.0, 2.0, 4.0, 0.15, 4.0),
            Edge::new(2, 3, 100.0, 3.0, 6.0, 0.15, 4.0),
            Edge::new(1, 3, 100.0, 7.0, 9.0, 0.15, 4.0),
        ];
        for (i, e) in edges.iter_mut().enumerate() {
            e.id = i + 1;
            e.gen_cost = e.free_flow_time;
        }
        edges
    }

    #[test]
    fn cost_and_length_test() {
        let edges = edge_data();
        let path = Path::new(vec![0, 1], &edges);
        assert_eq!(path.length, 5.0);
        assert_eq!(path.gen_cost, 10.0);
    }

    #[test]
    fn route_equality_test() {
        let edges = edge_data();
        let a = Path::new(vec![0, 1], &edges);
        let b = Path::new(vec![0, 1], &edges);
        let c = Path::new(vec![2], &edges);
        assert!(a.same_route(&a));
        assert!(a.same_route(&b) && b.same_route(&a));
        assert!(!a.same_route(&c));
        // Equal routes have equal costs after a shared refresh.
        assert_eq!(a.gen_cost, b.gen_cost);
    }

    #[test]
    fn non_finite_flow_rejected_test() {
        let edges = edge_data();
        let mut path = Path::new(vec![0], &edges);
        assert!(path.set_flow(25.0).is_ok());
        assert!(path.set_flow(f64::NAN).is_err());
        assert!(path.set_flow(f64::INFINITY).is_err());
        // The last valid value is kept.
        assert_eq!(path.flow(), 25.0);
    }
}

// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Shortest-path engine: Dijkstra's algorithm with early termination.
mod min_queue;

use hashbrown::HashSet;

use crate::network::{Network, NodeId};
pub use min_queue::IndexedMinHeap;

/// Reusable scratch state for single-origin shortest-path searches.
///
/// All per-node search state (`dist`, `prev`, settled flags) lives in arrays indexed by
/// node id and owned by this struct, not on the graph nodes, so a search never mutates
/// the network and independent searches could run on separate buffers.
///
/// The buffers are valid for the origin of the last [ShortestPaths::run] call only.
#[derive(Clone, Debug)]
pub struct ShortestPaths {
    /// Cost of the cheapest known path from the origin, by node id.
    dist: Vec<f64>,
    /// Predecessor on the cheapest known path, by node id.
    prev: Vec<Option<NodeId>>,
    /// Nodes whose shortest path is settled.
    visited: Vec<bool>,
    heap: IndexedMinHeap,
    /// Destinations with demand from the origin that are not settled yet.
    pending: HashSet<NodeId>,
}

impl ShortestPaths {
    /// Returns scratch buffers for a network with node ids `1..=num_nodes`.
    pub fn new(num_nodes: usize) -> Self {
        ShortestPaths {
            dist: vec![f64::INFINITY; num_nodes + 1],
            prev: vec![None; num_nodes + 1],
            visited: vec![false; num_nodes + 1],
            heap: IndexedMinHeap::new(num_nodes),
            pending: HashSet::new(),
        }
    }

    /// Runs Dijkstra's algorithm from `origin` until every destination with demand from
    /// `origin` is settled.
    ///
    /// The search terminates as soon as the pending destination set is empty rather than
    /// when the heap empties. Correctness relies on non-negative edge costs, which the
    /// BPR volume-delay function guarantees.
    pub fn run(&mut self, network: &Network, origin: NodeId) {
        self.dist.fill(f64::INFINITY);
        self.prev.fill(None);
        self.visited.fill(false);
        self.heap.reset();
        self.pending.clear();
        for od in network.ods() {
            if od.origin == origin {
                self.pending.insert(od.destination);
            }
        }

        self.dist[origin] = 0.0;
        self.heap.insert(origin, 0.0);
        while !self.pending.is_empty() {
            let Some((u, dist_u)) = self.heap.pop() else {
                // The remaining destinations are unreachable from the origin.
                break;
            };
            self.visited[u] = true;
            self.pending.remove(&u);

            for &v in network.neighbours(u) {
                if self.visited[v] {
                    continue;
                }
                let idx = network
                    .edge_index(u, v)
                    .expect("adjacency lists match the edge map");
                let alt = dist_u + network.edges()[idx].gen_cost;
                if alt < self.dist[v] {
                    self.dist[v] = alt;
                    self.prev[v] = Some(u);
                    if self.heap.contains(v) {
                        self.heap.decrease_key(v, alt);
                    } else {
                        self.heap.insert(v, alt);
                    }
                }
            }
        }
    }

    /// Cost of the shortest path from the last origin to `node`, or infinity when
    /// unreachable.
    pub fn distance(&self, node: NodeId) -> f64 {
        self.dist[node]
    }

    /// Reconstructs the shortest path from the last origin to `destination` as an edge
    /// index sequence, by walking the predecessor chain backwards and reversing it.
    ///
    /// Returns `None` when the destination is unreachable.
    pub fn shortest_path_edges(
        &self,
        network: &Network,
        origin: NodeId,
        destination: NodeId,
    ) -> Option<Vec<usize>> {
        if !self.dist[destination].is_finite() {
            return None;
        }
        let mut edges = Vec::new();
        let mut u = destination;
        while u != origin {
            let p = self.prev[u]?;
            edges.push(network.edge_index(p, u).expect("predecessor chain follows edges"));
            u = p;
        }
        edges.reverse();
        Some(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Edge, Network, OdPair};

    fn diamond() -> Network {
        // 1 -> 2 -> 4 and 1 -> 3 -> 4, with the upper branch cheaper.
        let edges = vec![
            Edge::new(1, 2, 100.0, 1.0, 1.0, 0.15, 4.0),
            Edge::new(2, 4, 100.0, 1.0, 1.0, 0.15, 4.0),
            Edge::new(1, 3, 100.0, 1.0, 2.0, 0.15, 4.0),
            Edge::new(3, 4, 100.0, 1.0, 2.0, 0.15, 4.0),
        ];
        let ods = vec![OdPair::new(1, 4, 10.0).unwrap()];
        let mut network = Network::from_parts("diamond", 4, edges, ods).unwrap();
        network.update_edge_costs(1.0, 0.0);
        network
    }

    #[test]
    fn shortest_path_test() {
        let network = diamond();
        let mut sp = ShortestPaths::new(network.num_nodes());
        sp.run(&network, 1);
        assert_eq!(sp.distance(4), 2.0);
        let edges = sp.shortest_path_edges(&network, 1, 4).unwrap();
        let nodes: Vec<_> = network.node_sequence(&edges);
        assert_eq!(nodes, vec![1, 2, 4]);
    }

    #[test]
    fn unreachable_test() {
        // Node 3 has no outgoing edge towards 4 here.
        let edges = vec![Edge::new(1, 2, 100.0, 1.0, 1.0, 0.15, 4.0)];
        let ods = vec![OdPair::new(1, 3, 5.0).unwrap()];
        let mut network = Network::from_parts("broken", 3, edges, ods).unwrap();
        network.update_edge_costs(1.0, 0.0);
        let mut sp = ShortestPaths::new(network.num_nodes());
        sp.run(&network, 1);
        assert!(sp.shortest_path_edges(&network, 1, 3).is_none());
    }

    #[test]
    fn dijkstra_lower_bound_test() {
        // dist(D) is never larger than the cost of any explicit path from O to D.
        let network = diamond();
        let mut sp = ShortestPaths::new(network.num_nodes());
        sp.run(&network, 1);
        let upper: f64 = [network.edge(1, 3).unwrap(), network.edge(3, 4).unwrap()]
            .iter()
            .map(|e| e.gen_cost)
            .sum();
        assert!(sp.distance(4) <= upper);
    }
}

// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! The road network: nodes, congestible edges and origin-destination demand.
pub mod od;
pub mod path;

use anyhow::{anyhow, bail, Result};
use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use log::error;

use crate::routing::ShortestPaths;
use crate::rsuet::SolveError;
pub use od::OdPair;
pub use path::Path;

/// Nodes are identified by their 1-based integer id, as read from the network file.
pub type NodeId = usize;

/// A node of the network.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    /// Planar coordinates, `(0, 0)` when the network has no node file.
    pub x: f64,
    pub y: f64,
    /// Ids of the nodes reachable through one outgoing edge.
    neighbours: Vec<NodeId>,
    /// `true` if at least one OD pair has this node as origin.
    pub has_demand_from: bool,
    /// `true` if at least one OD pair has this node as destination.
    pub has_demand_to: bool,
}

impl Node {
    pub fn new(id: NodeId, x: f64, y: f64) -> Self {
        Node {
            id,
            x,
            y,
            neighbours: Vec::new(),
            has_demand_from: false,
            has_demand_to: false,
        }
    }
}

/// A directed edge with a BPR volume-delay function.
#[derive(Clone, Debug)]
pub struct Edge {
    /// 1-based id, assigned in the order the edges were read.
    pub id: usize,
    pub tail: NodeId,
    pub head: NodeId,
    pub capacity: f64,
    pub length: f64,
    pub free_flow_time: f64,
    /// BPR congestion coefficient.
    pub b: f64,
    /// BPR congestion exponent.
    pub power: f64,
    /// Current flow on the edge, valid after the last [Network::load_network] call.
    pub flow: f64,
    /// Congested travel time, valid after the last [Network::update_edge_costs] call.
    pub time: f64,
    /// Generalized cost, valid after the last [Network::update_edge_costs] call.
    pub gen_cost: f64,
}

impl Edge {
    /// Creates an edge with zero flow; the id is assigned by the [Network] constructor.
    pub fn new(
        tail: NodeId,
        head: NodeId,
        capacity: f64,
        length: f64,
        free_flow_time: f64,
        b: f64,
        power: f64,
    ) -> Self {
        Edge {
            id: 0,
            tail,
            head,
            capacity,
            length,
            free_flow_time,
            b,
            power,
            flow: 0.0,
            time: free_flow_time,
            gen_cost: 0.0,
        }
    }

    /// Refreshes the congested time and the generalized cost from the current flow.
    ///
    /// The time follows the BPR form `t0 * (1 + b * (v / c)^p)`; the generalized cost is
    /// the linear combination of time and length weighted by the utility coefficients.
    fn update_cost(&mut self, beta_time: f64, beta_length: f64) {
        self.time = self.free_flow_time * (1.0 + self.b * (self.flow / self.capacity).powf(self.power));
        self.gen_cost = beta_time * self.time + beta_length * self.length;
    }
}

/// A directed road network with origin-destination demand.
///
/// The network owns its nodes, edges and OD pairs; paths are owned by their OD pair and
/// reference edges by index. OD pairs are kept sorted by `(origin, destination)` so that
/// iteration is deterministic and grouped by origin, which lets the solver run Dijkstra
/// once per origin with demand.
#[derive(Clone, Debug)]
pub struct Network {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Maps `(tail, head)` to the edge index, for O(1) edge recall.
    edge_map: HashMap<(NodeId, NodeId), usize>,
    ods: Vec<OdPair>,
    od_map: HashMap<(NodeId, NodeId), usize>,
}

impl Network {
    /// Builds a network from its parts, checking referential integrity.
    ///
    /// Edge ids are assigned 1..M in the given order. OD pairs are sorted by
    /// `(origin, destination)`.
    pub fn new(
        name: &str,
        nodes: Vec<Node>,
        mut edges: Vec<Edge>,
        mut ods: Vec<OdPair>,
    ) -> Result<Self> {
        let num_nodes = nodes.len();
        let mut nodes = nodes;
        for (i, node) in nodes.iter().enumerate() {
            if node.id != i + 1 {
                bail!("Node ids must be 1..{}, got {} at rank {}", num_nodes, node.id, i + 1);
            }
        }

        let mut edge_map = HashMap::with_capacity(edges.len());
        for (i, edge) in edges.iter_mut().enumerate() {
            edge.id = i + 1;
            if edge.tail == 0 || edge.tail > num_nodes || edge.head == 0 || edge.head > num_nodes {
                bail!("Edge {} references an unknown node ({} -> {})", edge.id, edge.tail, edge.head);
            }
            if edge.tail == edge.head {
                bail!("Edge {} is a self-loop on node {}", edge.id, edge.tail);
            }
            if !(edge.capacity > 0.0) {
                bail!("Edge {} must have a positive capacity, got {}", edge.id, edge.capacity);
            }
            if edge.free_flow_time < 0.0 || edge.length < 0.0 || edge.b < 0.0 || edge.power < 0.0 {
                bail!("Edge {} has a negative BPR parameter", edge.id);
            }
            if edge_map.insert((edge.tail, edge.head), i).is_some() {
                bail!("Duplicate edge from {} to {}", edge.tail, edge.head);
            }
            nodes[edge.tail - 1].neighbours.push(edge.head);
        }

        ods.sort_by_key(|od| (od.origin, od.destination));
        let mut od_map = HashMap::with_capacity(ods.len());
        for (i, od) in ods.iter().enumerate() {
            if od.origin == 0 || od.origin > num_nodes || od.destination == 0 || od.destination > num_nodes
            {
                bail!(
                    "OD pair ({}, {}) references an unknown node",
                    od.origin,
                    od.destination
                );
            }
            if od_map.insert((od.origin, od.destination), i).is_some() {
                bail!("Duplicate OD pair ({}, {})", od.origin, od.destination);
            }
            nodes[od.origin - 1].has_demand_from = true;
            nodes[od.destination - 1].has_demand_to = true;
        }

        Ok(Network {
            name: name.to_owned(),
            nodes,
            edges,
            edge_map,
            ods,
            od_map,
        })
    }

    /// Builds a network with synthesised nodes at `(0, 0)`, ids `1..=num_nodes`.
    pub fn from_parts(
        name: &str,
        num_nodes: usize,
        edges: Vec<Edge>,
        ods: Vec<OdPair>,
    ) -> Result<Self> {
        let nodes = (1..=num_nodes).map(|id| Node::new(id, 0.0, 0.0)).collect();
        Self::new(name, nodes, edges, ods)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// The number of OD pairs with positive demand.
    pub fn num_ods(&self) -> usize {
        self.ods.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn ods(&self) -> &[OdPair] {
        &self.ods
    }

    pub(crate) fn ods_mut(&mut self) -> &mut [OdPair] {
        &mut self.ods
    }

    /// The outgoing neighbour ids of a node.
    pub fn neighbours(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node - 1].neighbours
    }

    /// Recalls an edge by tail and head node id in O(1).
    pub fn edge(&self, tail: NodeId, head: NodeId) -> Result<&Edge> {
        self.edge_index(tail, head)
            .map(|i| &self.edges[i])
            .ok_or_else(|| anyhow!("No edge from {} to {}", tail, head))
    }

    /// The index of the edge from `tail` to `head`, if any.
    pub fn edge_index(&self, tail: NodeId, head: NodeId) -> Option<usize> {
        self.edge_map.get(&(tail, head)).copied()
    }

    /// Recalls an OD pair in O(1); `None` means zero demand.
    pub fn od(&self, origin: NodeId, destination: NodeId) -> Option<&OdPair> {
        self.od_map.get(&(origin, destination)).map(|&i| &self.ods[i])
    }

    pub fn od_mut(&mut self, origin: NodeId, destination: NodeId) -> Option<&mut OdPair> {
        let i = *self.od_map.get(&(origin, destination))?;
        Some(&mut self.ods[i])
    }

    /// Sum of demand over all OD pairs.
    pub fn total_demand(&self) -> f64 {
        self.ods.iter().map(|od| od.demand).sum()
    }

    /// Converts an edge-index sequence to the node-id sequence it visits.
    pub fn node_sequence(&self, edge_indices: &[usize]) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(edge_indices.len() + 1);
        for (i, &e) in edge_indices.iter().enumerate() {
            if i == 0 {
                nodes.push(self.edges[e].tail);
            }
            nodes.push(self.edges[e].head);
        }
        nodes
    }

    /// Makes the flow on edges correspond to the flow on paths in the restricted choice
    /// sets: every edge flow is rebuilt from scratch.
    pub fn load_network(&mut self) {
        for edge in &mut self.edges {
            edge.flow = 0.0;
        }
        for od in &self.ods {
            for path in &od.restricted_choice_set {
                for &e in &path.edges {
                    self.edges[e].flow += path.flow();
                }
            }
        }
    }

    /// Refreshes the congested time and generalized cost of every edge from its current
    /// flow.
    pub fn update_edge_costs(&mut self, beta_time: f64, beta_length: f64) {
        for edge in &mut self.edges {
            edge.update_cost(beta_time, beta_length);
        }
    }

    /// Refreshes the generalized cost of every path in the restricted choice sets, and
    /// the minimum cost of every OD pair.
    pub fn update_path_costs(&mut self) {
        for od in &mut self.ods {
            let mut minimum_cost = f64::INFINITY;
            for path in &mut od.restricted_choice_set {
                let cost = path.update_cost(&self.edges);
                if cost < minimum_cost {
                    minimum_cost = cost;
                }
            }
            od.minimum_cost = minimum_cost;
        }
    }

    /// Recomputes the path-size overlap factor of every restricted choice set.
    pub fn update_path_size_factors(&mut self, path_size_exponent: f64) {
        for od in &mut self.ods {
            od.update_path_size_factors(&self.edges, path_size_exponent);
        }
    }

    /// Recomputes path-size factors only on OD pairs where column generation inserted a
    /// path, which is much cheaper on large networks.
    pub fn update_path_size_factors_where_paths_were_added(&mut self, path_size_exponent: f64) {
        for od in &mut self.ods {
            if od.path_was_added_during_column_generation {
                od.update_path_size_factors(&self.edges, path_size_exponent);
            }
        }
    }

    /// Performs an all-or-nothing assignment with the current edge costs: for each OD
    /// pair the shortest path is added to the restricted choice set and receives the
    /// full demand.
    ///
    /// The assignment does not load the network; call [Network::load_network] afterwards.
    pub fn all_or_nothing(&mut self, sp: &mut ShortestPaths) -> Result<()> {
        let mut last_origin = None;
        for od_idx in 0..self.ods.len() {
            let (origin, destination) = {
                let od = &self.ods[od_idx];
                (od.origin, od.destination)
            };
            // ODs are sorted by origin first: one Dijkstra per origin with demand.
            if last_origin != Some(origin) {
                sp.run(self, origin);
                last_origin = Some(origin);
            }
            let Some(edges) = sp.shortest_path_edges(self, origin, destination) else {
                error!("No path from {} to {} although its demand is positive", origin, destination);
                return Err(SolveError::DisconnectedDemand { origin, destination }.into());
            };
            let path = Path::new(edges, &self.edges);
            let demand = self.ods[od_idx].demand;
            let od = &mut self.ods[od_idx];
            let idx = od.add_path(path);
            od.restricted_choice_set[idx].set_flow(demand)?;
        }
        Ok(())
    }

    /// For each OD pair, finds the current shortest path and inserts it into the
    /// restricted choice set when it is not already a member.
    pub fn column_generation(&mut self, sp: &mut ShortestPaths) -> Result<()> {
        let mut last_origin = None;
        for od_idx in 0..self.ods.len() {
            let (origin, destination) = {
                let od = &self.ods[od_idx];
                (od.origin, od.destination)
            };
            if last_origin != Some(origin) {
                sp.run(self, origin);
                last_origin = Some(origin);
            }
            let Some(edges) = sp.shortest_path_edges(self, origin, destination) else {
                error!("No path from {} to {} although its demand is positive", origin, destination);
                return Err(SolveError::DisconnectedDemand { origin, destination }.into());
            };
            if self.ods[od_idx]
                .restricted_choice_set
                .iter()
                .any(|p| p.edges == edges)
            {
                continue;
            }
            let path = Path::new(edges, &self.edges);
            let od = &mut self.ods[od_idx];
            if path.gen_cost < od.minimum_cost {
                od.minimum_cost = path.gen_cost;
            }
            od.path_was_added_during_column_generation = true;
            od.restricted_choice_set.push(path);
        }
        Ok(())
    }

    /// Average number of used routes (flow > 0) over restricted choice sets, weighting
    /// each OD pair equally.
    pub fn avg_choice_set_size(&self) -> f64 {
        if self.ods.is_empty() {
            return 0.0;
        }
        let used: usize = self.ods.iter().map(|od| od.num_used_routes()).sum();
        used as f64 / self.ods.len() as f64
    }

    /// Largest number of used routes (flow > 0) over restricted choice sets.
    pub fn max_choice_set_size(&self) -> usize {
        self.ods.iter().map(|od| od.num_used_routes()).max().unwrap_or(0)
    }

    /// Returns the first OD pair whose restricted-set flow does not sum to its demand
    /// within the given relative tolerance, if any.
    pub fn check_demand_integrity(&self, tolerance: f64) -> Option<&OdPair> {
        self.ods.iter().find(|od| {
            let sum: f64 = od.restricted_choice_set.iter().map(|p| p.flow()).sum();
            (od.demand - sum).abs() / od.demand > tolerance
        })
    }

    /// Sets every edge flow to zero and empties every restricted choice set.
    pub fn reset_network(&mut self) {
        for edge in &mut self.edges {
            edge.flow = 0.0;
        }
        for od in &mut self.ods {
            od.restricted_choice_set.clear();
            od.minimum_cost = f64::INFINITY;
            od.minimum_transformed_cost = f64::INFINITY;
        }
    }

    /// Enumerates the universal choice set of every OD pair: acyclic paths found by a
    /// depth-first search bounded by twice the current shortest-path cost. A branch
    /// breaching the bound abandons the remaining neighbours of its node as well.
    ///
    /// The enumeration uses an explicit frame stack and a single visited bit-set that
    /// is flipped on entry and restored on return. The problem is inherently
    /// non-polynomial; this is a diagnostic for small networks and is not used by the
    /// solver.
    pub fn generate_universal_choice_set(&mut self, sp: &mut ShortestPaths) {
        let mut last_origin = None;
        for od_idx in 0..self.ods.len() {
            let (origin, destination) = {
                let od = &self.ods[od_idx];
                (od.origin, od.destination)
            };
            if last_origin != Some(origin) {
                sp.run(self, origin);
                last_origin = Some(origin);
            }
            let tolerance = 2.0 * sp.distance(destination);
            let paths = self.enumerate_acyclic_paths(origin, destination, tolerance);
            self.ods[od_idx].universal_choice_set = Some(paths);
        }
    }

    /// Acyclic paths from `origin` to `destination`, pruned at `tolerance`: a node is
    /// abandoned as soon as one of its unvisited branches exceeds the tolerance.
    fn enumerate_acyclic_paths(
        &self,
        origin: NodeId,
        destination: NodeId,
        tolerance: f64,
    ) -> Vec<Path> {
        let mut paths = Vec::new();
        if !tolerance.is_finite() {
            return paths;
        }
        let mut visited = FixedBitSet::with_capacity(self.nodes.len() + 1);
        visited.insert(origin);
        // One frame per node on the current chain: the node and the rank of the next
        // neighbour to explore.
        let mut stack: Vec<(NodeId, usize)> = vec![(origin, 0)];
        let mut chain: Vec<usize> = Vec::new();
        let mut running_cost = 0.0;

        while let Some(&(u, next)) = stack.last() {
            let neighbours = &self.nodes[u - 1].neighbours;
            let mut backtrack = next >= neighbours.len();
            if !backtrack {
                stack.last_mut().unwrap().1 += 1;
                let v = neighbours[next];
                let e = self.edge_map[&(u, v)];
                let cost = running_cost + self.edges[e].gen_cost;
                if v == destination {
                    let mut edges = chain.clone();
                    edges.push(e);
                    paths.push(Path::new(edges, &self.edges));
                } else if !visited.contains(v) {
                    if cost > tolerance {
                        // One unvisited neighbour past the cost ceiling abandons the
                        // remaining neighbours of this node as well.
                        backtrack = true;
                    } else {
                        visited.insert(v);
                        chain.push(e);
                        running_cost = cost;
                        stack.push((v, 0));
                    }
                }
            }
            if backtrack {
                stack.pop();
                visited.set(u, false);
                if let Some(e) = chain.pop() {
                    running_cost -= self.edges[e].gen_cost;
                }
            }
        }
        paths
    }

    /// Replaces each restricted choice set with the members of the universal choice set
    /// whose cost is within `maximum_cost_ratio` times the OD minimum cost.
    ///
    /// The universal sets are consumed; all retained paths start with zero flow.
    pub fn cut_universal_choice_sets(&mut self, maximum_cost_ratio: f64) {
        for od in &mut self.ods {
            let Some(mut universal) = od.universal_choice_set.take() else {
                continue;
            };
            for path in &mut universal {
                path.update_cost(&self.edges);
            }
            universal.sort_by(|a, b| a.gen_cost.total_cmp(&b.gen_cost));
            let Some(first) = universal.first() else {
                od.restricted_choice_set = Vec::new();
                continue;
            };
            od.minimum_cost = first.gen_cost;
            let maximum_cost = maximum_cost_ratio * od.minimum_cost;
            universal.retain(|p| p.gen_cost <= maximum_cost);
            od.restricted_choice_set = universal;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ShortestPaths;

    fn two_route_network() -> Network {
        // Two parallel routes from 1 to 2: a direct edge and a detour through 3.
        let edges = vec![
            Edge::new(1, 2, 100.0, 1.0, 10.0, 0.15, 4.0),
            Edge::new(1, 3, 100.0, 1.0, 5.0, 0.15, 4.0),
            Edge::new(3, 2, 100.0, 1.0, 10.0, 0.15, 4.0),
        ];
        let ods = vec![OdPair::new(1, 2, 100.0).unwrap()];
        Network::from_parts("two-route", 3, edges, ods).unwrap()
    }

    #[test]
    fn edge_lookup_test() {
        let network = two_route_network();
        assert_eq!(network.edge(1, 2).unwrap().id, 1);
        assert_eq!(network.edge(3, 2).unwrap().free_flow_time, 10.0);
        assert!(network.edge(2, 1).is_err());
        assert_eq!(network.neighbours(1), &[2, 3]);
    }

    #[test]
    fn od_lookup_test() {
        let network = two_route_network();
        assert!(network.od(1, 2).is_some());
        assert!(network.od(1, 3).is_none());
        assert_eq!(network.total_demand(), 100.0);
    }

    #[test]
    fn bpr_cost_test() {
        let mut network = two_route_network();
        network.update_edge_costs(1.0, 0.0);
        assert_eq!(network.edge(1, 2).unwrap().time, 10.0);
        // Load the direct edge at capacity: t = 10 * (1 + 0.15) = 11.5.
        let mut sp = ShortestPaths::new(network.num_nodes());
        network.all_or_nothing(&mut sp).unwrap();
        network.load_network();
        network.update_edge_costs(1.0, 0.0);
        assert!((network.edge(1, 2).unwrap().time - 11.5).abs() < 1e-12);
        assert_eq!(network.edge(3, 2).unwrap().time, 10.0);
    }

    #[test]
    fn load_network_matches_path_flows_test() {
        let mut network = two_route_network();
        network.update_edge_costs(1.0, 0.0);
        let mut sp = ShortestPaths::new(network.num_nodes());
        network.all_or_nothing(&mut sp).unwrap();
        network.load_network();
        for edge in network.edges() {
            let expected: f64 = network
                .ods()
                .iter()
                .flat_map(|od| &od.restricted_choice_set)
                .filter(|p| p.edges.contains(&(edge.id - 1)))
                .map(|p| p.flow())
                .sum();
            assert_eq!(edge.flow, expected);
        }
    }

    #[test]
    fn column_generation_dedup_test() {
        let mut network = two_route_network();
        network.update_edge_costs(1.0, 0.0);
        let mut sp = ShortestPaths::new(network.num_nodes());
        network.all_or_nothing(&mut sp).unwrap();
        network.load_network();
        network.update_edge_costs(1.0, 0.0);
        network.update_path_costs();
        // The direct edge is loaded at capacity (t = 11.5) but still cheaper than the
        // detour (t = 15), so column generation must not add anything.
        network.column_generation(&mut sp).unwrap();
        assert_eq!(network.od(1, 2).unwrap().restricted_choice_set.len(), 1);
    }

    #[test]
    fn universal_choice_set_test() {
        let mut network = two_route_network();
        network.update_edge_costs(1.0, 0.0);
        let mut sp = ShortestPaths::new(network.num_nodes());
        network.generate_universal_choice_set(&mut sp);
        let od = network.od(1, 2).unwrap();
        let universal = od.universal_choice_set.as_ref().unwrap();
        // Both the direct edge (cost 10) and the detour (cost 15 <= 2 * 10) qualify.
        assert_eq!(universal.len(), 2);
        network.cut_universal_choice_sets(1.2);
        let od = network.od(1, 2).unwrap();
        assert_eq!(od.restricted_choice_set.len(), 1);
        assert_eq!(od.minimum_cost, 10.0);
    }

    #[test]
    fn cost_ceiling_abandons_remaining_neighbours_test() {
        // Neighbours of node 1 in edge order: 2 (destination), 3 (cost 25, above the
        // ceiling of 2 * 10), 4 (a valid detour). Once the branch through 3 breaches
        // the ceiling, the rest of node 1's neighbours are abandoned, so the detour
        // through 4 is never enumerated.
        let edges = vec![
            Edge::new(1, 2, 100.0, 1.0, 10.0, 0.15, 4.0),
            Edge::new(1, 3, 100.0, 1.0, 25.0, 0.15, 4.0),
            Edge::new(1, 4, 100.0, 1.0, 5.0, 0.15, 4.0),
            Edge::new(4, 2, 100.0, 1.0, 5.0, 0.15, 4.0),
        ];
        let ods = vec![OdPair::new(1, 2, 10.0).unwrap()];
        let mut network = Network::from_parts("ceiling", 4, edges, ods).unwrap();
        network.update_edge_costs(1.0, 0.0);
        let mut sp = ShortestPaths::new(network.num_nodes());
        network.generate_universal_choice_set(&mut sp);
        let od = network.od(1, 2).unwrap();
        let universal = od.universal_choice_set.as_ref().unwrap();
        assert_eq!(universal.len(), 1);
        assert_eq!(universal[0].edges, vec![0]);
    }

    #[test]
    fn reset_network_test() {
        let mut network = two_route_network();
        network.update_edge_costs(1.0, 0.0);
        let mut sp = ShortestPaths::new(network.num_nodes());
        network.all_or_nothing(&mut sp).unwrap();
        network.load_network();
        network.reset_network();
        assert!(network.edges().iter().all(|e| e.flow == 0.0));
        assert!(network.ods().iter().all(|od| od.restricted_choice_set.is_empty()));
    }

    #[test]
    fn invalid_network_test() {
        let edges = vec![Edge::new(1, 5, 100.0, 1.0, 10.0, 0.15, 4.0)];
        assert!(Network::from_parts("bad", 3, edges, vec![]).is_err());
        let edges = vec![Edge::new(1, 2, 0.0, 1.0, 10.0, 0.15, 4.0)];
        assert!(Network::from_parts("bad", 3, edges, vec![]).is_err());
    }
}

// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Origin-destination pairs and their route choice sets.
use anyhow::{bail, Result};

use super::{Edge, NodeId, Path};

/// An origin-destination pair with positive demand.
///
/// Flows live on the restricted choice set: the routes currently active for this OD.
/// The universal choice set (all acyclic routes within a cost ceiling) is only present
/// when explicitly enumerated.
#[derive(Clone, Debug)]
pub struct OdPair {
    pub origin: NodeId,
    pub destination: NodeId,
    pub demand: f64,
    /// The routes on which flow is loaded.
    pub restricted_choice_set: Vec<Path>,
    /// All acyclic routes, when enumerated; see
    /// [Network::generate_universal_choice_set](super::Network::generate_universal_choice_set).
    pub universal_choice_set: Option<Vec<Path>>,
    /// Smallest route cost in the restricted set, valid after the last cost refresh.
    pub minimum_cost: f64,
    /// Smallest transformed cost over used routes, valid after the last transformed-cost
    /// refresh.
    pub minimum_transformed_cost: f64,
    /// Set when column generation inserted a route in the current outer iteration.
    pub(crate) path_was_added_during_column_generation: bool,
}

impl OdPair {
    /// Creates an OD pair; the demand must be positive and the origin and destination
    /// must differ.
    pub fn new(origin: NodeId, destination: NodeId, demand: f64) -> Result<Self> {
        if !(demand > 0.0) || !demand.is_finite() {
            bail!(
                "OD pair ({}, {}) must have a positive demand, got {}",
                origin,
                destination,
                demand
            );
        }
        if origin == destination {
            bail!("OD pair ({}, {}) has identical origin and destination", origin, destination);
        }
        Ok(OdPair {
            origin,
            destination,
            demand,
            restricted_choice_set: Vec::new(),
            universal_choice_set: None,
            minimum_cost: f64::INFINITY,
            minimum_transformed_cost: f64::INFINITY,
            path_was_added_during_column_generation: false,
        })
    }

    /// Appends a path to the restricted choice set unless an edge-sequence-equal member
    /// already exists. Returns the index of the new or existing member.
    pub fn add_path(&mut self, path: Path) -> usize {
        if let Some(i) = self
            .restricted_choice_set
            .iter()
            .position(|p| p.same_route(&path))
        {
            return i;
        }
        if path.gen_cost < self.minimum_cost {
            self.minimum_cost = path.gen_cost;
        }
        self.restricted_choice_set.push(path);
        self.restricted_choice_set.len() - 1
    }

    /// Number of used routes: members of the restricted choice set carrying positive
    /// flow.
    pub fn num_used_routes(&self) -> usize {
        self.restricted_choice_set
            .iter()
            .filter(|p| p.flow() > 0.0)
            .count()
    }

    /// Recomputes the path-size overlap factor of every member of the restricted choice
    /// set.
    ///
    /// For route `k`, `PS_k = sum over edges a of k of (cost_a / cost_k) /
    /// (sum over routes j containing a of (L_min / L_j)^gamma)`, where `L` is the route
    /// generalized cost and `L_min` the OD minimum. Overlap is cost-weighted, so the
    /// factors must be refreshed whenever link costs change.
    pub fn update_path_size_factors(&mut self, edge_data: &[Edge], gamma: f64) {
        let set = &self.restricted_choice_set;
        if set.is_empty() {
            return;
        }
        let minimum_cost = set
            .iter()
            .map(|p| p.gen_cost)
            .fold(f64::INFINITY, f64::min);
        let factors: Vec<f64> = set
            .iter()
            .map(|path| {
                let mut ps = 0.0;
                for &a in &path.edges {
                    let overlap: f64 = set
                        .iter()
                        .filter(|other| other.edges.contains(&a))
                        .map(|other| (minimum_cost / other.gen_cost).powf(gamma))
                        .sum();
                    ps += edge_data[a].gen_cost / path.gen_cost / overlap;
                }
                ps
            })
            .collect();
        for (path, ps) in self.restricted_choice_set.iter_mut().zip(factors) {
            path.path_size = ps;
        }
    }
}

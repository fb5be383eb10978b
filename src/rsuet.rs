// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! The RSUET driver: restricted stochastic user equilibrium with threshold.
//!
//! The solver alternates an outer iteration that grows the restricted choice sets by
//! column generation and enforces the cost threshold, with an inner iteration that
//! solves a stochastic loading fixed-point on the frozen sets by the method of
//! successive averages.
use std::error::Error;
use std::fmt;

use anyhow::Result;
use log::{debug, info, warn};

use crate::choice::{RefCost, Rum};
use crate::convergence::{ConvergencePattern, ConvergenceRecord};
use crate::network::{Network, NodeId};
use crate::parameters::Parameters;
use crate::progress_bar::AssignmentProgressBar;
use crate::routing::ShortestPaths;

/// Relative tolerance on the per-OD flow sum before a demand-integrity warning is
/// emitted.
const DEMAND_TOLERANCE: f64 = 1e-9;

/// Fatal solver failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolveError {
    /// An OD pair has positive demand but its destination is unreachable.
    DisconnectedDemand { origin: NodeId, destination: NodeId },
    /// The flow arithmetic produced a NaN or infinite value.
    NumericFailure { detail: String },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DisconnectedDemand {
                origin,
                destination,
            } => write!(
                f,
                "demand from {origin} to {destination} cannot be routed: no path exists"
            ),
            Self::NumericFailure { detail } => write!(f, "numeric failure: {detail}"),
        }
    }
}

impl Error for SolveError {}

/// Result of a solve. The network keeps its flows and probabilities in both cases.
#[derive(Clone, Debug)]
pub enum SolveOutcome {
    /// The relative gap on used routes fell below the tolerance.
    Converged(ConvergencePattern),
    /// The outer iteration cap was reached first.
    IterationLimit(ConvergencePattern),
}

impl SolveOutcome {
    pub fn pattern(&self) -> &ConvergencePattern {
        match self {
            Self::Converged(p) | Self::IterationLimit(p) => p,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }
}

/// The RSUET route-choice model and its solution algorithm.
#[derive(Clone, Debug)]
pub struct Rsuet {
    rum: Rum,
    /// Lower reference cost: routes above `phi(minimum_cost)` are pruned from the
    /// restricted choice sets.
    phi: RefCost,
    /// Upper reference cost: routes above `omega(minimum_cost)` count as unused in the
    /// gap measure and in the unrestricted inner logit.
    omega: RefCost,
    /// Convergence tolerance on the relative gap.
    epsilon: f64,
    max_outer_iterations: u32,
    max_inner_iterations: u32,
    /// Optional tighter cost-ratio cut applied by the unrestricted inner logit.
    local_maximum_cost_ratio: Option<f64>,
    /// Solve the inner master problem with the unrestricted logit instead of the
    /// restricted one.
    use_unrestricted_inner_logit: bool,
}

impl Rsuet {
    /// Creates a solver with the default iteration caps.
    pub fn new(rum: Rum, phi: RefCost, omega: RefCost, epsilon: f64) -> Result<Self> {
        phi.validate()?;
        omega.validate()?;
        if !(epsilon > 0.0) || !epsilon.is_finite() {
            anyhow::bail!("The convergence tolerance must be positive, got {epsilon}");
        }
        Ok(Rsuet {
            rum,
            phi,
            omega,
            epsilon,
            max_outer_iterations: 100,
            max_inner_iterations: 1000,
            local_maximum_cost_ratio: None,
            use_unrestricted_inner_logit: false,
        })
    }

    /// Builds the solver from deserialized run [Parameters].
    pub fn from_parameters(parameters: &Parameters) -> Result<Self> {
        let rum = Rum::from_values(
            &parameters.rum.model,
            parameters.rum.theta,
            parameters.rum.beta_time,
            parameters.rum.beta_length,
            parameters.rum.path_size_exponent,
            parameters.omega,
        )?;
        let mut solver = Self::new(rum, parameters.phi, parameters.omega, parameters.epsilon)?;
        solver.max_outer_iterations = parameters.max_outer_iterations;
        solver.max_inner_iterations = parameters.max_inner_iterations;
        solver.local_maximum_cost_ratio = parameters.local_maximum_cost_ratio;
        solver.use_unrestricted_inner_logit = parameters.use_unrestricted_inner_logit;
        Ok(solver)
    }

    /// Overrides the outer and inner iteration caps.
    pub fn with_iteration_limits(mut self, outer: u32, inner: u32) -> Self {
        self.max_outer_iterations = outer;
        self.max_inner_iterations = inner;
        self
    }

    /// Solves the inner master problem with the unrestricted logit.
    pub fn with_unrestricted_inner_logit(mut self) -> Self {
        self.use_unrestricted_inner_logit = true;
        self
    }

    /// Sets a tighter cost-ratio cut for the unrestricted inner logit.
    pub fn with_local_maximum_cost_ratio(mut self, ratio: f64) -> Self {
        self.local_maximum_cost_ratio = Some(ratio);
        self
    }

    pub fn rum(&self) -> &Rum {
        &self.rum
    }

    pub fn phi(&self) -> RefCost {
        self.phi
    }

    pub fn omega(&self) -> RefCost {
        self.omega
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Brings the network to a restricted stochastic user equilibrium.
    ///
    /// Outer iterations generate columns, prune routes above `phi(minimum_cost)` and
    /// test convergence; inner iterations equilibrate flows on the frozen choice sets.
    /// Reaching the outer iteration cap is not an error: the last solution is kept on
    /// the network and reported through [SolveOutcome::IterationLimit].
    pub fn solve(&self, network: &mut Network) -> Result<SolveOutcome> {
        let mut sp = ShortestPaths::new(network.num_nodes());
        let mut pattern = ConvergencePattern::new();

        // Initialisation: free-flow costs, then an all-or-nothing assignment.
        network.load_network();
        self.refresh_costs(network);
        network.all_or_nothing(&mut sp)?;
        network.load_network();
        self.refresh_costs(network);
        if let Some(gamma) = self.rum.path_size_exponent() {
            network.update_path_size_factors(gamma);
        }
        info!(
            "Initial all-or-nothing assignment done ({} OD pairs)",
            network.num_ods()
        );

        let bar = AssignmentProgressBar::new(self.max_outer_iterations as usize);
        for outer in 1..=self.max_outer_iterations {
            for od in network.ods_mut() {
                od.path_was_added_during_column_generation = false;
            }
            network.column_generation(&mut sp)?;
            if let Some(gamma) = self.rum.path_size_exponent() {
                network.update_path_size_factors_where_paths_were_added(gamma);
            }

            self.enforce_threshold(network)?;
            network.load_network();

            let mut inner_iterations = 0;
            let mut gap = f64::INFINITY;
            for m in 0..self.max_inner_iterations {
                // Costs, path costs and overlap factors are refreshed from the flows of
                // the previous iteration before the probabilities are computed.
                self.refresh_costs(network);
                if let Some(gamma) = self.rum.path_size_exponent() {
                    network.update_path_size_factors(gamma);
                }
                let step = 1.0 / (m as f64 + 1.0);
                if self.use_unrestricted_inner_logit {
                    self.unrestricted_master_problem(network, step)?;
                } else {
                    self.restricted_master_problem(network, step)?;
                }
                network.load_network();
                // No cost refresh here: the gap of iteration `m` divides the updated
                // flows by the same enumerators that produced this iteration's
                // probabilities.
                self.update_transformed_costs(network);
                gap = rel_gap_used(network);
                if !gap.is_finite() {
                    return Err(SolveError::NumericFailure {
                        detail: format!("relative gap is {gap}"),
                    }
                    .into());
                }
                inner_iterations = m + 1;
                debug!("Inner iteration {}: relative gap {:.3e}", inner_iterations, gap);
                if gap < self.epsilon {
                    break;
                }
            }
            // The next column generation and pruning see costs consistent with the
            // final flows.
            self.refresh_costs(network);
            if let Some(gamma) = self.rum.path_size_exponent() {
                network.update_path_size_factors(gamma);
            }

            if let Some(od) = network.check_demand_integrity(DEMAND_TOLERANCE) {
                warn!(
                    "Assigned flow does not match demand on OD pair ({}, {})",
                    od.origin, od.destination
                );
            }

            pattern.push(ConvergenceRecord {
                outer_iteration: outer,
                inner_iterations,
                rel_gap_used: gap,
                max_choice_set_size: network.max_choice_set_size(),
                avg_choice_set_size: network.avg_choice_set_size(),
            });
            bar.set_message(format!("gap {gap:.3e}"));
            bar.inc();
            bar.suspend(|| {
                info!(
                    "Outer iteration {}: relative gap {:.3e} after {} inner iterations, largest choice set {}",
                    outer,
                    gap,
                    inner_iterations,
                    network.max_choice_set_size()
                );
            });

            if gap < self.epsilon {
                bar.finish();
                info!("Converged after {} outer iterations", outer);
                return Ok(SolveOutcome::Converged(pattern));
            }
        }
        bar.finish();
        Ok(SolveOutcome::IterationLimit(pattern))
    }

    /// Refreshes edge costs from the current flows, then path costs and OD minima.
    fn refresh_costs(&self, network: &mut Network) {
        network.update_edge_costs(self.rum.beta_time(), self.rum.beta_length());
        network.update_path_costs();
    }

    /// Marks routes above `phi(minimum_cost)` for removal and redistributes their flow
    /// over the kept routes, proportionally to the choice probabilities computed on the
    /// kept set.
    ///
    /// When every route of an OD pair is marked, the cheapest marked route is restored
    /// so the assigned flow keeps summing to the demand.
    fn enforce_threshold(&self, network: &mut Network) -> Result<()> {
        let rum = &self.rum;
        for od in network.ods_mut() {
            let minimum_cost = od.minimum_cost;
            let threshold = self.phi.reference_cost(minimum_cost);
            let set = &mut od.restricted_choice_set;

            let mut any_kept = false;
            for path in set.iter_mut() {
                path.marked_for_removal = path.gen_cost > threshold;
                any_kept |= !path.marked_for_removal;
            }
            if !any_kept {
                if let Some((cheapest, _)) = set
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.gen_cost.total_cmp(&b.gen_cost))
                {
                    set[cheapest].marked_for_removal = false;
                }
            }

            let removed_flow: f64 = set
                .iter()
                .filter(|p| p.marked_for_removal)
                .map(|p| p.flow())
                .sum();
            if removed_flow > 0.0 {
                let mut kept = Vec::with_capacity(set.len());
                let mut denominator = 0.0;
                for (i, path) in set.iter().enumerate() {
                    if !path.marked_for_removal {
                        let e = rum.enumerator(path, minimum_cost);
                        denominator += e;
                        kept.push((i, e));
                    }
                }
                for &(i, e) in &kept {
                    let share = if denominator > 0.0 {
                        e / denominator
                    } else {
                        1.0 / kept.len() as f64
                    };
                    let flow = set[i].flow() + removed_flow * share;
                    set[i].set_flow(flow)?;
                }
            }
            set.retain(|p| !p.marked_for_removal);
        }
        Ok(())
    }

    /// One step of the restricted inner master problem: choice probabilities over the
    /// whole restricted set, auxiliary flows, and the averaged flow update
    /// `flow <- (1 - step) * flow + step * aux_flow`.
    fn restricted_master_problem(&self, network: &mut Network, step: f64) -> Result<()> {
        let rum = &self.rum;
        for od in network.ods_mut() {
            let minimum_cost = od.minimum_cost;
            let demand = od.demand;
            let set = &mut od.restricted_choice_set;
            if set.is_empty() {
                continue;
            }
            let mut denominator = 0.0;
            let enumerators: Vec<f64> = set
                .iter()
                .map(|path| {
                    let e = rum.enumerator(path, minimum_cost);
                    denominator += e;
                    e
                })
                .collect();
            let uniform = 1.0 / set.len() as f64;
            for (path, e) in set.iter_mut().zip(enumerators) {
                // All enumerators can vanish (e.g. TMNL with a tight threshold); fall
                // back to uniform probabilities to keep the demand assigned.
                path.probability = if denominator > 0.0 { e / denominator } else { uniform };
                path.aux_flow = demand * path.probability;
                let flow = path.flow() * (1.0 - step) + path.aux_flow * step;
                path.set_flow(flow)?;
            }
        }
        Ok(())
    }

    /// One step of the unrestricted inner logit: routes above the upper reference cost
    /// get zero probability and zero auxiliary flow, so their flow decays by
    /// `(1 - step)` each iteration.
    fn unrestricted_master_problem(&self, network: &mut Network, step: f64) -> Result<()> {
        let rum = &self.rum;
        for od in network.ods_mut() {
            let minimum_cost = od.minimum_cost;
            let demand = od.demand;
            let mut threshold = self.omega.reference_cost(minimum_cost);
            if let Some(ratio) = self.local_maximum_cost_ratio {
                threshold = threshold.min(ratio * minimum_cost);
            }
            let set = &mut od.restricted_choice_set;
            if set.is_empty() {
                continue;
            }
            let mut denominator = 0.0;
            let enumerators: Vec<f64> = set
                .iter()
                .map(|path| {
                    let e = if path.gen_cost <= threshold {
                        rum.enumerator(path, minimum_cost)
                    } else {
                        0.0
                    };
                    denominator += e;
                    e
                })
                .collect();
            let uniform = 1.0 / set.len() as f64;
            for (path, e) in set.iter_mut().zip(enumerators) {
                path.probability = if denominator > 0.0 { e / denominator } else { uniform };
                path.aux_flow = demand * path.probability;
                let flow = path.flow() * (1.0 - step) + path.aux_flow * step;
                path.set_flow(flow)?;
            }
        }
        Ok(())
    }

    /// Refreshes the transformed cost `flow / enumerator` of every route and the
    /// per-OD minimum over used routes, using `omega` as the usability threshold.
    fn update_transformed_costs(&self, network: &mut Network) {
        let rum = &self.rum;
        for od in network.ods_mut() {
            let minimum_cost = od.minimum_cost;
            let threshold = self.omega.reference_cost(minimum_cost);
            let mut minimum_transformed_cost = f64::INFINITY;
            for path in &mut od.restricted_choice_set {
                let transformed_cost = if path.flow() == 0.0 || path.gen_cost >= threshold {
                    0.0
                } else {
                    let e = rum.enumerator(path, minimum_cost);
                    if e > 0.0 {
                        path.flow() / e
                    } else {
                        0.0
                    }
                };
                path.transformed_cost = transformed_cost;
                if path.flow() > 0.0 && transformed_cost < minimum_transformed_cost {
                    minimum_transformed_cost = transformed_cost;
                }
            }
            od.minimum_transformed_cost = minimum_transformed_cost;
        }
    }
}

/// Relative gap on used routes: flow-weighted excess of transformed cost over the OD
/// minimum, relative to the flow-weighted transformed cost itself.
pub fn rel_gap_used(network: &Network) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for od in network.ods() {
        let cmin = od.minimum_transformed_cost;
        if !cmin.is_finite() {
            continue;
        }
        for path in &od.restricted_choice_set {
            let flow = path.flow();
            if flow > 0.0 {
                numerator += flow * (path.transformed_cost - cmin);
                denominator += flow * path.transformed_cost;
            }
        }
    }
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

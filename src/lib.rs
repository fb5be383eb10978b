// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Library for RSUET: a restricted stochastic user equilibrium traffic-assignment solver.
//!
//! The solver takes a road network with BPR-style volume-delay functions and an
//! origin-destination demand table, and finds link flows and per-OD route
//! probabilities such that every used route costs less than an OD-specific
//! threshold and the flow split over used routes matches the choice
//! probabilities of a random utility model.
#![doc(html_no_source)]

pub mod choice;
pub mod convergence;
pub mod io;
pub mod logging;
pub mod network;
pub mod parameters;
pub mod progress_bar;
pub mod routing;
pub mod rsuet;

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

// Dependencies only used in the bins.
use clap as _;

// Re-exports.
pub use crate::choice::{RefCost, Rum};
pub use crate::convergence::ConvergencePattern;
pub use crate::network::Network;
pub use crate::parameters::Parameters;
pub use crate::rsuet::{Rsuet, SolveError, SolveOutcome};

/// Reads the run parameters, solves the assignment and stores the results to the output
/// directory.
///
/// This function takes as argument the path to the JSON parameters file.
pub fn run_assignment(path: &Path) -> Result<()> {
    let parameters = io::read_parameters(path)?;
    parameters.validate()?;

    let output_dir = io::output::create_output_folder(&parameters)?;

    logging::initialize_logging(&output_dir, parameters.verbose)?;
    info!("Output folder is {:?}", output_dir);

    let mut network = io::tntp::read_network(&parameters)
        .with_context(|| format!("Failed to read network from {:?}", parameters.network_directory))?;
    info!(
        "Network `{}` read: {} nodes, {} edges, {} OD pairs, total demand {:.1}",
        network.name(),
        network.num_nodes(),
        network.num_edges(),
        network.num_ods(),
        network.total_demand(),
    );

    let model = Rsuet::from_parameters(&parameters)?;
    let outcome = model.solve(&mut network)?;
    if let SolveOutcome::IterationLimit(ref pattern) = outcome {
        warn!(
            "Iteration limit reached before convergence (last relative gap {:.3e})",
            pattern.last_gap().unwrap_or(f64::NAN)
        );
    }

    io::output::write_output(&output_dir, &network, &model, outcome.pattern(), &parameters)?;
    info!("Done");
    Ok(())
}

// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Semicolon-delimited CSV output of a solved assignment.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use csv::WriterBuilder;
use log::info;

use crate::convergence::ConvergencePattern;
use crate::network::Network;
use crate::parameters::Parameters;
use crate::rsuet::Rsuet;

const DELIMITER: u8 = b';';

/// Creates the per-run output folder inside the configured output directory.
///
/// The folder is named by the caller or, by default, `<network>-output_<timestamp>`.
pub fn create_output_folder(parameters: &Parameters) -> Result<PathBuf> {
    let folder_name = match &parameters.output_folder_name {
        Some(name) => name.clone(),
        None => {
            let network_name = parameters
                .network_directory
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("network");
            format!(
                "{}-output_{}",
                network_name,
                Local::now().format("%Y-%m-%d_%H-%M-%S")
            )
        }
    };
    let path = parameters.output_directory.join(folder_name);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create output directory {path:?}"))?;
    Ok(path)
}

/// Writes the whole output set: flow solution, parameters, choice sets, choice-set
/// summary and convergence pattern.
pub fn write_output(
    output_dir: &Path,
    network: &Network,
    solver: &Rsuet,
    pattern: &ConvergencePattern,
    parameters: &Parameters,
) -> Result<()> {
    write_flow_solution(output_dir, network)?;
    write_parameters(output_dir, solver, parameters)?;
    write_choice_sets(output_dir, network, parameters.minimum_flow_to_be_considered_used)?;
    write_choice_set_summary(output_dir, network)?;
    write_convergence(output_dir, pattern)?;
    info!("Results written to {:?}", output_dir);
    Ok(())
}

fn writer(path: PathBuf) -> Result<csv::Writer<std::fs::File>> {
    WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_path(&path)
        .with_context(|| format!("Failed to create {path:?}"))
}

/// `flow.csv`: one row per edge with its final flow and congested time.
fn write_flow_solution(output_dir: &Path, network: &Network) -> Result<()> {
    let mut out = writer(output_dir.join("flow.csv"))?;
    out.write_record(["EdgeID", "Flow", "Time"])?;
    for edge in network.edges() {
        out.write_record([
            edge.id.to_string(),
            edge.flow.to_string(),
            edge.time.to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

/// `parameters.csv`: key/value rows of the RUM and solver parameters.
fn write_parameters(output_dir: &Path, solver: &Rsuet, parameters: &Parameters) -> Result<()> {
    let rum = solver.rum();
    let mut rows: Vec<(&str, String)> = vec![
        ("model", rum.model_name().to_owned()),
        ("theta", rum.theta().to_string()),
        ("beta_time", rum.beta_time().to_string()),
        ("beta_length", rum.beta_length().to_string()),
    ];
    if let Some(gamma) = rum.path_size_exponent() {
        rows.push(("path_size_exponent", gamma.to_string()));
    }
    rows.push(("phi", solver.phi().to_string()));
    rows.push(("omega", solver.omega().to_string()));
    rows.push(("epsilon", solver.epsilon().to_string()));
    rows.push(("max_outer_iterations", parameters.max_outer_iterations.to_string()));
    rows.push(("max_inner_iterations", parameters.max_inner_iterations.to_string()));
    rows.push(("maximum_cost_ratio", parameters.maximum_cost_ratio.to_string()));
    if let Some(ratio) = parameters.local_maximum_cost_ratio {
        rows.push(("local_maximum_cost_ratio", ratio.to_string()));
    }
    rows.push(("demand_scale", parameters.demand_scale.to_string()));
    rows.push((
        "minimum_flow_to_be_considered_used",
        parameters.minimum_flow_to_be_considered_used.to_string(),
    ));

    let mut out = writer(output_dir.join("parameters.csv"))?;
    for (key, value) in rows {
        out.write_record([key, value.as_str()])?;
    }
    out.flush()?;
    Ok(())
}

/// `choice-sets.csv`: one row per used route, with the node sequence, choice
/// probability, flow and generalized cost.
fn write_choice_sets(output_dir: &Path, network: &Network, minimum_flow: f64) -> Result<()> {
    let mut out = writer(output_dir.join("choice-sets.csv"))?;
    out.write_record(["O", "D", "Path", "Choice-P", "Flow", "Generalized-cost"])?;
    for od in network.ods() {
        for path in &od.restricted_choice_set {
            if path.flow() >= minimum_flow {
                let nodes = network
                    .node_sequence(&path.edges)
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                out.write_record([
                    od.origin.to_string(),
                    od.destination.to_string(),
                    nodes,
                    path.probability.to_string(),
                    path.flow().to_string(),
                    path.gen_cost.to_string(),
                ])?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// `choice-set-summary.csv`: aggregate statistics over the restricted choice sets.
fn write_choice_set_summary(output_dir: &Path, network: &Network) -> Result<()> {
    let mut out = writer(output_dir.join("choice-set-summary.csv"))?;
    let avg = network.avg_choice_set_size().to_string();
    let max = network.max_choice_set_size().to_string();
    out.write_record(["Average-choice-set-size", avg.as_str()])?;
    out.write_record(["Max-choice-set-size", max.as_str()])?;
    out.flush()?;
    Ok(())
}

/// `convergence.csv`: one row per outer iteration.
fn write_convergence(output_dir: &Path, pattern: &ConvergencePattern) -> Result<()> {
    let mut out = writer(output_dir.join("convergence.csv"))?;
    out.write_record([
        "Outer-iteration",
        "Inner-iterations",
        "Relative-gap-used",
        "Max-choice-set-size",
        "Avg-choice-set-size",
    ])?;
    for record in pattern.records() {
        out.write_record([
            record.outer_iteration.to_string(),
            record.inner_iterations.to_string(),
            record.rel_gap_used.to_string(),
            record.max_choice_set_size.to_string(),
            record.avg_choice_set_size.to_string(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Run parameters, deserialized from a JSON file.
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde_derive::{Deserialize, Serialize};

use crate::choice::RefCost;

fn default_demand_scale() -> f64 {
    1.0
}

fn default_max_outer_iterations() -> u32 {
    100
}

fn default_max_inner_iterations() -> u32 {
    1000
}

fn default_maximum_cost_ratio() -> f64 {
    1.4
}

fn default_beta_time() -> f64 {
    1.0
}

/// Parameters of the random utility model.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RumParameters {
    /// `"MNL"`, `"TMNL"` or `"PSL"`.
    pub model: String,
    /// Logit scale, must be positive.
    pub theta: f64,
    /// Weight of travel time in the generalized cost.
    #[serde(default = "default_beta_time")]
    pub beta_time: f64,
    /// Weight of length in the generalized cost.
    #[serde(default)]
    pub beta_length: f64,
    /// Overlap exponent, mandatory for the PSL.
    #[serde(default)]
    pub path_size_exponent: Option<f64>,
}

/// Set of parameters of an assignment run.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Parameters {
    /// Directory holding the TNTP network triplet.
    pub network_directory: PathBuf,
    /// Directory in which the per-run output folder is created.
    pub output_directory: PathBuf,
    /// Name of the output folder; a timestamped name is generated when omitted.
    #[serde(default)]
    pub output_folder_name: Option<String>,
    /// Multiplier applied to every demand value on load.
    #[serde(default = "default_demand_scale")]
    pub demand_scale: f64,
    /// When `true`, every network edge is also materialised in the reverse direction
    /// with identical parameters.
    #[serde(default)]
    pub is_network_bidirectional: bool,
    /// Convergence tolerance on the relative gap.
    pub epsilon: f64,
    #[serde(default = "default_max_outer_iterations")]
    pub max_outer_iterations: u32,
    #[serde(default = "default_max_inner_iterations")]
    pub max_inner_iterations: u32,
    /// Cost-ratio ceiling used when cutting an enumerated universal choice set.
    #[serde(default = "default_maximum_cost_ratio")]
    pub maximum_cost_ratio: f64,
    /// Tighter cost-ratio cut for the unrestricted inner logit, when set.
    #[serde(default)]
    pub local_maximum_cost_ratio: Option<f64>,
    /// Routes below this flow are left out of the choice-set output.
    #[serde(default)]
    pub minimum_flow_to_be_considered_used: f64,
    pub rum: RumParameters,
    /// Lower reference cost (pruning threshold).
    pub phi: RefCost,
    /// Upper reference cost (usability threshold).
    pub omega: RefCost,
    #[serde(default)]
    pub use_unrestricted_inner_logit: bool,
    #[serde(default)]
    pub verbose: bool,
}

impl Parameters {
    /// Rejects invalid values before anything is read or solved.
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon > 0.0) || !self.epsilon.is_finite() {
            bail!("Value `epsilon` must be positive, got {}", self.epsilon);
        }
        if !(self.demand_scale > 0.0) || !self.demand_scale.is_finite() {
            bail!("Value `demand_scale` must be positive, got {}", self.demand_scale);
        }
        if self.max_outer_iterations == 0 || self.max_inner_iterations == 0 {
            bail!("Iteration limits must be at least 1");
        }
        if !(self.maximum_cost_ratio >= 1.0) {
            bail!(
                "Value `maximum_cost_ratio` must be at least 1, got {}",
                self.maximum_cost_ratio
            );
        }
        if let Some(ratio) = self.local_maximum_cost_ratio {
            if !(ratio >= 1.0) {
                bail!("Value `local_maximum_cost_ratio` must be at least 1, got {ratio}");
            }
        }
        if self.minimum_flow_to_be_considered_used < 0.0 {
            bail!(
                "Value `minimum_flow_to_be_considered_used` must be non-negative, got {}",
                self.minimum_flow_to_be_considered_used
            );
        }
        self.phi.validate()?;
        self.omega.validate()?;
        Ok(())
    }
}

// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Random utility models for route choice, and reference-cost functions.
use std::fmt;

use anyhow::{anyhow, bail, Result};
use serde_derive::{Deserialize, Serialize};

use crate::network::Path;

/// A reference-cost function: maps the minimum cost of an OD pair to the threshold
/// below which a route may be used.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum RefCost {
    /// `tau * minimum_cost`, with `tau >= 1`.
    TauMin(f64),
    /// `minimum_cost + delta`, with `delta >= 0`.
    MinPlusDelta(f64),
}

impl RefCost {
    /// Checks that the function can never cut the minimum-cost route itself.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::TauMin(tau) if !(*tau >= 1.0) => {
                bail!("The reference-cost factor must be at least 1, got {tau}")
            }
            Self::MinPlusDelta(delta) if !(*delta >= 0.0) => {
                bail!("The reference-cost offset must be non-negative, got {delta}")
            }
            _ => Ok(()),
        }
    }

    /// The threshold cost for an OD pair with the given minimum route cost.
    pub fn reference_cost(&self, minimum_cost: f64) -> f64 {
        match self {
            Self::TauMin(tau) => tau * minimum_cost,
            Self::MinPlusDelta(delta) => minimum_cost + delta,
        }
    }
}

impl fmt::Display for RefCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TauMin(tau) => write!(f, "{tau} * min"),
            Self::MinPlusDelta(delta) => write!(f, "min + {delta}"),
        }
    }
}

/// The model variant of a [Rum].
#[derive(Clone, Debug)]
pub enum RumKind {
    /// Plain multinomial logit.
    Mnl,
    /// Truncated multinomial logit: routes above the reference cost get probability 0.
    Tmnl { omega: RefCost },
    /// Path-size logit: multinomial logit with an overlap-correction factor.
    Psl { path_size_exponent: f64 },
}

/// A random utility model mapping route cost to a choice-probability enumerator.
///
/// The probability of route `k` on an OD pair is `e_k / sum_j e_j`, where the
/// enumerator `e_k` is produced by [Rum::enumerator]. The deterministic part of the
/// utility is the negative generalized cost `-(beta_time * t + beta_length * l)`, summed
/// over the route edges.
#[derive(Clone, Debug)]
pub struct Rum {
    /// Logit scale; must be positive.
    theta: f64,
    beta_time: f64,
    beta_length: f64,
    kind: RumKind,
}

impl Rum {
    /// Creates a [Rum] from deserialized values.
    ///
    /// `model` is one of `"MNL"`, `"TMNL"` and `"PSL"`. The reference-cost function
    /// `omega` is only used by the TMNL; `path_size_exponent` is mandatory for the PSL.
    pub fn from_values(
        model: &str,
        theta: f64,
        beta_time: f64,
        beta_length: f64,
        path_size_exponent: Option<f64>,
        omega: RefCost,
    ) -> Result<Self> {
        let kind = match model {
            "MNL" => RumKind::Mnl,
            "TMNL" => {
                omega.validate()?;
                RumKind::Tmnl { omega }
            }
            "PSL" => {
                let path_size_exponent = path_size_exponent.ok_or_else(|| {
                    anyhow!("Value `path_size_exponent` is mandatory when `model` is \"PSL\"")
                })?;
                if !(path_size_exponent >= 0.0) {
                    bail!(
                        "Value `path_size_exponent` must be non-negative, got {path_size_exponent}"
                    );
                }
                RumKind::Psl { path_size_exponent }
            }
            s => bail!("Unknown RUM model: `{s}` (expected \"MNL\", \"TMNL\" or \"PSL\")"),
        };
        if !(theta > 0.0) || !theta.is_finite() {
            bail!("Value `theta` must be positive, got {theta}");
        }
        if !(beta_time >= 0.0) || !(beta_length >= 0.0) {
            bail!("Values `beta_time` and `beta_length` must be non-negative, got {beta_time} and {beta_length}");
        }
        if beta_time == 0.0 && beta_length == 0.0 {
            bail!("At least one of `beta_time` and `beta_length` must be positive");
        }
        Ok(Rum {
            theta,
            beta_time,
            beta_length,
            kind,
        })
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn beta_time(&self) -> f64 {
        self.beta_time
    }

    pub fn beta_length(&self) -> f64 {
        self.beta_length
    }

    pub fn kind(&self) -> &RumKind {
        &self.kind
    }

    /// The model name as used in the configuration surface.
    pub fn model_name(&self) -> &'static str {
        match self.kind {
            RumKind::Mnl => "MNL",
            RumKind::Tmnl { .. } => "TMNL",
            RumKind::Psl { .. } => "PSL",
        }
    }

    /// The path-size exponent, when the model corrects for overlap.
    pub fn path_size_exponent(&self) -> Option<f64> {
        match self.kind {
            RumKind::Psl { path_size_exponent } => Some(path_size_exponent),
            _ => None,
        }
    }

    /// The deterministic part of the route utility: the negative generalized cost.
    pub fn deterministic_utility(&self, path: &Path) -> f64 {
        -path.gen_cost
    }

    /// The enumerator of the choice-probability expression for a route, given the
    /// minimum route cost of its OD pair.
    ///
    /// Always non-negative. The TMNL returns 0 for routes above the reference cost; the
    /// PSL weights the exponential by the path-size factor.
    pub fn enumerator(&self, path: &Path, minimum_cost: f64) -> f64 {
        match &self.kind {
            RumKind::Mnl => (-self.theta * path.gen_cost).exp(),
            RumKind::Tmnl { omega } => {
                if path.gen_cost <= omega.reference_cost(minimum_cost) {
                    (-self.theta * path.gen_cost).exp()
                } else {
                    0.0
                }
            }
            RumKind::Psl { .. } => path.path_size * (-self.theta * path.gen_cost).exp(),
        }
    }
}

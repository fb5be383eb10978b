// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Convergence history of a solve.
use serde_derive::{Deserialize, Serialize};

/// One outer iteration of the solver.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ConvergenceRecord {
    pub outer_iteration: u32,
    /// Number of inner iterations spent on the frozen choice sets.
    pub inner_iterations: u32,
    /// Relative gap on used routes at the end of the iteration.
    pub rel_gap_used: f64,
    pub max_choice_set_size: usize,
    pub avg_choice_set_size: f64,
}

/// Append-only sequence of [ConvergenceRecord]s, one per outer iteration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConvergencePattern {
    records: Vec<ConvergenceRecord>,
}

impl ConvergencePattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ConvergenceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ConvergenceRecord] {
        &self.records
    }

    /// The relative gap of the last outer iteration, if any iteration ran.
    pub fn last_gap(&self) -> Option<f64> {
        self.records.last().map(|r| r.rel_gap_used)
    }

    /// Total number of outer iterations performed.
    pub fn num_outer_iterations(&self) -> usize {
        self.records.len()
    }
}

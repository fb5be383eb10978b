// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Import of networks and run parameters, export of results.
pub mod output;
pub mod tntp;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};

use crate::parameters::Parameters;

/// Reads the run [Parameters] from a JSON file.
pub fn read_parameters(path: &Path) -> Result<Parameters> {
    let file = File::open(path).with_context(|| format!("Cannot open parameters file {path:?}"))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("Cannot parse parameters file {path:?}"))
}

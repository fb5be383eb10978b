// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Binary to run an RSUET assignment from a JSON parameters file.
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// RSUET traffic-assignment solver.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON file with the run parameters
    #[arg(required = true)]
    parameters: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    rsuet::run_assignment(&args.parameters)
}

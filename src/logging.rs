// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Everything related to logging.
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};

/// Initializes logging to the terminal and to `log.txt` in the output directory.
///
/// The terminal level is `Debug` when `verbose` is set, `Info` otherwise; the log file
/// always records at `Debug`.
pub fn initialize_logging(output: &Path, verbose: bool) -> Result<()> {
    let term_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_file = File::create(output.join("log.txt")).context("Failed to create log file")?;
    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            term_level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, Config::default(), log_file),
    ];
    CombinedLogger::init(loggers).context("Failed to initialize logging")
}

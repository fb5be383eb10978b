// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Progress bar and spinner for the library.
use std::borrow::Cow;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{log_enabled, Level};

/// Interval at which spinners are automatically ticked.
const TICK: Duration = Duration::from_millis(250);

/// A progress bar of known length, hidden when info logging is off.
#[derive(Debug)]
pub struct AssignmentProgressBar(ProgressBar);

impl AssignmentProgressBar {
    pub fn new(length: usize) -> Self {
        let bar = if log_enabled!(Level::Info) {
            ProgressBar::new(length as u64)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40} {pos}/{len} {msg}")
                .unwrap(),
        );
        AssignmentProgressBar(bar)
    }

    pub fn set_message(&self, msg: impl Into<Cow<'static, str>>) {
        self.0.set_message(msg);
    }

    pub fn inc(&self) {
        self.0.inc(1);
    }

    /// Hides the bar while the closure writes to the terminal.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.0.suspend(f)
    }

    pub fn finish(&self) {
        self.0.finish_and_clear();
    }
}

/// A spinner with a message, hidden when info logging is off.
#[derive(Debug)]
pub struct Spinner(ProgressBar);

impl Spinner {
    pub fn new(msg: &str) -> Self {
        let bar = if log_enabled!(Level::Info) {
            ProgressBar::new(1).with_message(msg.to_owned())
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}").unwrap());
        bar.enable_steady_tick(TICK);
        Spinner(bar)
    }

    pub fn finish(&mut self) {
        self.0.finish_and_clear();
    }
}

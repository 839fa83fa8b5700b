//! Client-side progress spinner
//!
//! The response carries no length, so this is a byte counter with a rate
//! rather than a bar.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct TransferProgress {
    spinner: ProgressBar,
}

impl TransferProgress {
    pub fn new(enabled: bool, label: &str, start: u64) -> Self {
        let spinner = if enabled {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} {bytes} ({bytes_per_sec}) in {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
        );
        spinner.set_message(label.to_string());
        spinner.set_position(start);
        if enabled {
            spinner.enable_steady_tick(Duration::from_millis(100));
        }
        Self { spinner }
    }

    pub fn advance(&self, n: usize) {
        self.spinner.inc(n as u64);
    }

    pub fn position(&self) -> u64 {
        self.spinner.position()
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

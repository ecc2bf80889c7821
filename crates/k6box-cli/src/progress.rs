//! Spinner shown on stderr while a load run is in flight.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Clears itself when dropped, so early returns never leave a stuck line.
pub struct RunSpinner {
    bar: Option<ProgressBar>,
}

impl RunSpinner {
    /// Start a spinner unless `quiet` (JSON mode keeps stderr for logs only).
    pub fn start(message: String, quiet: bool) -> Self {
        if quiet {
            return Self { bar: None };
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }
}

impl Drop for RunSpinner {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

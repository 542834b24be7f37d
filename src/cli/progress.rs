//! CLI-specific progress handling for dataplane-http

use std::sync::Arc;

use dataplane_http::{ProgressCallback, TransferOutcome};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {bytes_per_sec} ETA: {eta}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bytes} {bytes_per_sec}";

/// Creates a progress bar; a zero total means the length is unknown so far
pub fn create_progress_bar(total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    pb.set_style(style_for(total_size));
    pb
}

fn style_for(total_size: u64) -> ProgressStyle {
    let template = if total_size == 0 {
        SPINNER_TEMPLATE
    } else {
        BAR_TEMPLATE
    };
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Progress bar for a single transfer
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    pub fn new(message: &str) -> Self {
        eprintln!("{message}");
        Self {
            pb: create_progress_bar(0),
        }
    }

    /// Callback that moves the bar; a restarted transfer moves it back
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        Arc::new(move |transferred, total| {
            if total != 0 && pb.length() != Some(total) {
                pb.set_length(total);
                pb.set_style(style_for(total));
            }
            pb.set_position(transferred);
        })
    }

    pub fn finish(&self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Succeeded { .. } => self.pb.finish_with_message("✅ Transfer completed!"),
            TransferOutcome::Failed { .. } => self.pb.abandon_with_message("❌ Transfer failed"),
            TransferOutcome::Cancelled { .. } => {
                self.pb.abandon_with_message("⏹ Transfer cancelled")
            }
        }
    }
}

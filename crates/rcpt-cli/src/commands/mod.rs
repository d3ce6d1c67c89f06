//! CLI command implementations.

pub mod batch;
pub mod config;
pub mod extract;
pub mod models;
pub mod process;
pub mod structure;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner shown on stderr while a document is being processed.
pub(crate) fn spinner(message: impl Into<String>) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(message.into());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(pb)
}

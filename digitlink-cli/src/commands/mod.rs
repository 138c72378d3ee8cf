//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod mnist;
pub(crate) mod send;

use anyhow::{Context, Result};
use console::style;
use digitlink::{InferenceLink, NativePort};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::Settings;

/// Open the configured port and announce it.
pub(crate) fn open_link(quiet: bool, settings: &Settings) -> Result<InferenceLink<NativePort>> {
    let serial = settings.serial()?;
    if !quiet {
        eprintln!(
            "{} Using {} at {} baud ({} mode)",
            style("•").cyan(),
            style(&serial.port_name).green(),
            serial.baud_rate,
            settings
                .link
                .mode
                .name()
        );
    }
    InferenceLink::open(&serial, settings.link.clone())
        .with_context(|| format!("Failed to open {}", serial.port_name))
}

/// Byte progress bar on stderr, hidden when quiet or not a terminal.
pub(crate) fn transfer_progress(quiet: bool, total: usize) -> ProgressBar {
    if quiet || !crate::use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
    {
        pb.set_style(bar_style.progress_chars("#>-"));
    }
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

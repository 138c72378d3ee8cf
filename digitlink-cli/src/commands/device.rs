//! Firmware menu commands (`self-test`, `info`, `ping`).

use anyhow::{Context, Result, bail};
use console::style;
use digitlink::DeviceCommand;
use std::time::Duration;

use super::open_link;
use crate::{Cli, Settings};

fn run_query(cli: &Cli, settings: &Settings, command: DeviceCommand, wait: Duration) -> Result<()> {
    let mut link = open_link(cli.quiet, settings)?;
    let lines = link
        .query(command, wait)
        .with_context(|| format!("{command:?} command failed"))?;
    link.close()?;

    if lines.is_empty() {
        bail!("No output from device within {}ms", wait.as_millis());
    }
    for line in &lines {
        println!("{line}");
    }
    Ok(())
}

/// Run the device self-test.
pub(crate) fn cmd_self_test(cli: &Cli, settings: &Settings, wait: Duration) -> Result<()> {
    run_query(cli, settings, DeviceCommand::SelfTest, wait)
}

/// Print the network description reported by the device.
pub(crate) fn cmd_info(cli: &Cli, settings: &Settings, wait: Duration) -> Result<()> {
    run_query(cli, settings, DeviceCommand::Info, wait)
}

/// Check that the device answers the menu command.
pub(crate) fn cmd_ping(cli: &Cli, settings: &Settings, wait: Duration) -> Result<()> {
    let mut link = open_link(cli.quiet, settings)?;
    let alive = link
        .ping(wait)
        .context("Ping failed")?;
    link.close()?;

    if !alive {
        bail!(
            "Device on {} did not answer within {}ms",
            settings
                .port
                .as_deref()
                .unwrap_or("?"),
            wait.as_millis()
        );
    }
    if !cli.quiet {
        eprintln!("{} Device is responding", style("✓").green());
    }
    Ok(())
}

//! Single-payload send commands (`send`, `zeros`, `pixel`).

use anyhow::{Context, Result};
use console::style;
use digitlink::{IMAGE_SIZE, Inference, Payload, PredictionResult};
use log::{debug, warn};
use std::path::Path;

use super::{open_link, transfer_progress};
use crate::{Cli, Settings};

/// Send a payload file.
pub(crate) fn cmd_send(
    cli: &Cli,
    settings: &Settings,
    file: &Path,
    invert: bool,
    json: bool,
) -> Result<()> {
    let mut payload = Payload::from_file(file)
        .with_context(|| format!("Failed to load payload {}", file.display()))?;
    if payload.len() != IMAGE_SIZE {
        warn!(
            "Payload is {} bytes, the device expects {IMAGE_SIZE}",
            payload.len()
        );
    }
    if invert {
        payload = payload.inverted();
    }
    send_payload(cli, settings, &payload, json)
}

/// Send an all-zero payload.
pub(crate) fn cmd_zeros(cli: &Cli, settings: &Settings, len: usize, json: bool) -> Result<()> {
    let payload = Payload::zeros(len)?;
    send_payload(cli, settings, &payload, json)
}

/// Send an image with one pixel set.
pub(crate) fn cmd_pixel(
    cli: &Cli,
    settings: &Settings,
    index: usize,
    value: u8,
    json: bool,
) -> Result<()> {
    let payload = Payload::single_pixel(IMAGE_SIZE, index, value)?;
    send_payload(cli, settings, &payload, json)
}

fn send_payload(cli: &Cli, settings: &Settings, payload: &Payload, json: bool) -> Result<()> {
    let quiet = cli.quiet || json;
    debug!("Payload: {}", payload.summary());

    let mut link = open_link(quiet, settings)?;
    let pb = transfer_progress(quiet, payload.len());
    let inference = link
        .infer(payload, |sent, _total| pb.set_position(sent as u64))
        .context("Inference failed");
    pb.finish_and_clear();
    let inference = inference?;
    link.close()?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "payload_len": payload.len(),
                "inference": inference,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_inference(quiet, &inference);
    Ok(())
}

/// Print the prediction to stdout and transfer details to stderr.
fn print_inference(quiet: bool, inference: &Inference) {
    match &inference.prediction {
        PredictionResult::RawByte { digit } => println!("Prediction: {digit}"),
        PredictionResult::Text {
            digit: Some(digit), ..
        } => println!("Prediction: {digit}"),
        PredictionResult::Text { text, digit: None } => println!("Device replied: {text}"),
        PredictionResult::None => {
            eprintln!(
                "{} No prediction received",
                style("!").yellow()
            );
        },
    }

    if quiet {
        return;
    }
    for line in &inference.diagnostics {
        eprintln!("  {}", style(line).dim());
    }
    let stats = &inference.stats;
    eprintln!(
        "{} Sent {} bytes in {} writes ({} retries)",
        style("✓").green(),
        stats.bytes_sent,
        stats.writes,
        stats.retries()
    );
}

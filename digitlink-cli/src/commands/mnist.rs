//! MNIST IDX batch evaluation.

use anyhow::{Context, Result, bail};
use console::style;
use digitlink::{IdxImages, IdxLabels};
use log::warn;
use std::ops::Range;
use std::path::Path;

use super::{open_link, transfer_progress};
use crate::{Cli, CliError, Settings};

/// Running accuracy over a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tally {
    pub(crate) sent: usize,
    pub(crate) correct: usize,
    pub(crate) missing: usize,
    pub(crate) failed: usize,
}

impl Tally {
    fn record(&mut self, label: u8, predicted: Option<u8>) {
        self.sent += 1;
        match predicted {
            Some(digit) if digit == label => self.correct += 1,
            Some(_) => {},
            None => self.missing += 1,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn accuracy(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.correct as f64 * 100.0 / self.sent as f64
        }
    }
}

/// Pick the image indices to send.
pub(crate) fn select_range(
    count: usize,
    index: Option<usize>,
    first: Option<usize>,
) -> Result<Range<usize>> {
    match (index, first) {
        (Some(i), _) if i >= count => {
            Err(CliError::Usage(format!("--index {i} out of range (dataset has {count} images)")).into())
        },
        (Some(i), _) => Ok(i..i + 1),
        (None, Some(n)) => Ok(0..n.min(count)),
        (None, None) => Ok(0..count.min(1)),
    }
}

/// Send dataset images and compare predictions with labels.
pub(crate) fn cmd_mnist(
    cli: &Cli,
    settings: &Settings,
    images_path: &Path,
    labels_path: &Path,
    index: Option<usize>,
    first: Option<usize>,
) -> Result<()> {
    let images = IdxImages::from_file(images_path)
        .with_context(|| format!("Failed to load images {}", images_path.display()))?;
    let labels = IdxLabels::from_file(labels_path)
        .with_context(|| format!("Failed to load labels {}", labels_path.display()))?;
    if images.len() != labels.len() {
        bail!(
            "Dataset mismatch: {} images but {} labels",
            images.len(),
            labels.len()
        );
    }

    let range = select_range(images.len(), index, first)?;
    if !cli.quiet {
        eprintln!(
            "{} {} images of {}x{}, sending {}",
            style("•").cyan(),
            images.len(),
            images.rows(),
            images.cols(),
            range.len()
        );
    }

    let mut link = open_link(cli.quiet, settings)?;
    let mut tally = Tally::default();
    let mut cancelled_at = None;

    for i in range {
        if crate::was_interrupted() {
            cancelled_at = Some(i);
            break;
        }
        let (Some(label), Some(payload)) = (labels.get(i), images.payload(i)) else {
            break;
        };
        let payload = payload?;

        let pb = transfer_progress(cli.quiet, payload.len());
        let result = link.infer(&payload, |sent, _| pb.set_position(sent as u64));
        pb.finish_and_clear();

        match result {
            Ok(inference) => {
                let predicted = inference
                    .prediction
                    .digit();
                tally.record(label, predicted);
                let verdict = match predicted {
                    Some(d) if d == label => style("ok").green(),
                    Some(_) => style("MISS").red(),
                    None => style("none").yellow(),
                };
                let shown = predicted.map_or_else(|| "-".to_string(), |d| d.to_string());
                println!("#{i:<6} label {label}  predicted {shown}  {verdict}");
            },
            Err(e) if e.is_interrupted() => {
                cancelled_at = Some(i);
                break;
            },
            Err(e) => {
                warn!("Image {i}: {e}");
                tally.failed += 1;
                tally.sent += 1;
            },
        }
    }
    link.close()?;

    report(cli.quiet, &tally);
    finish(cancelled_at)
}

fn report(quiet: bool, tally: &Tally) {
    println!(
        "Accuracy: {}/{} ({:.1}%)",
        tally.correct,
        tally.sent,
        tally.accuracy()
    );
    if !quiet && (tally.missing > 0 || tally.failed > 0) {
        eprintln!(
            "{} {} without prediction, {} failed transfers",
            style("!").yellow(),
            tally.missing,
            tally.failed
        );
    }
}

/// A batch stopped by Ctrl-C still reports its partial tally, then fails.
fn finish(cancelled_at: Option<usize>) -> Result<()> {
    match cancelled_at {
        Some(i) => Err(CliError::Cancelled(format!("Cancelled at image {i}")).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_range() {
        assert_eq!(select_range(100, Some(5), None).unwrap(), 5..6);
        assert_eq!(select_range(100, None, Some(20)).unwrap(), 0..20);
        assert_eq!(select_range(10, None, Some(20)).unwrap(), 0..10);
        assert_eq!(select_range(10, None, None).unwrap(), 0..1);
        assert_eq!(select_range(0, None, None).unwrap(), 0..0);
        assert!(select_range(10, Some(10), None).is_err());
    }

    #[test]
    fn test_finish_maps_cancellation() {
        assert!(finish(None).is_ok());

        let err = finish(Some(12)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Cancelled(msg)) if msg.contains("12")
        ));
    }

    #[test]
    fn test_tally() {
        let mut tally = Tally::default();
        tally.record(7, Some(7));
        tally.record(2, Some(3));
        tally.record(1, None);
        tally.record(0, Some(0));

        assert_eq!(tally.sent, 4);
        assert_eq!(tally.correct, 2);
        assert_eq!(tally.missing, 1);
        assert!((tally.accuracy() - 50.0).abs() < f64::EPSILON);
        assert!(Tally::default().accuracy().abs() < f64::EPSILON);
    }
}

//! # digitlink
//!
//! Serial transfer of digit images to an embedded inference device.
//!
//! This crate provides the host side of the link:
//!
//! - Strict mode: framed chunks with XOR checksum, per-frame ack and bounded
//!   retry
//! - Loose mode: `READY` handshake followed by paced raw writes
//! - Reply classification (raw digit byte or `PRED:` text)
//! - MNIST IDX dataset reading
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for result types
//!
//! ## Example
//!
//! ```rust,no_run
//! use digitlink::{InferenceLink, LinkConfig, Payload, SerialConfig, TransferMode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let payload = Payload::from_file("img_28x28.bin")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let serial = SerialConfig::new("/dev/ttyUSB0", 9600);
//!         let mut link = InferenceLink::open(&serial, LinkConfig::new(TransferMode::strict()))?;
//!
//!         let inference = link.infer(&payload, |sent, total| {
//!             println!("Sent {}/{}", sent, total);
//!         })?;
//!         println!("Prediction: {:?}", inference.prediction);
//!         link.close()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod link;
pub mod payload;
pub mod port;
pub mod protocol;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by the blocking transfer loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::NativePort;
pub use {
    error::{Error, Phase, Result},
    link::{Inference, InferenceLink, LinkConfig, TransferMode},
    payload::{
        IMAGE_SIZE, Payload, PayloadSummary,
        idx::{IdxImages, IdxLabels},
    },
    port::{DEFAULT_BAUD, Port, SerialConfig},
    protocol::{
        DeviceCommand, LooseConfig, PredictionResult, ReplyFormat, ResponseConfig, StrictConfig,
        TransferStats, classify_reply,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_unset_is_false() {
        // Unit tests never register a checker
        assert!(!is_interrupted_requested());
    }
}

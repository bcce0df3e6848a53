//! Decode result routing
//!
//! The dispatcher holds at most one pending continuation and routes each
//! decoder result to it, filtered by format.

use scanner_api::{BarcodeFormat, ScanOptions, ScanPayload};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::ScanError;

/// One decoder result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A barcode was decoded
    Payload { text: String, format: BarcodeFormat },
    /// The frame held no barcode
    Empty,
    /// The decoder failed on this frame
    CaptureError(String),
}

type ScanItem = Result<ScanPayload, ScanError>;

/// Host side of a scan: yields payloads, then ends or yields an error
#[derive(Debug)]
pub struct ScanStream {
    rx: mpsc::UnboundedReceiver<ScanItem>,
}

impl ScanStream {
    /// Create a connected continuation/stream pair
    pub fn channel(options: ScanOptions) -> (Continuation, ScanStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Continuation { tx, options }, ScanStream { rx })
    }

    /// Next result; `None` once the scan is over
    pub async fn next(&mut self) -> Option<ScanItem> {
        self.rx.recv().await
    }

    /// Adapt into a `Stream`
    pub fn into_stream(self) -> UnboundedReceiverStream<ScanItem> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Session side of a scan
#[derive(Debug)]
pub struct Continuation {
    tx: mpsc::UnboundedSender<ScanItem>,
    options: ScanOptions,
}

impl Continuation {
    pub fn options(&self) -> ScanOptions {
        self.options
    }

    /// Whether the host stopped listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn accepts(&self, format: BarcodeFormat) -> bool {
        self.options.format.is_none_or(|wanted| wanted == format)
    }

    fn send(&self, item: ScanItem) {
        if self.tx.send(item).is_err() {
            tracing::debug!("Scan result dropped, host stopped listening");
        }
    }

    /// Resolve with an error, consuming the continuation
    pub fn fail(self, error: ScanError) {
        self.send(Err(error));
    }
}

/// What happened to one decoder result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Filtered out, empty, or nobody listening
    Dropped,
    /// Delivered to a repeating scan
    Delivered,
    /// Delivered to a single-shot scan, which is now consumed
    Completed,
    /// Capture failed; the continuation was canceled
    Failed,
}

/// Routes decoder results to the pending continuation
#[derive(Debug, Default)]
pub struct ScanDispatcher {
    pending: Option<Continuation>,
    generation: u64,
}

impl ScanDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the continuation for the next result
    ///
    /// Replaces, never queues: the previous continuation is returned.
    pub fn register(&mut self, continuation: Continuation) -> Option<Continuation> {
        self.pending.replace(continuation)
    }

    /// Fail and clear the pending continuation
    pub fn cancel(&mut self, error: ScanError) -> bool {
        match self.pending.take() {
            Some(continuation) => {
                tracing::debug!(%error, "Pending scan canceled");
                continuation.fail(error);
                true
            }
            None => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Options of the pending continuation
    pub fn pending_options(&self) -> Option<ScanOptions> {
        self.pending.as_ref().map(Continuation::options)
    }

    /// Current decoder generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new decoder generation; results from older ones are stale
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Route one decoder result
    pub fn dispatch(&mut self, event: DecodeEvent) -> Dispatch {
        let Some(continuation) = self.pending.as_ref() else {
            return Dispatch::Dropped;
        };

        match event {
            DecodeEvent::Empty => Dispatch::Dropped,
            DecodeEvent::Payload { format, .. } if !continuation.accepts(format) => {
                tracing::trace!(%format, "Decode result filtered out");
                Dispatch::Dropped
            }
            DecodeEvent::Payload { text, format } => {
                let payload = ScanPayload { text, format };
                if continuation.options.multiple_scan {
                    continuation.send(Ok(payload));
                    Dispatch::Delivered
                } else if let Some(continuation) = self.pending.take() {
                    continuation.send(Ok(payload));
                    Dispatch::Completed
                } else {
                    Dispatch::Dropped
                }
            }
            DecodeEvent::CaptureError(reason) => {
                tracing::warn!(%reason, "Decoder capture error");
                self.cancel(ScanError::ScanCanceled);
                Dispatch::Failed
            }
        }
    }
}

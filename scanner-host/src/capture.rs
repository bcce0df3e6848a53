//! Still-frame capture gate
//!
//! Frames for `snap` arrive on the hardware callback thread. Delivery and
//! session teardown both take this lock, and teardown advances the epoch, so
//! a frame requested before a teardown is never delivered after it.

use scanner_api::StillImage;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

use crate::camera::{DriverError, FrameCallback};
use crate::error::ScanError;

/// Reply slot for a pending `snap`
pub type SnapReply = oneshot::Sender<Result<StillImage, ScanError>>;

/// Shared capture lock carrying the current session epoch
#[derive(Debug, Clone, Default)]
pub struct CaptureGate {
    epoch: Arc<Mutex<u64>>,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        *self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discard every frame requested so far
    pub fn invalidate(&self) -> u64 {
        let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        *epoch
    }

    /// Build the hardware callback for one `snap`
    pub fn frame_callback(&self, reply: SnapReply) -> FrameCallback {
        let gate = self.clone();
        let ticket = self.epoch();

        Box::new(move |result: Result<StillImage, DriverError>| {
            let epoch = gate.epoch.lock().unwrap_or_else(PoisonError::into_inner);
            if *epoch != ticket {
                tracing::debug!(ticket, epoch = *epoch, "Discarding frame from torn-down session");
                return;
            }
            let result = result.map_err(|e| {
                tracing::warn!(error = %e, "Frame capture failed");
                ScanError::CameraUnavailable
            });
            let _ = reply.send(result);
        })
    }
}

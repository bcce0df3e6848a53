//! Camera hardware seams
//!
//! The driver, the device handle and the decoder are external collaborators.
//! Hosts implement these traits for their platform; `crate::testing` has
//! in-memory fakes.

use scanner_api::{BarcodeFormat, CameraFacing, StillImage};
use thiserror::Error;

use crate::controller::{Mailbox, Message};
use crate::dispatch::DecodeEvent;

/// Errors raised by camera collaborators
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("No {0} camera present")]
    NotPresent(CameraFacing),

    #[error("Camera open failed: {0}")]
    Open(#[source] anyhow::Error),

    #[error("Torch unavailable")]
    TorchUnavailable,

    #[error("Torch control failed: {0}")]
    Torch(#[source] anyhow::Error),

    #[error("Frame capture failed: {0}")]
    Capture(#[source] anyhow::Error),
}

/// Callback invoked from the hardware thread with one captured frame
pub type FrameCallback = Box<dyn FnOnce(Result<StillImage, DriverError>) + Send>;

/// Hardware presence queries
///
/// Safe to call from the command queue; these never touch a camera handle.
pub trait DeviceCapabilities: Send + Sync {
    /// Whether a camera with this facing exists
    fn has_camera(&self, facing: CameraFacing) -> bool;

    /// Whether the device has a torch
    fn has_flash(&self) -> bool;
}

/// Opens camera devices. Only ever called on the render thread.
pub trait CameraDriver: Send {
    /// Open a camera configured to decode `formats`
    fn open(
        &mut self,
        facing: CameraFacing,
        formats: &[BarcodeFormat],
    ) -> Result<Box<dyn CameraDevice>, DriverError>;
}

/// A live camera with its preview surface. Only ever touched on the render thread.
pub trait CameraDevice: Send {
    /// Insert the preview surface into the view hierarchy
    fn attach_preview(&mut self);

    /// Remove the preview surface from the view hierarchy
    fn detach_preview(&mut self);

    fn set_preview_visible(&mut self, visible: bool);

    /// Start frame delivery
    fn start_preview(&mut self);

    /// Stop frame delivery; the hardware drops the torch with it
    fn stop_preview(&mut self);

    fn set_torch(&mut self, on: bool) -> Result<(), DriverError>;

    /// Decode every frame, reporting through `sink` until stopped
    fn start_decoding(&mut self, sink: DecodeSink);

    fn stop_decoding(&mut self);

    /// Capture the next preview frame, answering on the hardware callback
    fn request_frame(&mut self, callback: FrameCallback);

    /// Release the hardware handle
    fn close(&mut self);
}

/// Channel from the decoder back into the session
///
/// Each sink is stamped with the decoder generation it was created for;
/// results from an older generation are discarded by the session.
#[derive(Clone)]
pub struct DecodeSink {
    generation: u64,
    mailbox: Mailbox,
}

impl DecodeSink {
    pub(crate) fn new(generation: u64, mailbox: Mailbox) -> Self {
        Self {
            generation,
            mailbox,
        }
    }

    /// Decoder generation this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report one decoder result
    ///
    /// Returns `false` once the session has shut down. The sink does not keep
    /// the session alive.
    pub fn deliver(&self, event: DecodeEvent) -> bool {
        let Some(mailbox) = self.mailbox.upgrade() else {
            return false;
        };
        mailbox
            .send(Message::Decoded {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Report a per-frame decoder result; `None` text means nothing was found
    pub fn deliver_frame(&self, text: Option<String>, format: BarcodeFormat) -> bool {
        let event = match text {
            Some(text) => DecodeEvent::Payload { text, format },
            None => DecodeEvent::Empty,
        };
        self.deliver(event)
    }
}

impl std::fmt::Debug for DecodeSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

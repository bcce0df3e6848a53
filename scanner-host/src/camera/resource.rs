//! Owned camera handle
//!
//! A `CameraResource` holds the device for exactly as long as it is acquired.
//! Dropping it stops decoding, turns the torch off, stops the preview, detaches
//! the surface and closes the device, so every early return releases the
//! hardware.

use scanner_api::{BarcodeFormat, CameraFacing};

use super::driver::{CameraDevice, CameraDriver, DecodeSink, DriverError, FrameCallback};
use crate::error::ScanError;

/// The single live camera of a session
pub struct CameraResource {
    device: Box<dyn CameraDevice>,
    facing: CameraFacing,
    streaming: bool,
    decoding: bool,
    torch: bool,
    visible: bool,
}

impl CameraResource {
    /// Open a camera and attach its preview, leaving frame delivery paused
    pub fn acquire(
        driver: &mut dyn CameraDriver,
        facing: CameraFacing,
        formats: &[BarcodeFormat],
    ) -> Result<Self, ScanError> {
        let device = driver.open(facing, formats).map_err(|e| {
            tracing::warn!(%facing, error = %e, "Failed to open camera");
            match e {
                DriverError::NotPresent(facing) => ScanError::camera_missing(facing),
                _ => ScanError::CameraUnavailable,
            }
        })?;

        let mut resource = Self {
            device,
            facing,
            streaming: false,
            decoding: false,
            torch: false,
            visible: false,
        };
        resource.device.attach_preview();
        resource.device.set_preview_visible(false);

        tracing::debug!(%facing, "Camera acquired");
        Ok(resource)
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_decoding(&self) -> bool {
        self.decoding
    }

    pub fn torch(&self) -> bool {
        self.torch
    }

    pub fn start_preview(&mut self) {
        if !self.streaming {
            self.device.start_preview();
            self.streaming = true;
        }
    }

    /// Stop frame delivery; the torch goes off with it
    ///
    /// The torch can be lit while frames are paused, so it is switched off
    /// even when nothing is streaming.
    pub fn stop_preview(&mut self) {
        if self.torch && !self.streaming {
            if let Err(e) = self.device.set_torch(false) {
                tracing::debug!(error = %e, "Torch off failed");
            }
        }
        if self.streaming {
            self.device.stop_preview();
            self.streaming = false;
        }
        self.torch = false;
    }

    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            self.device.set_preview_visible(visible);
            self.visible = visible;
        }
    }

    pub fn set_torch(&mut self, on: bool) -> Result<(), DriverError> {
        match self.device.set_torch(on) {
            Ok(()) => {
                self.torch = on;
                Ok(())
            }
            Err(e) => {
                self.torch = false;
                Err(e)
            }
        }
    }

    /// Start continuous decoding, replacing any running decoder
    pub fn start_decoding(&mut self, sink: DecodeSink) {
        if self.decoding {
            self.device.stop_decoding();
        }
        tracing::debug!(generation = sink.generation(), "Decoder started");
        self.device.start_decoding(sink);
        self.decoding = true;
    }

    pub fn stop_decoding(&mut self) {
        if self.decoding {
            self.device.stop_decoding();
            self.decoding = false;
        }
    }

    pub fn request_frame(&mut self, callback: FrameCallback) {
        self.device.request_frame(callback);
    }

    /// Release the hardware now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for CameraResource {
    fn drop(&mut self) {
        self.stop_decoding();
        if self.torch {
            if let Err(e) = self.device.set_torch(false) {
                tracing::debug!(error = %e, "Torch off failed during release");
            }
        }
        self.stop_preview();
        self.device.detach_preview();
        self.device.close();
        tracing::debug!(facing = %self.facing, "Camera released");
    }
}

impl std::fmt::Debug for CameraResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraResource")
            .field("facing", &self.facing)
            .field("streaming", &self.streaming)
            .field("decoding", &self.decoding)
            .field("torch", &self.torch)
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}

//! Torch gating

use scanner_api::CameraFacing;

use super::driver::DeviceCapabilities;
use super::resource::CameraResource;
use crate::error::ScanError;

/// Decides whether the torch may be switched, and switches it
#[derive(Debug, Default)]
pub struct FlashController {
    /// Flash presence, queried once
    available: Option<bool>,
}

impl FlashController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the device has a torch at all
    pub fn has_flash(&mut self, capabilities: &dyn DeviceCapabilities) -> bool {
        *self
            .available
            .get_or_insert_with(|| capabilities.has_flash())
    }

    /// Torch is usable: hardware present and the back camera active
    pub fn can_enable(
        &mut self,
        capabilities: &dyn DeviceCapabilities,
        facing: CameraFacing,
    ) -> bool {
        facing == CameraFacing::Back && self.has_flash(capabilities)
    }

    /// Fail with `LightUnavailable` unless the torch is usable
    pub fn check(
        &mut self,
        capabilities: &dyn DeviceCapabilities,
        facing: CameraFacing,
    ) -> Result<(), ScanError> {
        if self.can_enable(capabilities, facing) {
            Ok(())
        } else {
            Err(ScanError::LightUnavailable)
        }
    }

    /// Switch the torch on a live camera. Runs on the render thread.
    pub fn apply(resource: &mut CameraResource, on: bool) -> Result<(), ScanError> {
        if resource.facing() == CameraFacing::Front {
            return Err(ScanError::LightUnavailable);
        }
        resource.set_torch(on).map_err(|e| {
            tracing::warn!(on, error = %e, "Torch switch failed");
            ScanError::LightUnavailable
        })
    }
}

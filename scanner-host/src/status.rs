//! Status snapshots

use scanner_api::{CameraFacing, StatusSnapshot};

use crate::camera::{DeviceCapabilities, FlashController};
use crate::permission::PermissionGate;
use crate::session::Session;
use crate::settings::SettingsLauncher;

/// Builds [`StatusSnapshot`]s from the live session
///
/// The only side effect is the permission gate refresh, which re-queries the
/// OS until an answer has been recorded.
pub struct StatusReporter<'a> {
    pub capabilities: &'a dyn DeviceCapabilities,
    pub launcher: &'a dyn SettingsLauncher,
}

impl StatusReporter<'_> {
    pub fn snapshot(
        &self,
        session: &Session,
        gate: &mut PermissionGate,
        flash: &mut FlashController,
    ) -> StatusSnapshot {
        gate.refresh();
        let record = gate.record();

        StatusSnapshot {
            authorized: record.authorized(),
            denied: record.permanently_denied(),
            restricted: record.restricted,
            prepared: session.prepared,
            scanning: session.scanning,
            previewing: session.previewing,
            showing: session.showing,
            light_enabled: session.light_on,
            can_open_settings: self.launcher.can_open_settings(),
            can_enable_light: flash.can_enable(self.capabilities, session.facing),
            can_change_camera: self.capabilities.has_camera(CameraFacing::Front),
            current_camera: session.facing,
        }
    }
}

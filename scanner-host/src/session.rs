//! Session state
//!
//! Plain data owned by the controller task. Every flag here mirrors something
//! observable through the status snapshot.

use scanner_api::{BarcodeFormat, CameraFacing};
use serde::Serialize;

/// Coarse lifecycle state, derived from the session flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No camera held
    Idle,
    /// Waiting for the OS permission dialog
    AwaitingPermission,
    /// Camera held, not decoding
    Prepared,
    /// Camera held, decoding
    Scanning,
    /// Camera held, decoding suspended with a scan still pending
    Paused,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingPermission => "awaiting_permission",
            Self::Prepared => "prepared",
            Self::Scanning => "scanning",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Mutable session flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub prepared: bool,
    pub previewing: bool,
    pub scanning: bool,
    pub showing: bool,
    pub light_on: bool,
    pub facing: CameraFacing,
    /// A scan is waiting for prepare to finish
    pub should_scan_again: bool,
    /// Decoding was paused by `pauseScan`
    pub scan_paused: bool,
    pub multiple_scan: bool,
    pub format_filter: Option<BarcodeFormat>,
    /// The app went to the background with the preview running
    pub app_paused_with_active_preview: bool,
}

impl Session {
    pub fn new(facing: CameraFacing) -> Self {
        Self {
            prepared: false,
            previewing: false,
            scanning: false,
            showing: false,
            light_on: false,
            facing,
            should_scan_again: false,
            scan_paused: false,
            multiple_scan: false,
            format_filter: None,
            app_paused_with_active_preview: false,
        }
    }

    pub fn state(&self, awaiting_permission: bool) -> SessionState {
        if self.scanning {
            SessionState::Scanning
        } else if self.prepared && self.scan_paused {
            SessionState::Paused
        } else if self.prepared {
            SessionState::Prepared
        } else if awaiting_permission {
            SessionState::AwaitingPermission
        } else {
            SessionState::Idle
        }
    }

    /// Drop everything tied to the live camera, keeping facing and scan intent
    pub fn release_camera(&mut self) {
        self.prepared = false;
        self.previewing = false;
        self.scanning = false;
        self.scan_paused = false;
        self.light_on = false;
    }

    /// Back to a fresh idle session
    pub fn reset(&mut self, facing: CameraFacing) {
        *self = Self::new(facing);
    }

    /// Panics in debug builds if the flags are inconsistent
    pub fn check_invariants(&self) {
        debug_assert!(!self.scanning || self.prepared, "scanning without camera: {self:?}");
        debug_assert!(
            !self.light_on || self.facing == CameraFacing::Back,
            "torch on with front camera: {self:?}"
        );
        debug_assert!(!self.previewing || self.prepared, "previewing without camera: {self:?}");
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(CameraFacing::Back)
    }
}

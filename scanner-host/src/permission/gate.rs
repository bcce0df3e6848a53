//! Permission gate
//!
//! Wraps a [`PermissionProvider`] with the session's memory of the last known
//! permission state, so status reports stay consistent between OS queries.

use serde::Serialize;
use std::sync::Arc;

use super::provider::{PermissionAnswer, PermissionProvider, PermissionReply};
use crate::error::ScanError;

/// Last known permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Never asked, or not known since the last refresh
    #[default]
    Unknown,
    Authorized,
    /// Denied, the user may be asked again
    Denied,
    /// Denied with "never ask again"; only the settings screen can undo it
    PermanentlyDenied,
}

/// Classified result of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOutcome {
    Granted,
    DeniedTemporary,
    DeniedPermanent,
}

impl PermissionOutcome {
    /// Error reported to callers waiting on this outcome
    pub fn error(self) -> Option<ScanError> {
        match self {
            Self::Granted => None,
            Self::DeniedTemporary => Some(ScanError::CameraAccessDenied),
            Self::DeniedPermanent => Some(ScanError::CameraAccessPermanentlyDenied),
        }
    }
}

/// Remembered permission state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub state: PermissionState,
    pub restricted: bool,
    /// Re-query the OS on the next status report
    pub refresh_needed: bool,
    /// A permanent denial carried across a settings round-trip
    pub sticky_denied: bool,
}

impl Default for PermissionRecord {
    fn default() -> Self {
        Self {
            state: PermissionState::Unknown,
            restricted: false,
            refresh_needed: true,
            sticky_denied: false,
        }
    }
}

impl PermissionRecord {
    pub fn authorized(&self) -> bool {
        self.state == PermissionState::Authorized
    }

    pub fn denied(&self) -> bool {
        self.state == PermissionState::Denied
    }

    pub fn permanently_denied(&self) -> bool {
        self.state == PermissionState::PermanentlyDenied
    }
}

/// Queries and requests the camera permission
pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    record: PermissionRecord,
    outstanding: bool,
}

impl PermissionGate {
    /// Create a gate over a provider
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self {
            provider,
            record: PermissionRecord::default(),
            outstanding: false,
        }
    }

    /// Whether the permission is held right now; always asks the OS
    pub fn has_permission(&self) -> bool {
        self.provider.has_permission()
    }

    /// Issue an OS request unless one is already outstanding
    ///
    /// Returns `true` if a new request was issued.
    pub fn request(&mut self, reply: PermissionReply) -> bool {
        if self.outstanding {
            tracing::debug!("Permission request already outstanding");
            return false;
        }
        self.outstanding = true;
        tracing::info!("Requesting camera permission");
        self.provider.request(reply);
        true
    }

    /// Whether a request is waiting for its answer
    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    /// Apply the OS answer and classify it
    pub fn resolve(&mut self, answer: PermissionAnswer) -> PermissionOutcome {
        self.outstanding = false;
        self.record.refresh_needed = false;

        let outcome = match answer {
            PermissionAnswer::Granted => {
                self.record.state = PermissionState::Authorized;
                self.record.sticky_denied = false;
                PermissionOutcome::Granted
            }
            PermissionAnswer::Denied if self.provider.should_show_rationale() => {
                self.record.state = PermissionState::Denied;
                PermissionOutcome::DeniedTemporary
            }
            PermissionAnswer::Denied => {
                self.record.state = PermissionState::PermanentlyDenied;
                PermissionOutcome::DeniedPermanent
            }
            PermissionAnswer::Dismissed => {
                // Nothing was learned; ask the OS again next time.
                self.record.refresh_needed = true;
                PermissionOutcome::DeniedTemporary
            }
        };

        tracing::info!(?outcome, "Camera permission resolved");
        outcome
    }

    /// Re-query the OS if the record is stale
    ///
    /// A recorded grant is always re-checked, since the OS can revoke it at
    /// any time.
    pub fn refresh(&mut self) {
        if !self.record.refresh_needed {
            if self.record.authorized() && !self.provider.has_permission() {
                tracing::info!("Camera permission revoked");
                self.record.state = PermissionState::Unknown;
                self.record.refresh_needed = true;
            }
            return;
        }

        let authorized = self.provider.has_permission();
        if authorized {
            self.record.sticky_denied = false;
        }
        self.record.state = if authorized {
            PermissionState::Authorized
        } else if self.record.sticky_denied {
            PermissionState::PermanentlyDenied
        } else {
            PermissionState::Unknown
        };
        self.record.restricted = self.provider.is_restricted();
    }

    /// Forget the recorded state before sending the user to the settings screen
    ///
    /// A permanent denial stays sticky until the OS reports the permission held.
    pub fn begin_settings_round_trip(&mut self) {
        if self.record.permanently_denied() {
            self.record.sticky_denied = true;
        }
        self.record.state = PermissionState::Unknown;
        self.record.refresh_needed = true;
    }

    /// Current record
    pub fn record(&self) -> &PermissionRecord {
        &self.record
    }

    /// Put back a record saved before an aborted settings round-trip
    pub fn restore(&mut self, record: PermissionRecord) {
        self.record = record;
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("record", &self.record)
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}

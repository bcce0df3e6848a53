//! Session error taxonomy
//!
//! Every host command resolves to a success payload or one of these errors.

use scanner_api::{CameraFacing, ErrorCode, HostError};
use thiserror::Error;

/// Errors reported to the host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// Fault in command dispatch (bad arguments, closed session, ...)
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// Camera permission missing at the time of the action
    #[error("Camera access denied")]
    CameraAccessDenied,

    /// The user opted out of being asked again
    #[error("Camera access permanently denied")]
    CameraAccessPermanentlyDenied,

    #[error("Back camera unavailable")]
    BackCameraUnavailable,

    #[error("Front camera unavailable")]
    FrontCameraUnavailable,

    /// Generic acquisition or capture failure
    #[error("Camera unavailable")]
    CameraUnavailable,

    /// Pending scan invalidated by stop, teardown or capture failure
    #[error("Scan canceled")]
    ScanCanceled,

    /// No flash hardware, or the front camera is active
    #[error("Light unavailable")]
    LightUnavailable,

    #[error("Unable to open settings")]
    OpenSettingsUnavailable,
}

impl ScanError {
    /// Create an unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Hardware-absence error for a facing
    pub fn camera_missing(facing: CameraFacing) -> Self {
        match facing {
            CameraFacing::Back => Self::BackCameraUnavailable,
            CameraFacing::Front => Self::FrontCameraUnavailable,
        }
    }

    /// Numeric code sent to the host
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unexpected(_) => ErrorCode::UnexpectedError,
            Self::CameraAccessDenied => ErrorCode::CameraAccessDenied,
            Self::CameraAccessPermanentlyDenied => ErrorCode::CameraAccessPermanentlyDenied,
            Self::BackCameraUnavailable => ErrorCode::BackCameraUnavailable,
            Self::FrontCameraUnavailable => ErrorCode::FrontCameraUnavailable,
            Self::CameraUnavailable => ErrorCode::CameraUnavailable,
            Self::ScanCanceled => ErrorCode::ScanCanceled,
            Self::LightUnavailable => ErrorCode::LightUnavailable,
            Self::OpenSettingsUnavailable => ErrorCode::OpenSettingsUnavailable,
        }
    }

    /// Check if this is a permission error
    pub fn is_permission_error(&self) -> bool {
        matches!(
            self,
            Self::CameraAccessDenied | Self::CameraAccessPermanentlyDenied
        )
    }

    /// Bridge payload for this error
    pub fn to_host_error(&self) -> HostError {
        HostError {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

//! scanner-api: Shared types for the camera barcode scan session
//!
//! This crate defines the protocol between the host application and the
//! scan session runtime. A host bridge marshals these types; the runtime in
//! `scanner-host` produces and consumes them.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which physical camera a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// Rear camera (index 0)
    #[default]
    Back,
    /// Selfie camera (index 1)
    Front,
}

impl CameraFacing {
    /// Host-side numeric index of this facing
    pub fn index(self) -> u8 {
        match self {
            Self::Back => 0,
            Self::Front => 1,
        }
    }

    /// Parse the host-side numeric index
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::Back),
            1 => Some(Self::Front),
            _ => None,
        }
    }

    /// The other camera
    pub fn flipped(self) -> Self {
        match self {
            Self::Back => Self::Front,
            Self::Front => Self::Back,
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Back => f.write_str("back"),
            Self::Front => f.write_str("front"),
        }
    }
}

/// Barcode symbologies the decoder can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarcodeFormat {
    #[serde(rename = "AZTEC")]
    Aztec,
    #[serde(rename = "CODABAR")]
    Codabar,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "CODE_93")]
    Code93,
    #[serde(rename = "CODE_128")]
    Code128,
    #[serde(rename = "DATA_MATRIX")]
    DataMatrix,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "EAN_13")]
    Ean13,
    #[serde(rename = "ITF")]
    Itf,
    #[serde(rename = "PDF417")]
    Pdf417,
    #[serde(rename = "QR_CODE")]
    QrCode,
    #[serde(rename = "RSS_14")]
    Rss14,
    #[serde(rename = "RSS_EXPANDED")]
    RssExpanded,
    #[serde(rename = "UPC_A")]
    UpcA,
    #[serde(rename = "UPC_E")]
    UpcE,
    #[serde(rename = "UPC_EAN_EXTENSION")]
    UpcEanExtension,
}

impl BarcodeFormat {
    /// Every format, in wire-name order
    pub const ALL: [BarcodeFormat; 16] = [
        Self::Aztec,
        Self::Codabar,
        Self::Code39,
        Self::Code93,
        Self::Code128,
        Self::DataMatrix,
        Self::Ean8,
        Self::Ean13,
        Self::Itf,
        Self::Pdf417,
        Self::QrCode,
        Self::Rss14,
        Self::RssExpanded,
        Self::UpcA,
        Self::UpcE,
        Self::UpcEanExtension,
    ];

    /// Wire name used by hosts (e.g. `"QR_CODE"`)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aztec => "AZTEC",
            Self::Codabar => "CODABAR",
            Self::Code39 => "CODE_39",
            Self::Code93 => "CODE_93",
            Self::Code128 => "CODE_128",
            Self::DataMatrix => "DATA_MATRIX",
            Self::Ean8 => "EAN_8",
            Self::Ean13 => "EAN_13",
            Self::Itf => "ITF",
            Self::Pdf417 => "PDF417",
            Self::QrCode => "QR_CODE",
            Self::Rss14 => "RSS_14",
            Self::RssExpanded => "RSS_EXPANDED",
            Self::UpcA => "UPC_A",
            Self::UpcE => "UPC_E",
            Self::UpcEanExtension => "UPC_EAN_EXTENSION",
        }
    }

    /// Parse an optional format filter; an empty string means "any format"
    pub fn parse_filter(value: &str) -> Result<Option<Self>, UnknownFormat> {
        if value.is_empty() {
            Ok(None)
        } else {
            value.parse().map(Some)
        }
    }
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a format name is not recognised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown barcode format: {}", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for BarcodeFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

/// Options accepted by the `scan` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    /// Only deliver results of this format
    #[serde(default)]
    pub format: Option<BarcodeFormat>,

    /// Keep delivering results until stopped
    #[serde(default)]
    pub multiple_scan: bool,
}

impl ScanOptions {
    /// Single-shot scan accepting any format
    pub fn single() -> Self {
        Self::default()
    }

    /// Repeating scan accepting any format
    pub fn multiple() -> Self {
        Self {
            format: None,
            multiple_scan: true,
        }
    }

    /// Restrict delivery to one format
    pub fn format(mut self, format: BarcodeFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// A decoded barcode delivered to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPayload {
    /// Decoded text
    pub text: String,

    /// Symbology the text was decoded from
    pub format: BarcodeFormat,
}

/// A single encoded preview frame returned by `snap`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StillImage {
    /// Media type of `data` (e.g. `image/png`)
    pub media_type: String,

    /// Encoded image bytes
    pub data: Vec<u8>,
}

impl StillImage {
    /// Create a PNG still
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            media_type: "image/png".to_string(),
            data,
        }
    }
}

impl fmt::Debug for StillImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StillImage")
            .field("media_type", &self.media_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Full observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub authorized: bool,
    pub denied: bool,
    pub restricted: bool,
    pub prepared: bool,
    pub scanning: bool,
    pub previewing: bool,
    pub showing: bool,
    pub light_enabled: bool,
    pub can_open_settings: bool,
    pub can_enable_light: bool,
    pub can_change_camera: bool,
    pub current_camera: CameraFacing,
}

impl StatusSnapshot {
    /// Host-bridge form: every flag as `"1"`/`"0"`, camera as its index
    pub fn to_host_fields(&self) -> BTreeMap<&'static str, String> {
        fn flag(value: bool) -> String {
            let digit = if value { "1" } else { "0" };
            digit.to_string()
        }

        BTreeMap::from([
            ("authorized", flag(self.authorized)),
            ("denied", flag(self.denied)),
            ("restricted", flag(self.restricted)),
            ("prepared", flag(self.prepared)),
            ("scanning", flag(self.scanning)),
            ("previewing", flag(self.previewing)),
            ("showing", flag(self.showing)),
            ("lightEnabled", flag(self.light_enabled)),
            ("canOpenSettings", flag(self.can_open_settings)),
            ("canEnableLight", flag(self.can_enable_light)),
            ("canChangeCamera", flag(self.can_change_camera)),
            ("currentCamera", self.current_camera.index().to_string()),
        ])
    }
}

/// Numeric error codes understood by hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    UnexpectedError = 0,
    CameraAccessDenied = 1,
    CameraAccessPermanentlyDenied = 2,
    BackCameraUnavailable = 3,
    FrontCameraUnavailable = 4,
    CameraUnavailable = 5,
    ScanCanceled = 6,
    LightUnavailable = 7,
    OpenSettingsUnavailable = 8,
}

impl ErrorCode {
    /// Numeric value sent over the bridge
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Screaming-case name (e.g. `"SCAN_CANCELED"`)
    pub fn name(self) -> &'static str {
        match self {
            Self::UnexpectedError => "UNEXPECTED_ERROR",
            Self::CameraAccessDenied => "CAMERA_ACCESS_DENIED",
            Self::CameraAccessPermanentlyDenied => "CAMERA_ACCESS_PERMANENTLY_DENIED",
            Self::BackCameraUnavailable => "BACK_CAMERA_UNAVAILABLE",
            Self::FrontCameraUnavailable => "FRONT_CAMERA_UNAVAILABLE",
            Self::CameraUnavailable => "CAMERA_UNAVAILABLE",
            Self::ScanCanceled => "SCAN_CANCELED",
            Self::LightUnavailable => "LIGHT_UNAVAILABLE",
            Self::OpenSettingsUnavailable => "OPEN_SETTINGS_UNAVAILABLE",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

/// Error payload returned to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostError {
    /// Numeric code
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,
}

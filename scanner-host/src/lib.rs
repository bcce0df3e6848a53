//! scanner-host: Camera barcode scan session runtime
//!
//! This crate owns the scan session lifecycle: camera permission, camera
//! acquisition and release, preview visibility, decode dispatch, torch control
//! and camera switching. Platform pieces (driver, decoder, permission dialog,
//! settings screen) plug in through the traits in [`camera`], [`permission`]
//! and [`settings`].
//!
//! Start a session with [`ScannerBuilder`], then drive it through the
//! returned [`Scanner`] / [`ScannerHandle`].

pub mod camera;
pub mod capture;
pub mod command;
pub mod config;
pub(crate) mod controller;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handle;
pub mod permission;
pub mod render;
pub mod session;
pub mod settings;
pub mod status;
pub mod testing;

#[cfg(feature = "subscriber")]
pub mod tracing_support;

pub use command::{Command, CommandOutput};
pub use config::{BuildError, ScannerBuilder, ScannerConfig, DEFAULT_FORMATS};
pub use dispatch::{DecodeEvent, ScanStream};
pub use error::ScanError;
pub use handle::{Scanner, ScannerHandle};
pub use scanner_api::{
    BarcodeFormat, CameraFacing, ErrorCode, HostError, ScanOptions, ScanPayload, StatusSnapshot,
    StillImage,
};
pub use session::SessionState;

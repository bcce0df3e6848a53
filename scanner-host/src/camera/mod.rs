//! Camera ownership
//!
//! Everything in this module except [`DeviceCapabilities`] and
//! [`FlashController::check`] runs on the render thread.

pub mod driver;
pub mod flash;
pub mod resource;

pub use driver::{
    CameraDevice, CameraDriver, DecodeSink, DeviceCapabilities, DriverError, FrameCallback,
};
pub use flash::FlashController;
pub use resource::CameraResource;

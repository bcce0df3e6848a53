//! In-memory collaborators for tests and demos
//!
//! [`FakeCamera`] stands in for the device: it answers capability queries,
//! hands out a [`CameraDriver`], and records every hardware call in a
//! [`HardwareProbe`] that tests inspect.

use async_trait::async_trait;
use scanner_api::{BarcodeFormat, CameraFacing, StillImage};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::camera::{CameraDevice, CameraDriver, DecodeSink, DeviceCapabilities, DriverError, FrameCallback};
use crate::dispatch::DecodeEvent;
use crate::settings::SettingsLauncher;

#[derive(Default)]
struct Hardware {
    back: bool,
    front: bool,
    flash: bool,
    flash_queries: usize,

    fail_next_open: bool,
    fail_torch: bool,
    fail_next_frame: bool,
    hold_frames: bool,

    open_count: usize,
    live_devices: usize,
    last_facing: Option<CameraFacing>,
    configured_formats: Vec<BarcodeFormat>,

    attached: bool,
    visible: bool,
    streaming: bool,
    torch: bool,
    sink: Option<DecodeSink>,
    frames: Vec<FrameCallback>,
}

type Shared = Arc<Mutex<Hardware>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Hardware> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fake device with a back camera, a front camera and a flash
#[derive(Clone)]
pub struct FakeCamera {
    shared: Shared,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::with_hardware(true, true, true)
    }

    /// Device with only a back camera
    pub fn without_front() -> Self {
        Self::with_hardware(true, false, true)
    }

    /// Device with only a front camera and no flash
    pub fn front_only() -> Self {
        Self::with_hardware(false, true, false)
    }

    fn with_hardware(back: bool, front: bool, flash: bool) -> Self {
        let hardware = Hardware {
            back,
            front,
            flash,
            ..Hardware::default()
        };
        Self {
            shared: Arc::new(Mutex::new(hardware)),
        }
    }

    /// Driver opening cameras on this device
    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            shared: self.shared.clone(),
        }
    }

    /// Inspection and fault injection
    pub fn probe(&self) -> HardwareProbe {
        HardwareProbe {
            shared: self.shared.clone(),
        }
    }
}

impl Default for FakeCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCapabilities for FakeCamera {
    fn has_camera(&self, facing: CameraFacing) -> bool {
        let hardware = lock(&self.shared);
        match facing {
            CameraFacing::Back => hardware.back,
            CameraFacing::Front => hardware.front,
        }
    }

    fn has_flash(&self) -> bool {
        let mut hardware = lock(&self.shared);
        hardware.flash_queries += 1;
        hardware.flash
    }
}

/// Driver half of [`FakeCamera`]
pub struct FakeDriver {
    shared: Shared,
}

impl CameraDriver for FakeDriver {
    fn open(
        &mut self,
        facing: CameraFacing,
        formats: &[BarcodeFormat],
    ) -> Result<Box<dyn CameraDevice>, DriverError> {
        let mut hardware = lock(&self.shared);
        let present = match facing {
            CameraFacing::Back => hardware.back,
            CameraFacing::Front => hardware.front,
        };
        if !present {
            return Err(DriverError::NotPresent(facing));
        }
        if std::mem::take(&mut hardware.fail_next_open) {
            return Err(DriverError::Open(anyhow::anyhow!("camera in use")));
        }

        hardware.open_count += 1;
        hardware.live_devices += 1;
        hardware.last_facing = Some(facing);
        hardware.configured_formats = formats.to_vec();

        Ok(Box::new(FakeDevice {
            shared: self.shared.clone(),
            facing,
        }))
    }
}

struct FakeDevice {
    shared: Shared,
    facing: CameraFacing,
}

impl CameraDevice for FakeDevice {
    fn attach_preview(&mut self) {
        lock(&self.shared).attached = true;
    }

    fn detach_preview(&mut self) {
        let mut hardware = lock(&self.shared);
        hardware.attached = false;
        hardware.visible = false;
    }

    fn set_preview_visible(&mut self, visible: bool) {
        lock(&self.shared).visible = visible;
    }

    fn start_preview(&mut self) {
        lock(&self.shared).streaming = true;
    }

    fn stop_preview(&mut self) {
        let mut hardware = lock(&self.shared);
        hardware.streaming = false;
        hardware.torch = false;
    }

    fn set_torch(&mut self, on: bool) -> Result<(), DriverError> {
        let mut hardware = lock(&self.shared);
        if self.facing == CameraFacing::Front || !hardware.flash {
            hardware.torch = false;
            return Err(DriverError::TorchUnavailable);
        }
        if on && hardware.fail_torch {
            hardware.torch = false;
            return Err(DriverError::Torch(anyhow::anyhow!("torch busy")));
        }
        hardware.torch = on;
        Ok(())
    }

    fn start_decoding(&mut self, sink: DecodeSink) {
        lock(&self.shared).sink = Some(sink);
    }

    fn stop_decoding(&mut self) {
        lock(&self.shared).sink = None;
    }

    fn request_frame(&mut self, callback: FrameCallback) {
        let (callback, result) = {
            let mut hardware = lock(&self.shared);
            if hardware.hold_frames {
                hardware.frames.push(callback);
                return;
            }
            let result = if std::mem::take(&mut hardware.fail_next_frame) {
                Err(DriverError::Capture(anyhow::anyhow!("frame dropped")))
            } else {
                Ok(StillImage::png(vec![self.facing.index()]))
            };
            (callback, result)
        };
        callback(result);
    }

    fn close(&mut self) {
        let mut hardware = lock(&self.shared);
        hardware.live_devices = hardware.live_devices.saturating_sub(1);
        hardware.sink = None;
    }
}

/// View into the fake hardware
#[derive(Clone)]
pub struct HardwareProbe {
    shared: Shared,
}

impl HardwareProbe {
    fn hardware(&self) -> MutexGuard<'_, Hardware> {
        lock(&self.shared)
    }

    /// Cameras opened so far
    pub fn open_count(&self) -> usize {
        self.hardware().open_count
    }

    /// Cameras currently open
    pub fn live_devices(&self) -> usize {
        self.hardware().live_devices
    }

    pub fn last_facing(&self) -> Option<CameraFacing> {
        self.hardware().last_facing
    }

    /// Formats passed to the last `open`
    pub fn configured_formats(&self) -> Vec<BarcodeFormat> {
        self.hardware().configured_formats.clone()
    }

    pub fn attached(&self) -> bool {
        self.hardware().attached
    }

    pub fn visible(&self) -> bool {
        self.hardware().visible
    }

    pub fn streaming(&self) -> bool {
        self.hardware().streaming
    }

    pub fn torch_on(&self) -> bool {
        self.hardware().torch
    }

    /// Whether a decoder is running
    pub fn decoding(&self) -> bool {
        self.hardware().sink.is_some()
    }

    /// Sink of the running decoder
    pub fn sink(&self) -> Option<DecodeSink> {
        self.hardware().sink.clone()
    }

    pub fn flash_queries(&self) -> usize {
        self.hardware().flash_queries
    }

    pub fn set_flash(&self, present: bool) {
        self.hardware().flash = present;
    }

    pub fn fail_next_open(&self) {
        self.hardware().fail_next_open = true;
    }

    pub fn fail_torch(&self, fail: bool) {
        self.hardware().fail_torch = fail;
    }

    pub fn fail_next_frame(&self) {
        self.hardware().fail_next_frame = true;
    }

    /// Park frame requests until [`HardwareProbe::complete_frames`]
    pub fn hold_frames(&self, hold: bool) {
        self.hardware().hold_frames = hold;
    }

    /// Frame requests waiting for the hardware
    pub fn held_frames(&self) -> usize {
        self.hardware().frames.len()
    }

    /// Answer every parked frame request
    pub fn complete_frames(&self, data: &[u8]) -> usize {
        let frames = std::mem::take(&mut self.hardware().frames);
        let count = frames.len();
        for callback in frames {
            callback(Ok(StillImage::png(data.to_vec())));
        }
        count
    }

    /// Feed a decoder result as if a frame was decoded
    ///
    /// Returns `false` when no decoder is running.
    pub fn emit(&self, event: DecodeEvent) -> bool {
        match self.sink() {
            Some(sink) => sink.deliver(event),
            None => false,
        }
    }

    /// Shorthand for a decoded barcode
    pub fn emit_barcode(&self, text: &str, format: BarcodeFormat) -> bool {
        self.emit(DecodeEvent::Payload {
            text: text.to_string(),
            format,
        })
    }
}

#[derive(Debug, Default)]
struct LauncherState {
    unavailable: bool,
    fail: bool,
    launches: usize,
}

/// Settings launcher that records launches
#[derive(Clone, Default)]
pub struct FakeSettingsLauncher {
    state: Arc<Mutex<LauncherState>>,
    on_open: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl FakeSettingsLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher reporting that no settings screen exists
    pub fn unavailable() -> Self {
        let launcher = Self::new();
        launcher.lock().unavailable = true;
        launcher
    }

    /// Run `hook` while "in" the settings screen
    pub fn on_open(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(hook));
        self
    }

    fn lock(&self) -> MutexGuard<'_, LauncherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next launches fail
    pub fn fail_launch(&self, fail: bool) {
        self.lock().fail = fail;
    }

    pub fn launches(&self) -> usize {
        self.lock().launches
    }
}

#[async_trait]
impl SettingsLauncher for FakeSettingsLauncher {
    fn can_open_settings(&self) -> bool {
        !self.lock().unavailable
    }

    async fn open_app_settings(&self) -> anyhow::Result<()> {
        {
            let mut state = self.lock();
            if state.fail {
                anyhow::bail!("settings activity not found");
            }
            state.launches += 1;
        }
        if let Some(hook) = &self.on_open {
            hook();
        }
        Ok(())
    }
}

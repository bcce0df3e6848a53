//! Scanner configuration and builder

use scanner_api::{BarcodeFormat, CameraFacing};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::camera::{CameraDriver, DeviceCapabilities};
use crate::controller::{Collaborators, SessionController};
use crate::events::{EventSink, NullEventSink};
use crate::handle::{Scanner, ScannerHandle};
use crate::permission::{PermissionGate, PermissionProvider};
use crate::render::RenderContext;
use crate::settings::{NoSettingsLauncher, SettingsLauncher};

/// Formats the decoder is configured with unless told otherwise
pub const DEFAULT_FORMATS: [BarcodeFormat; 14] = [
    BarcodeFormat::QrCode,
    BarcodeFormat::DataMatrix,
    BarcodeFormat::UpcA,
    BarcodeFormat::UpcE,
    BarcodeFormat::Ean8,
    BarcodeFormat::Ean13,
    BarcodeFormat::Code39,
    BarcodeFormat::Code93,
    BarcodeFormat::Code128,
    BarcodeFormat::Codabar,
    BarcodeFormat::Itf,
    BarcodeFormat::Rss14,
    BarcodeFormat::Pdf417,
    BarcodeFormat::RssExpanded,
];

/// Plain-data session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerConfig {
    /// Camera used by `prepare`/`scan` without an explicit facing, and after `destroy`
    pub default_facing: CameraFacing,

    /// Formats passed to the decoder when a camera is acquired
    pub formats: Vec<BarcodeFormat>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            default_facing: CameraFacing::Back,
            formats: DEFAULT_FORMATS.to_vec(),
        }
    }
}

/// Error type for building a scanner
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to run the session")]
    NoRuntime,

    #[error("Failed to start render thread: {0}")]
    RenderThread(String),
}

/// Builder wiring the session to its collaborators
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use scanner_host::permission::AutoPermissionProvider;
/// use scanner_host::testing::FakeCamera;
/// use scanner_host::ScannerBuilder;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let camera = FakeCamera::new();
/// let scanner = ScannerBuilder::new()
///     .capabilities(camera.clone())
///     .driver(camera.driver())
///     .permissions(Arc::new(AutoPermissionProvider::always_grant()))
///     .spawn()?;
///
/// let status = scanner.prepare(None).await?;
/// assert!(status.prepared);
/// # Ok(())
/// # }
/// ```
pub struct ScannerBuilder {
    config: ScannerConfig,
    capabilities: Option<Arc<dyn DeviceCapabilities>>,
    driver: Option<Box<dyn CameraDriver>>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    launcher: Arc<dyn SettingsLauncher>,
    events: Arc<dyn EventSink>,
}

impl ScannerBuilder {
    pub fn new() -> Self {
        Self {
            config: ScannerConfig::default(),
            capabilities: None,
            driver: None,
            permissions: None,
            launcher: Arc::new(NoSettingsLauncher),
            events: Arc::new(NullEventSink),
        }
    }

    pub fn config(mut self, config: ScannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn default_facing(mut self, facing: CameraFacing) -> Self {
        self.config.default_facing = facing;
        self
    }

    pub fn formats(mut self, formats: impl IntoIterator<Item = BarcodeFormat>) -> Self {
        self.config.formats = formats.into_iter().collect();
        self
    }

    /// Hardware presence queries
    pub fn capabilities(mut self, capabilities: impl DeviceCapabilities + 'static) -> Self {
        self.capabilities = Some(Arc::new(capabilities));
        self
    }

    /// Camera driver, moved onto the render thread
    pub fn driver(mut self, driver: impl CameraDriver + 'static) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    /// Permission subsystem, shared with the caller
    pub fn permissions(mut self, provider: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(provider);
        self
    }

    /// Settings launcher (defaults to [`NoSettingsLauncher`])
    pub fn settings_launcher(mut self, launcher: impl SettingsLauncher + 'static) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    /// Session event log (defaults to [`NullEventSink`])
    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Start the render thread and the session task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> Result<Scanner, BuildError> {
        let capabilities = self
            .capabilities
            .ok_or(BuildError::MissingCollaborator("device capabilities"))?;
        let driver = self
            .driver
            .ok_or(BuildError::MissingCollaborator("camera driver"))?;
        let permissions = self
            .permissions
            .ok_or(BuildError::MissingCollaborator("permission provider"))?;

        let mut formats: Vec<BarcodeFormat> = Vec::with_capacity(self.config.formats.len());
        for format in self.config.formats {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            return Err(BuildError::InvalidConfig(
                "at least one barcode format is required".into(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BuildError::NoRuntime)?;
        let (render, render_thread) =
            RenderContext::spawn(driver).map_err(|e| BuildError::RenderThread(e.to_string()))?;

        let (mailbox, inbox) = mpsc::unbounded_channel();
        let controller = SessionController::new(
            Collaborators {
                capabilities,
                launcher: self.launcher,
                events: self.events,
                gate: PermissionGate::new(permissions),
                render,
            },
            self.config.default_facing,
            formats.into(),
            mailbox.downgrade(),
        );

        tracing::info!(facing = %self.config.default_facing, "Starting scanner session");
        let task = runtime.spawn(controller.run(inbox));

        Ok(Scanner::new(
            ScannerHandle::new(mailbox),
            task,
            render_thread,
        ))
    }
}

impl Default for ScannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScannerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerBuilder")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities.is_some())
            .field("driver", &self.driver.is_some())
            .field("permissions", &self.permissions.is_some())
            .finish_non_exhaustive()
    }
}

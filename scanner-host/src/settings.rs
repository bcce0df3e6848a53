//! OS settings surface

use async_trait::async_trait;

/// Opens the app's page in the OS settings
#[async_trait]
pub trait SettingsLauncher: Send + Sync {
    /// Whether the platform has a settings screen to send the user to
    fn can_open_settings(&self) -> bool {
        true
    }

    /// Launch the settings screen and resolve once control returns to the app
    async fn open_app_settings(&self) -> anyhow::Result<()>;
}

/// Launcher for platforms without a settings screen
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSettingsLauncher;

#[async_trait]
impl SettingsLauncher for NoSettingsLauncher {
    fn can_open_settings(&self) -> bool {
        false
    }

    async fn open_app_settings(&self) -> anyhow::Result<()> {
        anyhow::bail!("no settings screen on this platform")
    }
}

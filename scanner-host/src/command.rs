//! Typed bridge commands
//!
//! Maps a bridge action name plus its JSON argument array onto a [`Command`],
//! so a host bridge only has to marshal values in and out.

use scanner_api::{BarcodeFormat, CameraFacing, ScanOptions, StatusSnapshot, StillImage};
use serde_json::Value;

use crate::dispatch::ScanStream;
use crate::error::ScanError;
use crate::handle::ScannerHandle;

/// One host command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Prepare { facing: Option<CameraFacing> },
    Retoggle { facing: Option<CameraFacing> },
    Scan(ScanOptions),
    Pause,
    Resume,
    Snap,
    Stop,
    Show,
    Hide,
    PausePreview,
    ResumePreview,
    SwitchCamera { facing: Option<CameraFacing> },
    EnableLight,
    DisableLight,
    OpenSettings,
    Destroy,
    GetStatus,
}

/// Success payload of a command
#[derive(Debug)]
pub enum CommandOutput {
    Status(StatusSnapshot),
    Done,
    Image(StillImage),
    Stream(ScanStream),
}

impl Command {
    /// Parse a bridge action
    ///
    /// `args` is the bridge's positional argument array; `null` counts as no
    /// arguments.
    pub fn parse(name: &str, args: &Value) -> Result<Self, ScanError> {
        let first = match args {
            Value::Array(items) => items.first(),
            Value::Null => None,
            other => {
                return Err(ScanError::unexpected(format!(
                    "{name}: arguments must be an array, got {other}"
                )))
            }
        };

        let command = match name {
            "prepare" => Self::Prepare {
                facing: lenient_facing(first)?,
            },
            "retoggle" => Self::Retoggle {
                facing: lenient_facing(first)?,
            },
            "scan" => Self::Scan(scan_options(first)?),
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "snap" => Self::Snap,
            "stop" => Self::Stop,
            "show" => Self::Show,
            "hide" => Self::Hide,
            "pausePreview" => Self::PausePreview,
            "resumePreview" => Self::ResumePreview,
            "switchCamera" | "useCamera" => Self::SwitchCamera {
                facing: strict_facing(name, first)?,
            },
            "enableLight" => Self::EnableLight,
            "disableLight" => Self::DisableLight,
            "openSettings" => Self::OpenSettings,
            "destroy" => Self::Destroy,
            "getStatus" => Self::GetStatus,
            _ => return Err(ScanError::unexpected(format!("unknown command: {name}"))),
        };
        Ok(command)
    }
}

fn facing_from_index(index: i64) -> Result<CameraFacing, ScanError> {
    CameraFacing::from_index(index).ok_or_else(|| {
        tracing::debug!(index, "Unknown camera index");
        ScanError::CameraUnavailable
    })
}

/// `prepare` ignores a malformed camera argument
fn lenient_facing(arg: Option<&Value>) -> Result<Option<CameraFacing>, ScanError> {
    match arg.and_then(Value::as_i64) {
        Some(index) => facing_from_index(index).map(Some),
        None => Ok(None),
    }
}

/// `switchCamera` rejects a malformed camera argument
fn strict_facing(name: &str, arg: Option<&Value>) -> Result<Option<CameraFacing>, ScanError> {
    match arg {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_i64() {
            Some(index) => facing_from_index(index).map(Some),
            None => Err(ScanError::unexpected(format!(
                "{name}: camera must be an integer, got {value}"
            ))),
        },
    }
}

fn scan_options(arg: Option<&Value>) -> Result<ScanOptions, ScanError> {
    let Some(Value::Object(data)) = arg else {
        return Ok(ScanOptions::single());
    };

    let format = match data.get("format").and_then(Value::as_str) {
        Some(name) => BarcodeFormat::parse_filter(name)
            .map_err(|e| ScanError::unexpected(e.to_string()))?,
        None => None,
    };
    let multiple_scan = data
        .get("multipleScan")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(ScanOptions {
        format,
        multiple_scan,
    })
}

impl ScannerHandle {
    /// Run a parsed command
    pub async fn execute(&self, command: Command) -> Result<CommandOutput, ScanError> {
        let output = match command {
            Command::Prepare { facing } => CommandOutput::Status(self.prepare(facing).await?),
            Command::Retoggle { facing } => CommandOutput::Status(self.retoggle(facing).await?),
            Command::Scan(options) => CommandOutput::Stream(self.scan(options)?),
            Command::Pause => {
                self.pause().await?;
                CommandOutput::Done
            }
            Command::Resume => {
                self.resume().await?;
                CommandOutput::Done
            }
            Command::Snap => CommandOutput::Image(self.snap().await?),
            Command::Stop => CommandOutput::Status(self.stop().await?),
            Command::Show => CommandOutput::Status(self.show().await?),
            Command::Hide => CommandOutput::Status(self.hide().await?),
            Command::PausePreview => CommandOutput::Status(self.pause_preview().await?),
            Command::ResumePreview => CommandOutput::Status(self.resume_preview().await?),
            Command::SwitchCamera { facing } => {
                CommandOutput::Status(self.switch_camera(facing).await?)
            }
            Command::EnableLight => CommandOutput::Status(self.enable_light().await?),
            Command::DisableLight => CommandOutput::Status(self.disable_light().await?),
            Command::OpenSettings => CommandOutput::Status(self.open_settings().await?),
            Command::Destroy => CommandOutput::Status(self.destroy().await?),
            Command::GetStatus => CommandOutput::Status(self.status().await?),
        };
        Ok(output)
    }

    /// Parse and run a bridge action
    pub async fn execute_named(&self, name: &str, args: &Value) -> Result<CommandOutput, ScanError> {
        let command = Command::parse(name, args)?;
        self.execute(command).await
    }
}

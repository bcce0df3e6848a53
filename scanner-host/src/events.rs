//! Session event log
//!
//! Provides a trait-based event log so hosts can record what the scan session
//! did (permission prompts, camera acquire/release, deliveries) to their
//! preferred destination.

use chrono::{DateTime, Utc};
use scanner_api::{BarcodeFormat, CameraFacing};
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use thiserror::Error;

use crate::permission::PermissionOutcome;
use crate::session::SessionState;

/// One recorded session event
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: SessionEventType,
    pub details: EventDetails,
}

impl SessionEvent {
    pub fn new(event_type: SessionEventType, details: EventDetails) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            details,
        }
    }
}

/// Type of session event
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventType {
    PermissionRequested,
    PermissionResolved,
    CameraAcquired,
    CameraReleased,
    ScanStarted,
    ScanDelivered,
    ScanCanceled,
    TorchChanged,
    SettingsOpened,
    StateChanged,
}

/// Details about the event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EventDetails {
    Permission {
        #[serde(skip_serializing_if = "Option::is_none")]
        outcome: Option<PermissionOutcome>,
    },
    Camera {
        facing: CameraFacing,
    },
    Scan {
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<BarcodeFormat>,
        multiple_scan: bool,
    },
    Delivery {
        format: BarcodeFormat,
    },
    Torch {
        on: bool,
    },
    Settings {
        launched: bool,
    },
    Transition {
        from: SessionState,
        to: SessionState,
    },
    None,
}

/// Error type for event log operations
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Failed to write session log: {0}")]
    WriteError(#[from] std::io::Error),

    #[error("Failed to serialize session event: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Session log not available: {0}")]
    Unavailable(String),
}

/// Destination for session events
///
/// # Example
///
/// ```rust
/// use scanner_host::events::{EventError, EventSink, SessionEvent};
///
/// struct StderrSink;
///
/// impl EventSink for StderrSink {
///     fn record(&self, event: SessionEvent) -> Result<(), EventError> {
///         eprintln!("{:?}", event.event_type);
///         Ok(())
///     }
///
///     fn flush(&self) -> Result<(), EventError> {
///         Ok(())
///     }
/// }
/// ```
pub trait EventSink: Send + Sync {
    fn record(&self, event: SessionEvent) -> Result<(), EventError>;

    fn flush(&self) -> Result<(), EventError>;
}

// ============================================================================
// Default Implementations
// ============================================================================

/// File-based sink (JSONL, one event per line)
pub struct FileEventSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileEventSink {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Sink at the default location under the user data directory
    pub fn open_default() -> Result<Self, EventError> {
        let path = Self::default_path()
            .ok_or_else(|| EventError::Unavailable("no user data directory".into()))?;
        Self::new(path)
    }

    /// `<data dir>/scanner-rs/session.jsonl`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("scanner-rs").join("session.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileEventSink {
    fn record(&self, event: SessionEvent) -> Result<(), EventError> {
        let json = serde_json::to_string(&event)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", json)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), EventError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Debug for FileEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEventSink")
            .field("path", &self.path)
            .finish()
    }
}

/// In-memory sink for tests
pub struct MemoryEventSink {
    events: RwLock<Vec<SessionEvent>>,
    max_events: usize,
}

impl MemoryEventSink {
    /// Sink keeping the last 1000 events
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::with_capacity(max_events.min(1000))),
            max_events,
        }
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn count_of(&self, event_type: SessionEventType) -> usize {
        self.find_by_type(event_type).len()
    }

    pub fn find_by_type(&self, event_type: SessionEventType) -> Vec<SessionEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for MemoryEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: SessionEvent) -> Result<(), EventError> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if events.len() >= self.max_events {
            events.remove(0);
        }
        events.push(event);
        Ok(())
    }

    fn flush(&self) -> Result<(), EventError> {
        Ok(())
    }
}

impl fmt::Debug for MemoryEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEventSink")
            .field("count", &self.count())
            .field("max_events", &self.max_events)
            .finish()
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn record(&self, _event: SessionEvent) -> Result<(), EventError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), EventError> {
        Ok(())
    }
}

// ============================================================================
// Helper functions
// ============================================================================

pub fn permission_requested() -> SessionEvent {
    SessionEvent::new(
        SessionEventType::PermissionRequested,
        EventDetails::Permission { outcome: None },
    )
}

pub fn permission_resolved(outcome: PermissionOutcome) -> SessionEvent {
    SessionEvent::new(
        SessionEventType::PermissionResolved,
        EventDetails::Permission {
            outcome: Some(outcome),
        },
    )
}

pub fn camera_acquired(facing: CameraFacing) -> SessionEvent {
    SessionEvent::new(
        SessionEventType::CameraAcquired,
        EventDetails::Camera { facing },
    )
}

pub fn camera_released(facing: CameraFacing) -> SessionEvent {
    SessionEvent::new(
        SessionEventType::CameraReleased,
        EventDetails::Camera { facing },
    )
}

pub fn scan_started(format: Option<BarcodeFormat>, multiple_scan: bool) -> SessionEvent {
    SessionEvent::new(
        SessionEventType::ScanStarted,
        EventDetails::Scan {
            format,
            multiple_scan,
        },
    )
}

pub fn scan_delivered(format: BarcodeFormat) -> SessionEvent {
    SessionEvent::new(
        SessionEventType::ScanDelivered,
        EventDetails::Delivery { format },
    )
}

pub fn scan_canceled() -> SessionEvent {
    SessionEvent::new(SessionEventType::ScanCanceled, EventDetails::None)
}

pub fn torch_changed(on: bool) -> SessionEvent {
    SessionEvent::new(SessionEventType::TorchChanged, EventDetails::Torch { on })
}

pub fn settings_opened(launched: bool) -> SessionEvent {
    SessionEvent::new(
        SessionEventType::SettingsOpened,
        EventDetails::Settings { launched },
    )
}

pub fn state_changed(from: SessionState, to: SessionState) -> SessionEvent {
    SessionEvent::new(
        SessionEventType::StateChanged,
        EventDetails::Transition { from, to },
    )
}

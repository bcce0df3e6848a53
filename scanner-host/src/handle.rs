//! Host-facing handle to a running scan session

use scanner_api::{CameraFacing, ScanOptions, StatusSnapshot, StillImage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::controller::{Message, Op};
use crate::dispatch::ScanStream;
use crate::error::ScanError;

fn closed() -> ScanError {
    ScanError::unexpected("scanner session closed")
}

/// Cloneable command handle
///
/// Every method enqueues one message for the session task and waits for its
/// answer. Commands from all clones are applied in submission order.
#[derive(Clone)]
pub struct ScannerHandle {
    mailbox: mpsc::UnboundedSender<Message>,
}

impl ScannerHandle {
    pub(crate) fn new(mailbox: mpsc::UnboundedSender<Message>) -> Self {
        Self { mailbox }
    }

    fn send(&self, message: Message) -> Result<(), ScanError> {
        self.mailbox.send(message).map_err(|_| closed())
    }

    async fn command(&self, op: Op) -> Result<StatusSnapshot, ScanError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Command { op, reply })?;
        rx.await.map_err(|_| closed())?
    }

    /// Acquire the camera, asking for permission first if needed
    ///
    /// Resolves once the camera is ready, which may be after the user answers
    /// the permission dialog. Already prepared with this facing is a no-op.
    pub async fn prepare(&self, facing: Option<CameraFacing>) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::Prepare(facing)).await
    }

    /// Release and re-acquire the camera
    pub async fn retoggle(
        &self,
        facing: Option<CameraFacing>,
    ) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::Retoggle(facing)).await
    }

    /// Start decoding; results arrive on the returned stream
    ///
    /// A single-shot scan yields one payload and ends. A later `scan` cancels
    /// this one with [`ScanError::ScanCanceled`].
    pub fn scan(&self, options: ScanOptions) -> Result<ScanStream, ScanError> {
        let (continuation, stream) = ScanStream::channel(options);
        self.send(Message::Scan(continuation))?;
        Ok(stream)
    }

    /// Suspend decoding, keeping the pending scan
    pub async fn pause(&self) -> Result<(), ScanError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::PauseScan(reply))?;
        rx.await.map_err(|_| closed())?
    }

    /// Resume decoding for the pending scan
    pub async fn resume(&self) -> Result<(), ScanError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::ResumeScan(reply))?;
        rx.await.map_err(|_| closed())?
    }

    /// Capture the current preview frame
    ///
    /// A teardown while the frame is in flight cancels it.
    pub async fn snap(&self) -> Result<StillImage, ScanError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Snap(reply))?;
        rx.await.map_err(|_| ScanError::ScanCanceled)?
    }

    /// Stop decoding, hide the preview and cancel the pending scan
    pub async fn stop(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::Stop).await
    }

    pub async fn show(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::Show).await
    }

    pub async fn hide(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::Hide).await
    }

    /// Stop frame delivery; turns the light off
    pub async fn pause_preview(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::PausePreview).await
    }

    pub async fn resume_preview(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::ResumePreview).await
    }

    /// Switch to `facing`, or to the other camera when `None`
    pub async fn switch_camera(
        &self,
        facing: Option<CameraFacing>,
    ) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::SwitchCamera(facing)).await
    }

    pub async fn enable_light(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::EnableLight).await
    }

    pub async fn disable_light(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::DisableLight).await
    }

    /// Send the user to the OS settings screen and restore the session afterwards
    pub async fn open_settings(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::OpenSettings).await
    }

    /// Release everything and return to idle
    pub async fn destroy(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::Destroy).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ScanError> {
        self.command(Op::GetStatus).await
    }

    /// Wait until every command and camera operation queued so far has run
    pub async fn settle(&self) -> Result<(), ScanError> {
        let (reply, rx) = oneshot::channel();
        self.send(Message::Settle(reply))?;
        rx.await.map_err(|_| closed())
    }

    /// The app moved to the background
    pub fn notify_app_paused(&self) -> Result<(), ScanError> {
        self.send(Message::AppPaused)
    }

    /// The app returned to the foreground
    pub fn notify_app_resumed(&self) -> Result<(), ScanError> {
        self.send(Message::AppResumed)
    }

    /// Whether the session task has stopped
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

impl std::fmt::Debug for ScannerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerHandle")
            .field("closed", &self.mailbox.is_closed())
            .finish()
    }
}

/// A running scan session
///
/// Dropping the `Scanner` and every [`ScannerHandle`] clone ends the session
/// and releases the camera.
#[derive(Debug)]
pub struct Scanner {
    handle: ScannerHandle,
    task: JoinHandle<()>,
    render_thread: std::thread::JoinHandle<()>,
}

impl Scanner {
    pub(crate) fn new(
        handle: ScannerHandle,
        task: JoinHandle<()>,
        render_thread: std::thread::JoinHandle<()>,
    ) -> Self {
        Self {
            handle,
            task,
            render_thread,
        }
    }

    pub fn handle(&self) -> ScannerHandle {
        self.handle.clone()
    }

    /// Tear the session down and wait for the camera to be released
    ///
    /// Other handles see [`ScanError::Unexpected`] afterwards.
    pub async fn shutdown(self) -> Result<(), ScanError> {
        // A closed mailbox means the task is already on its way out.
        let _ = self.handle.send(Message::Shutdown);
        drop(self.handle);

        self.task
            .await
            .map_err(|e| ScanError::unexpected(format!("session task failed: {e}")))?;

        let render_thread = self.render_thread;
        tokio::task::spawn_blocking(move || render_thread.join())
            .await
            .map_err(|e| ScanError::unexpected(format!("render join failed: {e}")))?
            .map_err(|_| ScanError::unexpected("render thread panicked"))?;

        tracing::debug!("Scanner shut down");
        Ok(())
    }
}

impl std::ops::Deref for Scanner {
    type Target = ScannerHandle;

    fn deref(&self) -> &ScannerHandle {
        &self.handle
    }
}

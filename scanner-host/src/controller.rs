//! Session controller
//!
//! One tokio task owns the [`Session`] and every component around it, and
//! drains a mailbox one message at a time. Host commands, permission answers,
//! decoder results and app lifecycle notifications all arrive as
//! [`Message`]s, so they are serialized against each other.
//!
//! ```text
//! host ──command──▶ mailbox ──▶ SessionController ──post/call──▶ render thread
//!                     ▲                                          │
//!   permission dialog ┘◀──────────── decoder (DecodeSink) ◀──────┘
//! ```
//!
//! Permission requests never block the task: the caller's reply is parked
//! and the grant re-enters through the mailbox.

use scanner_api::{BarcodeFormat, CameraFacing, StatusSnapshot};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::camera::{DecodeSink, DeviceCapabilities, DriverError, FlashController};
use crate::capture::{CaptureGate, SnapReply};
use crate::dispatch::{Continuation, DecodeEvent, Dispatch, ScanDispatcher};
use crate::error::ScanError;
use crate::events::{self, EventSink, SessionEvent};
use crate::permission::{PermissionAnswer, PermissionGate, PermissionReply};
use crate::render::RenderContext;
use crate::session::{Session, SessionState};
use crate::settings::SettingsLauncher;
use crate::status::StatusReporter;

/// Weak handle to the controller mailbox
///
/// Held by collaborators (decoder sinks, permission replies); only host
/// handles keep the session alive.
pub(crate) type Mailbox = mpsc::WeakUnboundedSender<Message>;

pub(crate) type StatusReply = oneshot::Sender<Result<StatusSnapshot, ScanError>>;
pub(crate) type DoneReply = oneshot::Sender<Result<(), ScanError>>;

/// Host command that answers with a status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Prepare(Option<CameraFacing>),
    Retoggle(Option<CameraFacing>),
    Stop,
    Show,
    Hide,
    PausePreview,
    ResumePreview,
    SwitchCamera(Option<CameraFacing>),
    EnableLight,
    DisableLight,
    OpenSettings,
    Destroy,
    GetStatus,
}

pub(crate) enum Message {
    Command { op: Op, reply: StatusReply },
    Scan(Continuation),
    PauseScan(DoneReply),
    ResumeScan(DoneReply),
    Snap(SnapReply),
    Settle(oneshot::Sender<()>),
    AppPaused,
    AppResumed,
    Permission(PermissionAnswer),
    Decoded { generation: u64, event: DecodeEvent },
    Shutdown,
}

/// Result of trying to reach the prepared state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Preparation {
    Ready,
    /// Waiting for the permission dialog
    Parked,
}

/// Sub-states replayed after a settings round-trip
#[derive(Debug, Clone, Copy)]
struct Replay {
    prepared: bool,
    light_on: bool,
    showing: bool,
    facing: CameraFacing,
}

pub(crate) struct SessionController {
    session: Session,
    default_facing: CameraFacing,
    formats: Arc<[BarcodeFormat]>,
    gate: PermissionGate,
    flash: FlashController,
    dispatcher: ScanDispatcher,
    capture: CaptureGate,
    render: RenderContext,
    capabilities: Arc<dyn DeviceCapabilities>,
    launcher: Arc<dyn SettingsLauncher>,
    events: Arc<dyn EventSink>,
    mailbox: Mailbox,
    /// `prepare` replies waiting for the permission dialog
    prepare_waiters: Vec<StatusReply>,
    resume_after_grant: bool,
    last_state: SessionState,
}

pub(crate) struct Collaborators {
    pub capabilities: Arc<dyn DeviceCapabilities>,
    pub launcher: Arc<dyn SettingsLauncher>,
    pub events: Arc<dyn EventSink>,
    pub gate: PermissionGate,
    pub render: RenderContext,
}

impl SessionController {
    pub(crate) fn new(
        collaborators: Collaborators,
        default_facing: CameraFacing,
        formats: Arc<[BarcodeFormat]>,
        mailbox: Mailbox,
    ) -> Self {
        Self {
            session: Session::new(default_facing),
            default_facing,
            formats,
            gate: collaborators.gate,
            flash: FlashController::new(),
            dispatcher: ScanDispatcher::new(),
            capture: CaptureGate::new(),
            render: collaborators.render,
            capabilities: collaborators.capabilities,
            launcher: collaborators.launcher,
            events: collaborators.events,
            mailbox,
            prepare_waiters: Vec::new(),
            resume_after_grant: false,
            last_state: SessionState::Idle,
        }
    }

    /// Drain the mailbox until every host handle is gone
    pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Message>) {
        tracing::debug!(facing = %self.default_facing, "Session controller started");

        while let Some(message) = inbox.recv().await {
            if matches!(message, Message::Shutdown) {
                break;
            }
            self.handle(message).await;
            self.after_transition();
        }

        self.destroy().await;
        self.after_transition();
        if let Err(e) = self.events.flush() {
            tracing::warn!(error = %e, "Failed to flush session log");
        }
        tracing::debug!("Session controller stopped");
    }

    async fn handle(&mut self, message: Message) {
        match message {
            Message::Command { op, reply } => self.command(op, reply).await,
            Message::Scan(continuation) => self.scan(continuation).await,
            Message::PauseScan(reply) => {
                let _ = reply.send(self.pause_scan());
            }
            Message::ResumeScan(reply) => {
                let result = self.resume_scan().await;
                let _ = reply.send(result);
            }
            Message::Snap(reply) => self.snap(reply),
            Message::Settle(reply) => {
                if let Err(e) = self.render.flush().await {
                    tracing::warn!(error = %e, "Render flush failed");
                }
                let _ = reply.send(());
            }
            Message::AppPaused => {
                if self.session.previewing {
                    tracing::debug!("App paused with preview running");
                    self.session.app_paused_with_active_preview = true;
                    self.pause_preview();
                }
            }
            Message::AppResumed => {
                if std::mem::take(&mut self.session.app_paused_with_active_preview) {
                    tracing::debug!("App resumed, restarting preview");
                    self.resume_preview();
                }
            }
            Message::Permission(answer) => self.on_permission(answer).await,
            Message::Decoded { generation, event } => self.on_decoded(generation, event).await,
            Message::Shutdown => {}
        }
    }

    async fn command(&mut self, op: Op, reply: StatusReply) {
        tracing::debug!(?op, "Command");
        match op {
            Op::Prepare(facing) => self.prepare(facing, reply).await,
            Op::Retoggle(facing) => self.retoggle(facing, reply).await,
            Op::SwitchCamera(facing) => self.switch_camera(facing, reply).await,
            Op::OpenSettings => self.open_settings(reply).await,
            Op::Stop => {
                self.stop();
                self.respond(reply, Ok(()));
            }
            Op::Show => {
                self.set_showing(true);
                self.respond(reply, Ok(()));
            }
            Op::Hide => {
                self.set_showing(false);
                self.respond(reply, Ok(()));
            }
            Op::PausePreview => {
                self.pause_preview();
                self.respond(reply, Ok(()));
            }
            Op::ResumePreview => {
                self.resume_preview();
                self.respond(reply, Ok(()));
            }
            Op::EnableLight => {
                let result = self.set_light(true).await;
                self.respond(reply, result);
            }
            Op::DisableLight => {
                let result = self.set_light(false).await;
                self.respond(reply, result);
            }
            Op::Destroy => {
                self.destroy().await;
                self.respond(reply, Ok(()));
            }
            Op::GetStatus => self.respond(reply, Ok(())),
        }
    }

    // ========================================================================
    // Status and bookkeeping
    // ========================================================================

    fn status(&mut self) -> StatusSnapshot {
        let reporter = StatusReporter {
            capabilities: self.capabilities.as_ref(),
            launcher: self.launcher.as_ref(),
        };
        reporter.snapshot(&self.session, &mut self.gate, &mut self.flash)
    }

    fn respond(&mut self, reply: StatusReply, result: Result<(), ScanError>) {
        let result = result.map(|()| self.status());
        if let Err(e) = &result {
            tracing::debug!(error = %e, "Command failed");
        }
        let _ = reply.send(result);
    }

    fn record(&self, event: SessionEvent) {
        if let Err(e) = self.events.record(event) {
            tracing::warn!(error = %e, "Failed to record session event");
        }
    }

    fn after_transition(&mut self) {
        self.session.check_invariants();
        let state = self.session.state(self.gate.is_outstanding());
        if state != self.last_state {
            tracing::info!(from = %self.last_state, to = %state, "Session state changed");
            self.record(events::state_changed(self.last_state, state));
            self.last_state = state;
        }
    }

    // ========================================================================
    // Preparation
    // ========================================================================

    async fn prepare(&mut self, facing: Option<CameraFacing>, reply: StatusReply) {
        let facing = facing.unwrap_or(self.session.facing);
        if self.session.prepared && facing == self.session.facing {
            return self.respond(reply, Ok(()));
        }
        if !self.capabilities.has_camera(facing) {
            return self.respond(reply, Err(ScanError::camera_missing(facing)));
        }
        if self.session.prepared {
            self.reacquire(facing, reply).await;
        } else {
            self.session.facing = facing;
            self.prepare_and_reply(reply).await;
        }
    }

    async fn retoggle(&mut self, facing: Option<CameraFacing>, reply: StatusReply) {
        let facing = facing.unwrap_or(self.session.facing);
        if !self.capabilities.has_camera(facing) {
            return self.respond(reply, Err(ScanError::camera_missing(facing)));
        }
        tracing::debug!(%facing, "Rebuilding camera");
        self.reacquire(facing, reply).await;
    }

    async fn switch_camera(&mut self, facing: Option<CameraFacing>, reply: StatusReply) {
        let facing = facing.unwrap_or_else(|| self.session.facing.flipped());
        if facing == self.session.facing {
            return self.respond(reply, Ok(()));
        }
        if !self.gate.has_permission() {
            return self.respond(reply, Err(ScanError::CameraAccessDenied));
        }
        if !self.capabilities.has_camera(facing) {
            return self.respond(reply, Err(ScanError::camera_missing(facing)));
        }
        tracing::info!(from = %self.session.facing, to = %facing, "Switching camera");
        self.reacquire(facing, reply).await;
    }

    /// Release the camera and prepare again with `facing`, keeping a running scan
    async fn reacquire(&mut self, facing: CameraFacing, reply: StatusReply) {
        let resume_scan = self.session.scanning || self.session.should_scan_again;
        self.release_camera().await;
        self.session.facing = facing;
        self.session.should_scan_again = resume_scan;
        self.prepare_and_reply(reply).await;
    }

    async fn prepare_and_reply(&mut self, reply: StatusReply) {
        match self.ensure_prepared().await {
            Ok(Preparation::Ready) => self.respond(reply, Ok(())),
            Ok(Preparation::Parked) => self.prepare_waiters.push(reply),
            Err(e) => self.respond(reply, Err(e)),
        }
    }

    /// Reach the prepared state, then start a scan if one is waiting
    async fn ensure_prepared(&mut self) -> Result<Preparation, ScanError> {
        if !self.session.prepared {
            let facing = self.session.facing;
            if !self.capabilities.has_camera(facing) {
                let error = ScanError::camera_missing(facing);
                self.fail_scan_intent(error.clone());
                return Err(error);
            }
            if !self.gate.has_permission() {
                self.resume_after_grant = true;
                self.request_permission();
                return Ok(Preparation::Parked);
            }
            if let Err(error) = self.acquire().await {
                self.fail_scan_intent(error.clone());
                return Err(error);
            }
        }

        if self.session.should_scan_again {
            self.start_scan().await;
        }
        Ok(Preparation::Ready)
    }

    fn request_permission(&mut self) {
        if self.gate.request(PermissionReply::new(self.mailbox.clone())) {
            self.record(events::permission_requested());
        }
    }

    async fn on_permission(&mut self, answer: PermissionAnswer) {
        let outcome = self.gate.resolve(answer);
        self.record(events::permission_resolved(outcome));

        let waiters = std::mem::take(&mut self.prepare_waiters);
        let resume = std::mem::take(&mut self.resume_after_grant);

        let result = match outcome.error() {
            Some(error) => {
                self.fail_scan_intent(error.clone());
                Err(error)
            }
            None if resume => match self.ensure_prepared().await {
                Ok(Preparation::Parked) => {
                    self.prepare_waiters.extend(waiters);
                    return;
                }
                Ok(Preparation::Ready) => Ok(()),
                Err(error) => Err(error),
            },
            None => Ok(()),
        };

        for reply in waiters {
            self.respond(reply, result.clone());
        }
    }

    /// Fail a scan that was waiting for prepare
    fn fail_scan_intent(&mut self, error: ScanError) {
        if std::mem::take(&mut self.session.should_scan_again) && self.dispatcher.cancel(error) {
            self.record(events::scan_canceled());
        }
        self.session.scanning = false;
    }

    async fn acquire(&mut self) -> Result<(), ScanError> {
        let facing = self.session.facing;
        let formats = self.formats.clone();
        let visible = self.session.showing;

        self.render
            .call(move |stage| -> Result<(), ScanError> {
                stage.acquire(facing, &formats)?;
                if let Some(camera) = stage.camera() {
                    camera.start_preview();
                    camera.set_visible(visible);
                }
                Ok(())
            })
            .await??;

        self.session.prepared = true;
        self.session.previewing = true;
        self.record(events::camera_acquired(facing));
        tracing::info!(%facing, "Camera prepared");
        Ok(())
    }

    /// Release the camera; frames and decoder results already in flight are discarded
    async fn release_camera(&mut self) {
        self.capture.invalidate();
        self.dispatcher.next_generation();

        match self.render.call(|stage| stage.release()).await {
            Ok(true) => self.record(events::camera_released(self.session.facing)),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Camera release failed"),
        }
        self.session.release_camera();
    }

    /// Full teardown, keeping the facing
    async fn teardown(&mut self) {
        if self.dispatcher.cancel(ScanError::ScanCanceled) {
            self.record(events::scan_canceled());
        }
        for reply in std::mem::take(&mut self.prepare_waiters) {
            let _ = reply.send(Err(ScanError::ScanCanceled));
        }
        self.resume_after_grant = false;
        self.release_camera().await;

        let facing = self.session.facing;
        self.session.reset(facing);
    }

    async fn destroy(&mut self) {
        self.teardown().await;
        self.session.facing = self.default_facing;
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    async fn scan(&mut self, continuation: Continuation) {
        let options = continuation.options();
        if let Some(replaced) = self.dispatcher.register(continuation) {
            tracing::debug!("Replacing pending scan");
            replaced.fail(ScanError::ScanCanceled);
            self.record(events::scan_canceled());
        }
        self.session.format_filter = options.format;
        self.session.multiple_scan = options.multiple_scan;
        self.session.should_scan_again = true;

        if let Err(e) = self.ensure_prepared().await {
            tracing::debug!(error = %e, "Scan could not prepare the camera");
        }
    }

    /// Start decoding into the pending continuation
    async fn start_scan(&mut self) {
        self.session.should_scan_again = false;
        let Some(options) = self.dispatcher.pending_options() else {
            return;
        };

        let generation = self.dispatcher.next_generation();
        let sink = DecodeSink::new(generation, self.mailbox.clone());
        let started = self
            .render
            .call(move |stage| match stage.camera() {
                Some(camera) => {
                    camera.start_preview();
                    camera.set_visible(true);
                    camera.start_decoding(sink);
                    true
                }
                None => false,
            })
            .await;

        match started {
            Ok(true) => {
                self.session.previewing = true;
                self.session.showing = true;
                self.session.scanning = true;
                self.session.scan_paused = false;
                self.record(events::scan_started(options.format, options.multiple_scan));
                tracing::debug!(generation, ?options, "Scan started");
            }
            Ok(false) => self.cancel_scan(ScanError::CameraUnavailable),
            Err(e) => self.cancel_scan(e),
        }
    }

    fn cancel_scan(&mut self, error: ScanError) {
        self.session.scanning = false;
        if self.dispatcher.cancel(error) {
            self.record(events::scan_canceled());
        }
    }

    fn stop(&mut self) {
        self.render.post(|stage| {
            if let Some(camera) = stage.camera() {
                camera.stop_decoding();
                camera.set_visible(false);
            }
        });
        self.session.should_scan_again = false;
        self.session.scan_paused = false;
        self.session.showing = false;
        self.cancel_scan(ScanError::ScanCanceled);
    }

    fn pause_scan(&mut self) -> Result<(), ScanError> {
        if !self.session.scanning {
            return Ok(());
        }
        self.render.post(|stage| {
            if let Some(camera) = stage.camera() {
                camera.stop_decoding();
            }
        });
        self.session.scanning = false;
        self.session.scan_paused = true;
        Ok(())
    }

    async fn resume_scan(&mut self) -> Result<(), ScanError> {
        if self.session.scanning {
            return Ok(());
        }
        if !self.session.prepared {
            return Err(ScanError::CameraUnavailable);
        }
        self.session.scan_paused = false;
        if self.dispatcher.has_pending() {
            self.start_scan().await;
        }
        Ok(())
    }

    async fn on_decoded(&mut self, generation: u64, event: DecodeEvent) {
        if generation != self.dispatcher.generation() || !self.session.scanning {
            tracing::trace!(generation, "Discarding stale decoder result");
            return;
        }

        let format = match &event {
            DecodeEvent::Payload { format, .. } => Some(*format),
            _ => None,
        };

        match self.dispatcher.dispatch(event) {
            Dispatch::Dropped => {}
            Dispatch::Delivered => {
                if let Some(format) = format {
                    self.record(events::scan_delivered(format));
                }
            }
            Dispatch::Completed => {
                if let Some(format) = format {
                    self.record(events::scan_delivered(format));
                }
                tracing::debug!("Single scan complete, tearing down");
                self.destroy().await;
            }
            Dispatch::Failed => {
                self.render.post(|stage| {
                    if let Some(camera) = stage.camera() {
                        camera.stop_decoding();
                    }
                });
                self.session.scanning = false;
                self.record(events::scan_canceled());
            }
        }
    }

    fn snap(&mut self, reply: SnapReply) {
        if !self.session.prepared {
            let _ = reply.send(Err(ScanError::CameraUnavailable));
            return;
        }
        let callback = self.capture.frame_callback(reply);
        self.render.post(move |stage| match stage.camera() {
            Some(camera) => camera.request_frame(callback),
            None => callback(Err(DriverError::Capture(anyhow::anyhow!("camera released")))),
        });
    }

    // ========================================================================
    // Preview, visibility and light
    // ========================================================================

    fn set_showing(&mut self, showing: bool) {
        self.session.showing = showing;
        self.render.post(move |stage| {
            if let Some(camera) = stage.camera() {
                camera.set_visible(showing);
            }
        });
    }

    fn pause_preview(&mut self) {
        if !self.session.prepared {
            return;
        }
        self.render.post(|stage| {
            if let Some(camera) = stage.camera() {
                camera.stop_preview();
            }
        });
        self.session.previewing = false;
        if std::mem::take(&mut self.session.light_on) {
            self.record(events::torch_changed(false));
        }
    }

    fn resume_preview(&mut self) {
        if !self.session.prepared {
            return;
        }
        self.render.post(|stage| {
            if let Some(camera) = stage.camera() {
                camera.start_preview();
            }
        });
        self.session.previewing = true;
    }

    async fn set_light(&mut self, on: bool) -> Result<(), ScanError> {
        if !self.gate.has_permission() {
            return Err(ScanError::CameraAccessDenied);
        }
        self.flash
            .check(self.capabilities.as_ref(), self.session.facing)?;
        if !self.session.prepared {
            return Ok(());
        }

        let applied = self
            .render
            .call(move |stage| match stage.camera() {
                Some(camera) => FlashController::apply(camera, on),
                None => Err(ScanError::CameraUnavailable),
            })
            .await?;

        match applied {
            Ok(()) => {
                if self.session.light_on != on {
                    self.record(events::torch_changed(on));
                }
                self.session.light_on = on;
                Ok(())
            }
            Err(e) => {
                self.session.light_on = false;
                Err(e)
            }
        }
    }

    // ========================================================================
    // Settings round-trip
    // ========================================================================

    async fn open_settings(&mut self, reply: StatusReply) {
        if !self.launcher.can_open_settings() {
            return self.respond(reply, Err(ScanError::OpenSettingsUnavailable));
        }

        let before = self.session.clone();
        let record = self.gate.record().clone();
        let replay = Replay {
            prepared: before.prepared,
            light_on: before.light_on,
            showing: before.showing,
            facing: before.facing,
        };

        // Only the camera goes away before the launch; the pending scan and
        // any parked callers survive until the launch is known to succeed.
        self.gate.begin_settings_round_trip();
        self.release_camera().await;

        let launcher = self.launcher.clone();
        let launched = launcher.open_app_settings().await;
        self.record(events::settings_opened(launched.is_ok()));

        match launched {
            Ok(()) => {
                self.teardown().await;
                self.respond(reply, Ok(()));
                self.replay(replay).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open settings");
                self.gate.restore(record);
                self.restore(before).await;
                self.respond(reply, Err(ScanError::OpenSettingsUnavailable));
            }
        }
    }

    /// Bring the session back to `before` after an aborted settings launch
    async fn restore(&mut self, before: Session) {
        self.session.facing = before.facing;
        self.session.should_scan_again = before.scanning || before.should_scan_again;
        if before.prepared {
            match self.ensure_prepared().await {
                Ok(Preparation::Ready) => {}
                Ok(Preparation::Parked) => tracing::debug!("Restore waiting for permission"),
                Err(e) => tracing::warn!(error = %e, "Could not restore camera after settings"),
            }
        }
        if self.session.prepared {
            if !before.previewing {
                self.pause_preview();
            }
            if before.light_on {
                if let Err(e) = self.set_light(true).await {
                    tracing::warn!(error = %e, "Could not restore light after settings");
                }
            }
            self.session.scan_paused = before.scan_paused;
        }
        self.set_showing(before.showing);
    }

    async fn replay(&mut self, replay: Replay) {
        self.session.facing = replay.facing;
        if replay.prepared {
            match self.ensure_prepared().await {
                Ok(Preparation::Ready) => {}
                Ok(Preparation::Parked) => tracing::debug!("Re-prepare waiting for permission"),
                Err(e) => tracing::warn!(error = %e, "Re-prepare after settings failed"),
            }
        }
        if replay.light_on && self.session.prepared {
            if let Err(e) = self.set_light(true).await {
                tracing::warn!(error = %e, "Could not restore light after settings");
            }
        }
        if replay.showing {
            self.set_showing(true);
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.session)
            .field("gate", &self.gate)
            .field("dispatcher", &self.dispatcher)
            .field("waiters", &self.prepare_waiters.len())
            .finish_non_exhaustive()
    }
}

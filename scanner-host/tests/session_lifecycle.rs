//! End-to-end session lifecycle tests against the in-memory hardware

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scanner_host::events::{MemoryEventSink, SessionEventType};
use scanner_host::permission::ManualPermissionProvider;
use scanner_host::testing::{FakeCamera, FakeSettingsLauncher};
use scanner_host::{
    BarcodeFormat, CameraFacing, DecodeEvent, ScanError, ScanOptions, Scanner, ScannerBuilder,
    StatusSnapshot,
};

struct Rig {
    camera: FakeCamera,
    permissions: Arc<ManualPermissionProvider>,
    events: Arc<MemoryEventSink>,
    scanner: Scanner,
}

fn build_rig(camera: FakeCamera, permissions: ManualPermissionProvider) -> Rig {
    rig_with_launcher(camera, Arc::new(permissions), FakeSettingsLauncher::new())
}

fn granted() -> Rig {
    build_rig(FakeCamera::new(), ManualPermissionProvider::granted())
}

fn rig_with_launcher(
    camera: FakeCamera,
    permissions: Arc<ManualPermissionProvider>,
    launcher: FakeSettingsLauncher,
) -> Rig {
    let events = Arc::new(MemoryEventSink::new());
    let scanner = ScannerBuilder::new()
        .capabilities(camera.clone())
        .driver(camera.driver())
        .permissions(permissions.clone())
        .settings_launcher(launcher)
        .events(events.clone())
        .spawn()
        .unwrap();

    Rig {
        camera,
        permissions,
        events,
        scanner,
    }
}

/// Settle the session until `check` holds
async fn eventually(scanner: &Scanner, mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        scanner.settle().await.unwrap();
        tokio::task::yield_now().await;
    }
    panic!("condition never reached");
}

fn assert_invariants(status: &StatusSnapshot) {
    assert!(!status.scanning || status.prepared, "scanning without camera: {status:?}");
    assert!(
        !status.light_enabled || status.current_camera == CameraFacing::Back,
        "light on front camera: {status:?}"
    );
}

// ============================================================================
// Scanning
// ============================================================================

#[tokio::test]
async fn test_single_scan_delivers_once_then_idle() {
    let rig = granted();
    let probe = rig.camera.probe();

    let mut stream = rig.scanner.scan(ScanOptions::single()).unwrap();
    rig.scanner.settle().await.unwrap();

    let status = rig.scanner.status().await.unwrap();
    assert!(status.prepared);
    assert!(status.scanning);
    assert!(status.showing);
    assert!(probe.decoding());
    assert!(probe.visible());

    assert!(probe.emit_barcode("hello", BarcodeFormat::QrCode));
    let payload = stream.next().await.unwrap().unwrap();
    assert_eq!(payload.text, "hello");
    assert_eq!(payload.format, BarcodeFormat::QrCode);
    assert!(stream.next().await.is_none());

    rig.scanner.settle().await.unwrap();
    let status = rig.scanner.status().await.unwrap();
    assert!(!status.prepared);
    assert!(!status.scanning);
    assert_eq!(probe.live_devices(), 0);
    assert!(!probe.emit_barcode("again", BarcodeFormat::QrCode));
}

#[tokio::test]
async fn test_scan_without_permission_waits_for_grant() {
    let rig = build_rig(FakeCamera::new(), ManualPermissionProvider::new());
    let probe = rig.camera.probe();

    let mut stream = rig.scanner.scan(ScanOptions::single()).unwrap();
    rig.scanner.settle().await.unwrap();

    assert_eq!(rig.permissions.request_count(), 1);
    assert_eq!(probe.open_count(), 0);
    let status = rig.scanner.status().await.unwrap();
    assert!(!status.prepared);
    assert!(!status.scanning);
    assert!(!status.authorized);

    assert_eq!(rig.permissions.grant(), 1);
    rig.scanner.settle().await.unwrap();

    let status = rig.scanner.status().await.unwrap();
    assert!(status.authorized);
    assert!(status.scanning);

    probe.emit_barcode("after-grant", BarcodeFormat::Ean13);
    assert_eq!(stream.next().await.unwrap().unwrap().text, "after-grant");
}

#[tokio::test]
async fn test_only_one_permission_request_outstanding() {
    let rig = build_rig(FakeCamera::new(), ManualPermissionProvider::new());

    let handle = rig.scanner.handle();
    let prepare = tokio::spawn(async move { handle.prepare(None).await });
    let mut first = rig.scanner.scan(ScanOptions::single()).unwrap();
    let mut second = rig.scanner.scan(ScanOptions::single()).unwrap();
    eventually(&rig.scanner, || rig.permissions.request_count() == 1).await;
    rig.scanner.settle().await.unwrap();
    assert_eq!(rig.permissions.request_count(), 1);
    assert_eq!(rig.permissions.pending_count(), 1);

    assert_eq!(first.next().await.unwrap(), Err(ScanError::ScanCanceled));

    rig.permissions.grant();
    let status = prepare.await.unwrap().unwrap();
    assert!(status.prepared);

    rig.camera.probe().emit_barcode("one", BarcodeFormat::QrCode);
    assert_eq!(second.next().await.unwrap().unwrap().text, "one");
}

#[tokio::test]
async fn test_denied_permission_fails_scan() {
    let rig = build_rig(FakeCamera::new(), ManualPermissionProvider::new());

    let mut stream = rig.scanner.scan(ScanOptions::single()).unwrap();
    rig.scanner.settle().await.unwrap();
    rig.permissions.deny();
    assert_eq!(stream.next().await.unwrap(), Err(ScanError::CameraAccessDenied));

    let status = rig.scanner.status().await.unwrap();
    assert!(!status.scanning);
    assert!(!status.denied);

    let mut stream = rig.scanner.scan(ScanOptions::single()).unwrap();
    rig.scanner.settle().await.unwrap();
    assert_eq!(rig.permissions.request_count(), 2);
    rig.permissions.deny_permanently();
    assert_eq!(
        stream.next().await.unwrap(),
        Err(ScanError::CameraAccessPermanentlyDenied)
    );

    let status = rig.scanner.status().await.unwrap();
    assert!(status.denied);
    assert!(!status.authorized);
    assert_eq!(rig.camera.probe().open_count(), 0);
}

#[tokio::test]
async fn test_revoked_permission_is_requested_again() {
    let rig = granted();
    let probe = rig.camera.probe();

    rig.scanner.prepare(None).await.unwrap();
    rig.scanner.destroy().await.unwrap();
    rig.permissions.revoke();

    assert_eq!(
        rig.scanner.enable_light().await,
        Err(ScanError::CameraAccessDenied)
    );
    assert_eq!(
        rig.scanner.switch_camera(None).await,
        Err(ScanError::CameraAccessDenied)
    );
    assert!(!rig.scanner.status().await.unwrap().authorized);

    let handle = rig.scanner.handle();
    let prepare = tokio::spawn(async move { handle.prepare(None).await });
    eventually(&rig.scanner, || rig.permissions.pending_count() == 1).await;
    assert_eq!(rig.permissions.request_count(), 1);
    assert_eq!(probe.open_count(), 1);

    rig.permissions.grant();
    let status = prepare.await.unwrap().unwrap();
    assert!(status.prepared);
    assert!(status.authorized);
    assert_eq!(probe.open_count(), 2);
}

#[tokio::test]
async fn test_unanswered_permission_request_is_not_stuck() {
    let rig = build_rig(FakeCamera::new(), ManualPermissionProvider::new());

    let mut stream = rig.scanner.scan(ScanOptions::single()).unwrap();
    rig.scanner.settle().await.unwrap();
    assert_eq!(rig.permissions.dismiss(), 1);
    assert_eq!(stream.next().await.unwrap(), Err(ScanError::CameraAccessDenied));

    let mut stream = rig.scanner.scan(ScanOptions::single()).unwrap();
    eventually(&rig.scanner, || rig.permissions.pending_count() == 1).await;
    assert_eq!(rig.permissions.request_count(), 2);

    rig.permissions.grant();
    rig.scanner.settle().await.unwrap();
    rig.camera.probe().emit_barcode("second-try", BarcodeFormat::QrCode);
    assert_eq!(stream.next().await.unwrap().unwrap().text, "second-try");
}

#[tokio::test]
async fn test_prepare_waiter_gets_denial() {
    let rig = build_rig(FakeCamera::new(), ManualPermissionProvider::new());

    let handle = rig.scanner.handle();
    let prepare = tokio::spawn(async move { handle.prepare(None).await });
    eventually(&rig.scanner, || rig.permissions.pending_count() == 1).await;

    rig.permissions.deny();
    assert_eq!(
        prepare.await.unwrap(),
        Err(ScanError::CameraAccessDenied)
    );
}

#[tokio::test]
async fn test_new_scan_replaces_pending() {
    let rig = granted();
    let probe = rig.camera.probe();

    let mut first = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    let mut second = rig.scanner.scan(ScanOptions::single()).unwrap();
    rig.scanner.settle().await.unwrap();

    assert_eq!(first.next().await.unwrap(), Err(ScanError::ScanCanceled));
    assert!(first.next().await.is_none());

    probe.emit_barcode("winner", BarcodeFormat::Code128);
    assert_eq!(second.next().await.unwrap().unwrap().text, "winner");
}

#[tokio::test]
async fn test_format_filter_drops_other_formats() {
    let rig = granted();
    let probe = rig.camera.probe();

    let mut stream = rig
        .scanner
        .scan(ScanOptions::single().format(BarcodeFormat::QrCode))
        .unwrap();
    rig.scanner.settle().await.unwrap();

    probe.emit_barcode("ean", BarcodeFormat::Ean13);
    probe.emit(DecodeEvent::Empty);
    probe.emit_barcode("qr", BarcodeFormat::QrCode);

    let payload = stream.next().await.unwrap().unwrap();
    assert_eq!(payload.text, "qr");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_pause_resume_and_stale_results() {
    let rig = granted();
    let probe = rig.camera.probe();

    let mut stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    rig.scanner.settle().await.unwrap();
    probe.emit_barcode("a", BarcodeFormat::QrCode);
    assert_eq!(stream.next().await.unwrap().unwrap().text, "a");

    let stale = probe.sink().unwrap();
    rig.scanner.pause().await.unwrap();
    rig.scanner.pause().await.unwrap();
    rig.scanner.settle().await.unwrap();
    assert!(!probe.decoding());
    let status = rig.scanner.status().await.unwrap();
    assert!(!status.scanning);
    assert!(status.prepared);

    rig.scanner.resume().await.unwrap();
    rig.scanner.settle().await.unwrap();
    assert!(probe.decoding());
    assert!(rig.scanner.status().await.unwrap().scanning);

    stale.deliver(DecodeEvent::Payload {
        text: "stale".into(),
        format: BarcodeFormat::QrCode,
    });
    probe.emit_barcode("fresh", BarcodeFormat::QrCode);
    assert_eq!(stream.next().await.unwrap().unwrap().text, "fresh");
}

#[tokio::test]
async fn test_resume_without_camera() {
    let rig = granted();
    assert_eq!(rig.scanner.resume().await, Err(ScanError::CameraUnavailable));
    assert_eq!(rig.scanner.pause().await, Ok(()));
}

#[tokio::test]
async fn test_capture_error_cancels_only_the_request() {
    let rig = granted();
    let probe = rig.camera.probe();

    let mut stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    rig.scanner.settle().await.unwrap();
    probe.emit(DecodeEvent::CaptureError("sensor glitch".into()));

    assert_eq!(stream.next().await.unwrap(), Err(ScanError::ScanCanceled));
    rig.scanner.settle().await.unwrap();
    let status = rig.scanner.status().await.unwrap();
    assert!(status.prepared);
    assert!(!status.scanning);
    assert_eq!(probe.live_devices(), 1);
}

#[tokio::test]
async fn test_stop_cancels_and_keeps_camera() {
    let rig = granted();
    let probe = rig.camera.probe();

    let mut stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    rig.scanner.settle().await.unwrap();

    let status = rig.scanner.stop().await.unwrap();
    assert!(status.prepared);
    assert!(!status.scanning);
    assert!(!status.showing);
    assert_eq!(stream.next().await.unwrap(), Err(ScanError::ScanCanceled));

    rig.scanner.settle().await.unwrap();
    assert_eq!(probe.live_devices(), 1);
    assert!(!probe.decoding());
    assert!(!probe.visible());
}

// ============================================================================
// Preparation and teardown
// ============================================================================

#[tokio::test]
async fn test_prepare_is_idempotent_and_retoggle_rebuilds() {
    let rig = granted();
    let probe = rig.camera.probe();

    let first = rig.scanner.prepare(None).await.unwrap();
    let second = rig.scanner.prepare(None).await.unwrap();
    assert_eq!(first, second);
    assert!(second.prepared);
    assert!(second.previewing);
    assert_eq!(probe.open_count(), 1);

    let status = rig.scanner.retoggle(None).await.unwrap();
    assert!(status.prepared);
    assert_eq!(probe.open_count(), 2);
    assert_eq!(probe.live_devices(), 1);
}

#[tokio::test]
async fn test_prepare_with_missing_camera() {
    let rig = build_rig(FakeCamera::without_front(), ManualPermissionProvider::granted());
    assert_eq!(
        rig.scanner.prepare(Some(CameraFacing::Front)).await,
        Err(ScanError::FrontCameraUnavailable)
    );

    let rig = build_rig(FakeCamera::front_only(), ManualPermissionProvider::granted());
    assert_eq!(
        rig.scanner.prepare(None).await,
        Err(ScanError::BackCameraUnavailable)
    );
    let status = rig.scanner.prepare(Some(CameraFacing::Front)).await.unwrap();
    assert_eq!(status.current_camera, CameraFacing::Front);
}

#[tokio::test]
async fn test_driver_failure_maps_to_camera_unavailable() {
    let rig = granted();
    rig.camera.probe().fail_next_open();
    assert_eq!(
        rig.scanner.prepare(None).await,
        Err(ScanError::CameraUnavailable)
    );
    assert!(!rig.scanner.status().await.unwrap().prepared);
}

#[tokio::test]
async fn test_destroy_twice_is_identical() {
    let rig = granted();
    let mut stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    rig.scanner.switch_camera(None).await.unwrap();

    let first = rig.scanner.destroy().await.unwrap();
    let second = rig.scanner.destroy().await.unwrap();
    assert_eq!(first, second);
    assert!(!first.prepared);
    assert_eq!(first.current_camera, CameraFacing::Back);
    assert_eq!(stream.next().await.unwrap(), Err(ScanError::ScanCanceled));
    assert_eq!(rig.camera.probe().live_devices(), 0);
}

#[tokio::test]
async fn test_status_round_trip() {
    let rig = granted();

    let a = rig.scanner.status().await.unwrap();
    let b = rig.scanner.status().await.unwrap();
    assert_eq!(a, b);

    let shown = rig.scanner.show().await.unwrap();
    assert!(shown.showing);
    assert_eq!(shown, rig.scanner.status().await.unwrap());

    let hidden = rig.scanner.hide().await.unwrap();
    assert!(!hidden.showing);
    assert_eq!(StatusSnapshot { showing: false, ..shown }, hidden);
}

// ============================================================================
// Camera switching and light
// ============================================================================

#[tokio::test]
async fn test_switch_camera_while_scanning_keeps_continuation() {
    let rig = granted();
    let probe = rig.camera.probe();

    let mut stream = rig.scanner.scan(ScanOptions::single()).unwrap();
    rig.scanner.settle().await.unwrap();
    assert_eq!(probe.last_facing(), Some(CameraFacing::Back));

    let status = rig
        .scanner
        .switch_camera(Some(CameraFacing::Front))
        .await
        .unwrap();
    assert_eq!(status.current_camera, CameraFacing::Front);
    assert!(status.scanning);
    assert!(!status.can_enable_light);

    rig.scanner.settle().await.unwrap();
    assert_eq!(probe.last_facing(), Some(CameraFacing::Front));
    assert_eq!(probe.open_count(), 2);
    assert_eq!(probe.live_devices(), 1);

    probe.emit_barcode("selfie", BarcodeFormat::QrCode);
    assert_eq!(stream.next().await.unwrap().unwrap().text, "selfie");
}

#[tokio::test]
async fn test_switch_camera_errors_and_no_op() {
    let rig = granted();
    let status = rig
        .scanner
        .switch_camera(Some(CameraFacing::Back))
        .await
        .unwrap();
    assert!(!status.prepared);
    assert_eq!(rig.camera.probe().open_count(), 0);

    let rig = build_rig(FakeCamera::without_front(), ManualPermissionProvider::granted());
    assert_eq!(
        rig.scanner.switch_camera(None).await,
        Err(ScanError::FrontCameraUnavailable)
    );
    assert!(!rig.scanner.status().await.unwrap().can_change_camera);

    let rig = build_rig(FakeCamera::new(), ManualPermissionProvider::new());
    assert_eq!(
        rig.scanner.switch_camera(None).await,
        Err(ScanError::CameraAccessDenied)
    );
    assert_eq!(rig.permissions.request_count(), 0);
}

#[tokio::test]
async fn test_light_on_front_camera_fails() {
    let rig = granted();
    rig.scanner.prepare(Some(CameraFacing::Front)).await.unwrap();

    assert_eq!(
        rig.scanner.enable_light().await,
        Err(ScanError::LightUnavailable)
    );
    let status = rig.scanner.status().await.unwrap();
    assert!(!status.light_enabled);
    assert!(!status.can_enable_light);
    assert_invariants(&status);
}

#[tokio::test]
async fn test_light_follows_preview() {
    let rig = granted();
    let probe = rig.camera.probe();
    rig.scanner.prepare(None).await.unwrap();

    let status = rig.scanner.enable_light().await.unwrap();
    assert!(status.light_enabled);
    assert!(probe.torch_on());

    let status = rig.scanner.pause_preview().await.unwrap();
    assert!(!status.previewing);
    assert!(!status.light_enabled);
    rig.scanner.settle().await.unwrap();
    assert!(!probe.torch_on());
    assert!(!probe.streaming());

    let status = rig.scanner.resume_preview().await.unwrap();
    assert!(status.previewing);
    assert!(!status.light_enabled);

    rig.scanner.enable_light().await.unwrap();
    let status = rig.scanner.switch_camera(None).await.unwrap();
    assert!(!status.light_enabled);
    assert_invariants(&status);
}

#[tokio::test]
async fn test_light_enabled_while_preview_paused_goes_off_with_pause() {
    let rig = granted();
    let probe = rig.camera.probe();
    rig.scanner.prepare(None).await.unwrap();

    rig.scanner.pause_preview().await.unwrap();
    let status = rig.scanner.enable_light().await.unwrap();
    assert!(status.light_enabled);
    assert!(probe.torch_on());

    let status = rig.scanner.pause_preview().await.unwrap();
    assert!(!status.light_enabled);
    rig.scanner.settle().await.unwrap();
    assert!(!probe.torch_on());
}

#[tokio::test]
async fn test_light_errors() {
    let rig = build_rig(FakeCamera::new(), ManualPermissionProvider::new());
    assert_eq!(
        rig.scanner.enable_light().await,
        Err(ScanError::CameraAccessDenied)
    );

    let rig = granted();
    let status = rig.scanner.enable_light().await.unwrap();
    assert!(!status.light_enabled);

    rig.camera.probe().set_flash(false);
    let rig = build_rig(rig.camera.clone(), ManualPermissionProvider::granted());
    assert_eq!(
        rig.scanner.disable_light().await,
        Err(ScanError::LightUnavailable)
    );
}

// ============================================================================
// Settings round-trip
// ============================================================================

#[tokio::test]
async fn test_open_settings_replays_session() {
    let launcher = FakeSettingsLauncher::new();
    let rig = rig_with_launcher(
        FakeCamera::new(),
        Arc::new(ManualPermissionProvider::granted()),
        launcher.clone(),
    );
    let probe = rig.camera.probe();

    rig.scanner.prepare(None).await.unwrap();
    rig.scanner.show().await.unwrap();
    rig.scanner.enable_light().await.unwrap();

    let during = rig.scanner.open_settings().await.unwrap();
    assert!(!during.prepared);
    assert!(!during.light_enabled);
    assert_eq!(launcher.launches(), 1);

    rig.scanner.settle().await.unwrap();
    let after = rig.scanner.status().await.unwrap();
    assert!(after.prepared);
    assert!(after.showing);
    assert!(after.light_enabled);
    assert_eq!(probe.open_count(), 2);
    assert!(probe.visible());
    assert!(probe.torch_on());
}

#[tokio::test]
async fn test_open_settings_unavailable_leaves_state() {
    let rig = rig_with_launcher(
        FakeCamera::new(),
        Arc::new(ManualPermissionProvider::granted()),
        FakeSettingsLauncher::unavailable(),
    );
    let before = rig.scanner.prepare(None).await.unwrap();
    assert!(!before.can_open_settings);

    assert_eq!(
        rig.scanner.open_settings().await,
        Err(ScanError::OpenSettingsUnavailable)
    );
    assert_eq!(rig.scanner.status().await.unwrap(), before);
    assert_eq!(rig.camera.probe().open_count(), 1);
}

#[tokio::test]
async fn test_open_settings_launch_failure_restores_state() {
    let launcher = FakeSettingsLauncher::new();
    launcher.fail_launch(true);
    let rig = rig_with_launcher(
        FakeCamera::new(),
        Arc::new(ManualPermissionProvider::granted()),
        launcher.clone(),
    );
    let probe = rig.camera.probe();

    let mut stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    rig.scanner.enable_light().await.unwrap();
    let before = rig.scanner.status().await.unwrap();
    assert!(before.scanning);
    assert!(before.light_enabled);

    assert_eq!(
        rig.scanner.open_settings().await,
        Err(ScanError::OpenSettingsUnavailable)
    );
    assert_eq!(launcher.launches(), 0);

    let after = rig.scanner.status().await.unwrap();
    assert_eq!(after, before);

    rig.scanner.settle().await.unwrap();
    assert!(probe.decoding());
    assert!(probe.torch_on());
    assert!(probe.visible());
    assert_eq!(probe.live_devices(), 1);

    probe.emit_barcode("still-listening", BarcodeFormat::QrCode);
    assert_eq!(
        stream.next().await.unwrap().unwrap().text,
        "still-listening"
    );
}

#[tokio::test]
async fn test_open_settings_success_cancels_scan() {
    let rig = granted();
    let mut stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    rig.scanner.settle().await.unwrap();

    let during = rig.scanner.open_settings().await.unwrap();
    assert!(!during.scanning);
    assert_eq!(stream.next().await.unwrap(), Err(ScanError::ScanCanceled));

    rig.scanner.settle().await.unwrap();
    let after = rig.scanner.status().await.unwrap();
    assert!(after.prepared);
    assert!(!after.scanning);
}

#[tokio::test]
async fn test_permanent_denial_sticks_until_granted_in_settings() {
    let permissions = Arc::new(ManualPermissionProvider::new());
    let launches = Arc::new(AtomicUsize::new(0));
    let provider = permissions.clone();
    let launcher = FakeSettingsLauncher::new().on_open(move || {
        if launches.fetch_add(1, Ordering::SeqCst) == 1 {
            provider.grant();
        }
    });
    let rig = rig_with_launcher(FakeCamera::new(), permissions, launcher);

    let handle = rig.scanner.handle();
    let prepare = tokio::spawn(async move { handle.prepare(None).await });
    eventually(&rig.scanner, || rig.permissions.pending_count() == 1).await;
    rig.permissions.deny_permanently();
    assert_eq!(
        prepare.await.unwrap(),
        Err(ScanError::CameraAccessPermanentlyDenied)
    );
    assert!(rig.scanner.status().await.unwrap().denied);

    let status = rig.scanner.open_settings().await.unwrap();
    assert!(status.denied);
    assert!(!status.authorized);

    let status = rig.scanner.open_settings().await.unwrap();
    assert!(!status.denied);
    assert!(status.authorized);
}

// ============================================================================
// Snap, lifecycle hooks, bridge commands, shutdown
// ============================================================================

#[tokio::test]
async fn test_snap() {
    let rig = granted();
    let probe = rig.camera.probe();

    assert_eq!(rig.scanner.snap().await, Err(ScanError::CameraUnavailable));

    rig.scanner.prepare(None).await.unwrap();
    let image = rig.scanner.snap().await.unwrap();
    assert_eq!(image.media_type, "image/png");

    probe.fail_next_frame();
    assert_eq!(rig.scanner.snap().await, Err(ScanError::CameraUnavailable));
}

#[tokio::test]
async fn test_snap_in_flight_is_canceled_by_teardown() {
    let rig = granted();
    let probe = rig.camera.probe();
    rig.scanner.prepare(None).await.unwrap();
    probe.hold_frames(true);

    let handle = rig.scanner.handle();
    let snap = tokio::spawn(async move { handle.snap().await });
    eventually(&rig.scanner, || probe.held_frames() == 1).await;

    rig.scanner.destroy().await.unwrap();
    assert_eq!(probe.complete_frames(b"late"), 1);
    assert_eq!(snap.await.unwrap(), Err(ScanError::ScanCanceled));
}

#[tokio::test]
async fn test_app_lifecycle_hooks() {
    let rig = granted();
    let probe = rig.camera.probe();
    rig.scanner.prepare(None).await.unwrap();

    rig.scanner.notify_app_paused().unwrap();
    rig.scanner.settle().await.unwrap();
    assert!(!rig.scanner.status().await.unwrap().previewing);
    assert!(!probe.streaming());

    rig.scanner.notify_app_resumed().unwrap();
    rig.scanner.settle().await.unwrap();
    assert!(rig.scanner.status().await.unwrap().previewing);
    assert!(probe.streaming());

    rig.scanner.pause_preview().await.unwrap();
    rig.scanner.notify_app_paused().unwrap();
    rig.scanner.notify_app_resumed().unwrap();
    rig.scanner.settle().await.unwrap();
    assert!(!rig.scanner.status().await.unwrap().previewing);
}

#[tokio::test]
async fn test_invariants_hold_across_commands() {
    let rig = granted();
    let probe = rig.camera.probe();

    let _stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    let mut seen = vec![rig.scanner.status().await.unwrap()];
    seen.push(rig.scanner.enable_light().await.unwrap());
    seen.push(rig.scanner.switch_camera(None).await.unwrap());
    seen.push(rig.scanner.pause_preview().await.unwrap());
    rig.scanner.pause().await.unwrap();
    seen.push(rig.scanner.status().await.unwrap());
    seen.push(rig.scanner.switch_camera(None).await.unwrap());
    seen.push(rig.scanner.enable_light().await.unwrap());
    probe.emit(DecodeEvent::CaptureError("blur".into()));
    seen.push(rig.scanner.status().await.unwrap());
    seen.push(rig.scanner.stop().await.unwrap());
    seen.push(rig.scanner.destroy().await.unwrap());

    for status in &seen {
        assert_invariants(status);
    }
}

#[tokio::test]
async fn test_session_events_recorded() {
    let rig = granted();
    let probe = rig.camera.probe();

    let mut stream = rig.scanner.scan(ScanOptions::single()).unwrap();
    rig.scanner.settle().await.unwrap();
    probe.emit_barcode("logged", BarcodeFormat::Itf);
    stream.next().await.unwrap().unwrap();
    rig.scanner.settle().await.unwrap();

    let events = &rig.events;
    assert_eq!(events.count_of(SessionEventType::CameraAcquired), 1);
    assert_eq!(events.count_of(SessionEventType::ScanStarted), 1);
    assert_eq!(events.count_of(SessionEventType::ScanDelivered), 1);
    assert_eq!(events.count_of(SessionEventType::CameraReleased), 1);
    assert!(events.count_of(SessionEventType::StateChanged) >= 2);
}

#[tokio::test]
async fn test_execute_named_bridge_commands() {
    use scanner_host::CommandOutput;
    use serde_json::json;

    let rig = granted();
    let handle = rig.scanner.handle();

    match handle.execute_named("prepare", &json!([0])).await.unwrap() {
        CommandOutput::Status(status) => assert!(status.prepared),
        other => panic!("unexpected output: {other:?}"),
    }
    assert!(matches!(
        handle.execute_named("pause", &json!([])).await.unwrap(),
        CommandOutput::Done
    ));
    assert!(matches!(
        handle.execute_named("snap", &json!([])).await.unwrap(),
        CommandOutput::Image(_)
    ));

    let output = handle
        .execute_named("scan", &json!([{"format": "QR_CODE"}]))
        .await
        .unwrap();
    let CommandOutput::Stream(mut stream) = output else {
        panic!("scan should return a stream");
    };
    rig.scanner.settle().await.unwrap();
    rig.camera.probe().emit_barcode("bridged", BarcodeFormat::QrCode);
    assert_eq!(stream.next().await.unwrap().unwrap().text, "bridged");

    let err = handle
        .execute_named("useCamera", &json!([5]))
        .await
        .unwrap_err();
    assert_eq!(err.to_host_error().code.as_u8(), 5);
}

#[tokio::test]
async fn test_shutdown_releases_camera() {
    let rig = granted();
    let probe = rig.camera.probe();
    let handle = rig.scanner.handle();
    let mut stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    rig.scanner.settle().await.unwrap();

    rig.scanner.shutdown().await.unwrap();
    assert_eq!(probe.live_devices(), 0);
    assert_eq!(stream.next().await.unwrap(), Err(ScanError::ScanCanceled));
    assert!(matches!(
        handle.status().await,
        Err(ScanError::Unexpected(_))
    ));
}

#[tokio::test]
async fn test_dropping_every_handle_releases_camera() {
    let rig = granted();
    let probe = rig.camera.probe();
    let _stream = rig.scanner.scan(ScanOptions::multiple()).unwrap();
    rig.scanner.settle().await.unwrap();
    assert!(probe.decoding());

    drop(rig.scanner);
    for _ in 0..200 {
        if probe.live_devices() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("camera still held after every handle was dropped");
}

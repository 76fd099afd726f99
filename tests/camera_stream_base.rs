// This is free and unencumbered software released into the public domain.

mod common;

use atalk_camera_module::shared::{
    CameraCharacteristics, CameraError, CameraEvent, CameraFailure, CameraState, CameraStream, DeviceEvent, Facing,
    FixedDisplay, PreviewStream, Rotation, Size, StreamConfig,
};
use common::*;
use std::{
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

const VGA: Size = Size::new(640, 480);

fn setup(cameras: Vec<CameraCharacteristics>) -> (Arc<FakeManager>, Arc<FixedDisplay>, PreviewStream) {
    let manager = FakeManager::new(cameras);
    let display = Arc::new(FixedDisplay::new(Rotation::Rotation0, false));
    let config = StreamConfig::new(640, 480, 30.0)
        .with_open_timeout(Duration::from_millis(100))
        .with_frame_timeout(Duration::from_millis(50));
    let stream = PreviewStream::new(manager.clone(), display.clone(), config);
    (manager, display, stream)
}

fn back_and_front() -> Vec<CameraCharacteristics> {
    vec![
        camera("0", Facing::Back, 90, &[VGA, Size::new(1280, 720)]),
        camera("1", Facing::Front, 270, &[VGA, Size::new(1280, 720)]),
    ]
}

fn configured(stream: &PreviewStream) -> bool {
    stream
        .base()
        .wait_for_state(WAIT, |s| s == CameraState::Configured)
        .is_some()
}

#[test]
fn open_selects_first_camera_and_closest_size() {
    let (manager, _display, mut stream) = setup(vec![camera(
        "7",
        Facing::Back,
        90,
        &[Size::new(1920, 1080), Size::new(800, 600), Size::new(1280, 720)],
    )]);
    stream.start().unwrap();
    assert!(configured(&stream));

    assert_eq!(stream.base().camera_id().as_deref(), Some("7"));
    assert_eq!(stream.base().preview_params().format, Size::new(800, 600));
    assert_eq!(*manager.state.opened_ids.lock().unwrap(), vec!["7".to_string()]);
    assert_eq!(manager.state.repeating_requests.load(Ordering::SeqCst), 1);

    let events = drain_events(&stream.base().events());
    assert!(matches!(events[0], CameraEvent::Opened { size, .. } if size == Size::new(800, 600)));
    assert!(matches!(events[1], CameraEvent::Configured { .. }));
}

#[test]
fn busy_lock_times_out_with_notification() {
    let (manager, _display, mut stream) = setup(back_and_front());
    assert!(stream.base().semaphore().try_acquire());

    let err = stream.start().unwrap_err();
    assert!(matches!(err, CameraError::CameraBusy { ref camera, size } if camera == "0" && size == VGA));
    assert_eq!(manager.opens(), 0);

    let events = drain_events(&stream.base().events());
    assert!(matches!(
        events.as_slice(),
        [CameraEvent::Error { error: CameraError::CameraBusy { .. }, .. }]
    ));

    assert!(stream.base().semaphore().release());
    stream.start().unwrap();
    assert!(configured(&stream));
}

#[test]
fn open_failure_reports_reason_and_frees_lock() {
    let (manager, _display, mut stream) = setup(back_and_front());
    manager.fail_open(Some(CameraFailure::IN_USE));
    stream.start().unwrap();

    let state = stream.base().wait_for_state(WAIT, CameraState::is_failure);
    assert_eq!(state, Some(CameraState::CreateFailed(CameraFailure::InUse)));
    assert!(eventually(|| stream.base().semaphore().available_permits() == 1));

    let events = drain_events(&stream.base().events());
    assert!(events.iter().any(|e| matches!(
        e,
        CameraEvent::Error {
            error: CameraError::Device { failure: CameraFailure::InUse, size, .. },
            ..
        } if *size == VGA
    )));

    // A failed open can be retried.
    manager.fail_open(None);
    stream.start().unwrap();
    assert!(configured(&stream));
}

#[test]
fn device_error_while_streaming_is_fatal() {
    let (manager, _display, mut stream) = setup(back_and_front());
    stream.start().unwrap();
    assert!(configured(&stream));

    assert!(manager.inject(DeviceEvent::Error(CameraFailure::SERVICE)));
    let state = stream.base().wait_for_state(WAIT, CameraState::is_failure);
    assert_eq!(state, Some(CameraState::FatalError(CameraFailure::FatalService)));
    assert!(eventually(|| manager.state.device_closes.load(Ordering::SeqCst) == 1));
    assert_eq!(manager.state.session_closes.load(Ordering::SeqCst), 1);
}

#[test]
fn disconnect_while_streaming_is_fatal() {
    let (manager, _display, mut stream) = setup(back_and_front());
    stream.start().unwrap();
    assert!(configured(&stream));

    manager.inject(DeviceEvent::Disconnected);
    let state = stream.base().wait_for_state(WAIT, CameraState::is_failure);
    assert_eq!(state, Some(CameraState::FatalError(CameraFailure::FatalDevice)));
}

#[test]
fn session_configuration_failure() {
    let (manager, _display, mut stream) = setup(back_and_front());
    manager.state.configure_fails.store(true, Ordering::SeqCst);
    stream.start().unwrap();

    let state = stream.base().wait_for_state(WAIT, CameraState::is_failure);
    assert_eq!(state, Some(CameraState::ConfigureFailed));
    assert!(eventually(|| manager.state.device_closes.load(Ordering::SeqCst) == 1));
    let events = drain_events(&stream.base().events());
    assert!(events.iter().any(|e| matches!(
        e,
        CameraEvent::Error {
            error: CameraError::Device { failure: CameraFailure::ConfigureFailed, .. },
            ..
        }
    )));
}

#[test]
fn switch_with_local_video_disabled_does_not_open() {
    let (manager, _display, mut stream) = setup(back_and_front());
    stream.start().unwrap();
    assert!(configured(&stream));

    stream.base().switch_camera("1", false).unwrap();
    assert_eq!(stream.base().camera_id().as_deref(), Some("1"));
    assert_eq!(stream.base().state(), CameraState::Released);
    assert_eq!(manager.opens(), 1);
    assert!(!stream.base().in_transition());

    stream.base().switch_camera("1", true).unwrap();
    assert!(configured(&stream));
    assert_eq!(manager.opens(), 2);
    assert_eq!(manager.state.opened_ids.lock().unwrap()[1], "1");
    assert!(stream.base().preview_params().orientation.swap);
}

#[test]
fn rotation_reconfigures_in_place() {
    let (manager, display, mut stream) = setup(back_and_front());
    stream.start().unwrap();
    assert!(configured(&stream));
    let before = stream.base().preview_params();
    assert_eq!(before.orientation.degrees, 270);
    assert_eq!(before.preview_size, Size::new(480, 640));

    display.set_rotation(Rotation::Rotation90);
    stream.base().init_preview_on_rotation(true).unwrap();

    let after = stream.base().preview_params();
    assert_eq!(after.orientation.degrees, 0);
    assert_eq!(after.preview_size, VGA);
    assert_eq!(manager.opens(), 1);
    assert_eq!(manager.state.repeating_requests.load(Ordering::SeqCst), 2);
    assert!(!stream.base().in_transition());
}

#[test]
fn rotation_lets_draining_frames_read_the_stream() {
    let (manager, display, mut stream) = setup(back_and_front());
    manager.state.drain_on_stop.store(true, Ordering::SeqCst);

    let slot: Arc<OnceLock<Weak<PreviewStream>>> = Arc::default();
    let reads = Arc::new(AtomicUsize::new(0));
    {
        let slot = Arc::clone(&slot);
        let reads = Arc::clone(&reads);
        stream.set_transfer_handler(Some(Arc::new(move || {
            if let Some(stream) = slot.get().and_then(Weak::upgrade) {
                let _ = stream.base().preview_params();
                reads.fetch_add(1, Ordering::SeqCst);
            }
        })));
    }
    stream.start().unwrap();
    assert!(configured(&stream));

    let stream = Arc::new(stream);
    slot.set(Arc::downgrade(&stream)).unwrap();
    display.set_rotation(Rotation::Rotation90);

    let (done_tx, done_rx) = mpsc::channel();
    let rotating = Arc::clone(&stream);
    thread::spawn(move || {
        let _ = done_tx.send(rotating.base().init_preview_on_rotation(true));
    });
    let result = done_rx.recv_timeout(WAIT).expect("rotation did not finish");

    assert!(result.is_ok());
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(manager.opens(), 1);
    assert_eq!(manager.state.repeating_requests.load(Ordering::SeqCst), 2);
    assert_eq!(stream.base().preview_params().orientation.degrees, 0);
}

#[test]
fn close_leaves_a_foreign_permit_alone() {
    let (_manager, _display, mut stream) = setup(back_and_front());
    assert!(stream.base().semaphore().try_acquire());

    stream.stop().unwrap();
    assert_eq!(stream.base().semaphore().available_permits(), 0);
    assert!(stream.base().semaphore().release());
}

#[test]
fn rotation_falls_back_to_reopen() {
    let (manager, display, mut stream) = setup(back_and_front());
    stream.start().unwrap();
    assert!(configured(&stream));

    manager.state.fail_next_repeating.store(true, Ordering::SeqCst);
    display.set_rotation(Rotation::Rotation90);
    stream.base().init_preview_on_rotation(true).unwrap();

    assert_eq!(manager.opens(), 2);
    assert!(configured(&stream));
    assert_eq!(stream.base().preview_params().orientation.degrees, 0);
}

#[test]
fn rotation_without_init_format_only_recomputes() {
    let (manager, display, mut stream) = setup(back_and_front());
    stream.start().unwrap();
    assert!(configured(&stream));

    display.set_rotation(Rotation::Rotation180);
    stream.base().init_preview_on_rotation(false).unwrap();

    let params = stream.base().preview_params();
    assert_eq!(params.orientation.degrees, 90);
    assert!(params.orientation.flip);
    assert_eq!(manager.state.repeating_requests.load(Ordering::SeqCst), 1);
}

#[test]
fn lock_never_exceeds_one_permit() {
    let (manager, _display, mut stream) = setup(back_and_front());
    let permits = |stream: &PreviewStream| stream.base().semaphore().available_permits();
    assert_eq!(permits(&stream), 1);

    for _ in 0..3 {
        stream.start().unwrap();
        assert!(configured(&stream));
        assert!(eventually(|| permits(&stream) == 1));
        stream.stop().unwrap();
        assert_eq!(permits(&stream), 1);
    }
    manager.fail_open(Some(CameraFailure::DISABLED));
    stream.start().unwrap();
    stream.base().wait_for_state(WAIT, CameraState::is_failure);
    assert!(eventually(|| permits(&stream) == 1));
    stream.stop().unwrap();

    assert!(!stream.base().semaphore().release());
    assert_eq!(permits(&stream), 1);
}

#[test]
fn no_supported_size_is_an_error() {
    let (_manager, _display, mut stream) = setup(vec![camera("0", Facing::Back, 0, &[])]);
    let err = stream.start().unwrap_err();
    assert!(matches!(err, CameraError::NoSuitableSize { .. }));
    assert_eq!(stream.base().semaphore().available_permits(), 1);
}

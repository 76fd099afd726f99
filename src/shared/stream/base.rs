// This is free and unencumbered software released into the public domain.

use crate::shared::{
    BinarySemaphore, CameraBackend, CameraCharacteristics, CameraDevice, CameraError,
    CameraEvent, CameraFailure, CameraManager, CameraState, CameraStateMachine, CaptureSession,
    DeviceEvent, DeviceEventSender, DisplayInfo, EventLoop, NativeWindow, PreviewOrientation,
    PreviewParams, Size, StreamConfig, notify, select_preview_size,
};
use std::{
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, SyncSender, sync_channel},
    },
    time::Duration,
};

const EVENT_QUEUE_CAPACITY: usize = 64;

/// Outputs a stream variant attaches to the camera.
pub trait StreamTargets: Send + Sync {
    /// Called on the camera event thread once the camera is open, before
    /// the capture session is created. Returns the session's output
    /// windows. May block, e.g. until a preview surface exists.
    fn on_init_preview(&self, params: &PreviewParams) -> Result<Vec<NativeWindow>, CameraError>;

    /// Called after the camera has been closed. Must tolerate being called
    /// without a prior `on_init_preview`.
    fn on_camera_closed(&self);
}

#[derive(Default)]
struct Session {
    machine: CameraStateMachine,
    camera_id: Option<String>,
    characteristics: Option<CameraCharacteristics>,
    params: PreviewParams,
    device: Option<Box<dyn CameraDevice>>,
    capture: Option<Box<dyn CaptureSession>>,
    outputs: Vec<NativeWindow>,
    events: Option<DeviceEventSender>,
}

struct Shared {
    manager: Arc<dyn CameraManager>,
    display: Arc<dyn DisplayInfo>,
    targets: Arc<dyn StreamTargets>,
    config: StreamConfig,
    events_tx: SyncSender<CameraEvent>,
    semaphore: BinarySemaphore,
    in_transition: AtomicBool,
    session: Mutex<Session>,
    state_changed: Condvar,
}

/// Camera ownership shared by the preview and surface streams.
///
/// Opens and closes the camera under a single-permit semaphore, negotiates
/// the capture size and tracks the orientation frames must be rotated by.
/// Platform callbacks are handled on a dedicated event thread.
pub struct CameraStreamBase {
    shared: Arc<Shared>,
    event_loop: Mutex<Option<EventLoop>>,
    events_rx: Mutex<Receiver<CameraEvent>>,
}

impl core::fmt::Debug for CameraStreamBase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CameraStreamBase")
            .field("backend", &self.backend())
            .field("camera", &self.camera_id())
            .field("state", &self.state())
            .field("params", &self.preview_params())
            .finish()
    }
}

impl CameraStreamBase {
    /// `make_targets` receives the sender of the user notification channel.
    pub fn new(
        manager: Arc<dyn CameraManager>,
        display: Arc<dyn DisplayInfo>,
        config: StreamConfig,
        make_targets: impl FnOnce(&SyncSender<CameraEvent>) -> Arc<dyn StreamTargets>,
    ) -> Self {
        let (events_tx, events_rx) = sync_channel(EVENT_QUEUE_CAPACITY);
        let targets = make_targets(&events_tx);
        let session = Session {
            camera_id: config.device.clone(),
            ..Default::default()
        };
        Self {
            shared: Arc::new(Shared {
                manager,
                display,
                targets,
                config,
                events_tx,
                semaphore: BinarySemaphore::new(),
                in_transition: AtomicBool::new(false),
                session: Mutex::new(session),
                state_changed: Condvar::new(),
            }),
            event_loop: Mutex::new(None),
            events_rx: Mutex::new(events_rx),
        }
    }

    pub fn backend(&self) -> CameraBackend {
        self.shared.manager.backend()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// User-facing notifications: opens, failures, dropped frames, closes.
    ///
    /// The receiver stays locked while the guard lives.
    pub fn events(&self) -> MutexGuard<'_, Receiver<CameraEvent>> {
        self.events_rx.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn events_tx(&self) -> &SyncSender<CameraEvent> {
        &self.shared.events_tx
    }

    pub fn state(&self) -> CameraState {
        self.shared.lock().machine.state()
    }

    pub fn camera_id(&self) -> Option<String> {
        self.shared.lock().camera_id.clone()
    }

    pub fn characteristics(&self) -> Option<CameraCharacteristics> {
        self.shared.lock().characteristics.clone()
    }

    pub fn preview_params(&self) -> PreviewParams {
        self.shared.lock().params
    }

    pub fn semaphore(&self) -> &BinarySemaphore {
        &self.shared.semaphore
    }

    /// Whether a reconfiguration is in progress. Frames read meanwhile are
    /// discarded.
    pub fn in_transition(&self) -> bool {
        self.shared.in_transition.load(Ordering::Acquire)
    }

    /// Marks the stream as reconfiguring until the guard is dropped.
    pub fn begin_transition(&self) -> TransitionGuard {
        self.shared.in_transition.store(true, Ordering::Release);
        TransitionGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Opens the selected camera at the supported size closest to the
    /// configured one. Returns once the open request has been issued; the
    /// session is configured asynchronously.
    pub fn start(&self) -> Result<(), CameraError> {
        let shared = &self.shared;
        let camera = self.select_camera()?;
        let desired = shared.config.desired_size();

        if !shared.semaphore.acquire(shared.config.open_timeout) {
            tracing::error!(target: "atalk_camera_module", %camera, %desired, "timed out waiting for camera lock");
            let busy = || CameraError::CameraBusy {
                camera: camera.clone(),
                size: desired,
            };
            shared.notify_error(busy());
            return Err(busy());
        }

        match self.open(&camera, desired) {
            Ok(()) => Ok(()),
            Err(err) => {
                shared.semaphore.release();
                tracing::error!(target: "atalk_camera_module", %camera, %desired, %err, "could not open camera");
                Err(err)
            },
        }
    }

    fn select_camera(&self) -> Result<String, CameraError> {
        if let Some(id) = self.camera_id() {
            return Ok(id);
        }
        let id = self
            .shared
            .manager
            .camera_ids()?
            .into_iter()
            .next()
            .ok_or(CameraError::NoCamera)?;
        self.shared.lock().camera_id = Some(id.clone());
        Ok(id)
    }

    fn open(&self, camera: &str, desired: Size) -> Result<(), CameraError> {
        let shared = &self.shared;
        let characteristics = shared.manager.characteristics(camera)?;
        let format = select_preview_size(&characteristics.output_sizes, desired).ok_or_else(|| {
            CameraError::NoSuitableSize {
                camera: camera.to_string(),
                desired,
            }
        })?;
        let orientation =
            PreviewOrientation::derive(characteristics.sensor_info(), shared.display.state(), true);
        let params = PreviewParams::new(format, orientation);
        tracing::info!(target: "atalk_camera_module", %camera, %desired, %format, preview = %params.preview_size, degrees = orientation.degrees, swap = orientation.swap, flip = orientation.flip, "opening camera");

        let mut event_loop = self.event_loop.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(mut stale) = event_loop.take() {
            stale.stop();
        }

        {
            let mut session = shared.lock();
            if !session.machine.begin_open() {
                return Err(CameraError::other(format!(
                    "camera {camera} is already {}",
                    session.machine.state()
                )));
            }
            session.characteristics = Some(characteristics);
            session.params = params;
            session.outputs.clear();
        }

        let handler = Arc::clone(shared);
        let new_loop = match EventLoop::spawn(format!("camera-{camera}"), move |event| {
            handler.handle_event(event)
        }) {
            Ok(new_loop) => new_loop,
            Err(err) => {
                shared.lock().machine.release();
                return Err(err);
            },
        };
        let sender = new_loop.sender();
        shared.lock().events = Some(sender.clone());
        *event_loop = Some(new_loop);
        drop(event_loop);

        if let Err(err) = shared.manager.open_camera(camera, sender) {
            let mut session = shared.lock();
            session.machine.release();
            session.events = None;
            drop(session);
            self.stop_event_loop();
            return Err(err);
        }
        Ok(())
    }

    /// Closes the camera and stops the event thread. Safe to call in any
    /// state, including repeatedly.
    pub fn stop(&self) -> Result<(), CameraError> {
        self.close_camera();
        self.stop_event_loop();
        Ok(())
    }

    fn stop_event_loop(&self) {
        let event_loop = self
            .event_loop
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(mut event_loop) = event_loop {
            event_loop.stop();
        }
    }

    /// Stops repeating, closes the capture session and device and releases
    /// the variant's targets. Whatever is missing is skipped.
    pub fn close_camera(&self) {
        let shared = &self.shared;
        let acquired = shared.semaphore.acquire(shared.config.open_timeout);
        if !acquired {
            tracing::warn!(target: "atalk_camera_module", "closing camera without the camera lock");
        }

        let (capture, device, camera, abandoned_open) = {
            let mut session = shared.lock();
            let abandoned_open = !acquired && session.machine.state() == CameraState::Opening;
            if session.machine.state() != CameraState::Idle {
                session.machine.release();
            }
            session.outputs.clear();
            session.events = None;
            (
                session.capture.take(),
                session.device.take(),
                session.camera_id.clone(),
                abandoned_open,
            )
        };
        // An abandoned open never reaches `Created`, so its permit is
        // returned here. A permit held by anyone else is left alone.
        let owns_permit = acquired || abandoned_open;
        scopeguard::defer! {
            if owns_permit {
                shared.semaphore.release();
            }
        }

        if let Some(mut capture) = capture {
            if let Err(err) = capture.stop_repeating() {
                tracing::warn!(target: "atalk_camera_module", %err, "could not stop repeating request");
            }
            capture.close();
        }
        let had_device = device.is_some();
        if let Some(mut device) = device {
            device.close();
        }
        shared.targets.on_camera_closed();
        shared.state_changed.notify_all();

        if had_device {
            tracing::info!(target: "atalk_camera_module", camera = camera.as_deref().unwrap_or_default(), "camera closed");
            notify(
                &shared.events_tx,
                CameraEvent::Closed {
                    backend: shared.manager.backend(),
                    camera: camera.unwrap_or_default(),
                },
            );
        }
    }

    /// Recomputes the preview orientation from the current display state.
    ///
    /// With `init_format` frames are normalized upright for the display;
    /// without it only the sensor orientation is compensated.
    pub fn init_preview_orientation(&self, init_format: bool) -> PreviewParams {
        let display = self.shared.display.state();
        let mut session = self.shared.lock();
        if let Some(sensor) = session.characteristics.as_ref().map(|c| c.sensor_info()) {
            let orientation = PreviewOrientation::derive(sensor, display, init_format);
            session.params = PreviewParams::new(session.params.format, orientation);
        }
        session.params
    }

    /// Reacts to a device rotation.
    ///
    /// With `init_format` the running session is reconfigured in place,
    /// falling back to a full close and reopen if that fails. Without it
    /// only the orientation is recomputed.
    pub fn init_preview_on_rotation(&self, init_format: bool) -> Result<(), CameraError> {
        if !init_format {
            self.init_preview_orientation(false);
            return Ok(());
        }

        let result = {
            let _transition = self.begin_transition();
            self.reconfigure_in_place()
        };
        if let Err(err) = result {
            tracing::warn!(target: "atalk_camera_module", %err, "in-place reconfiguration failed, reopening camera");
            let _transition = self.begin_transition();
            self.stop()?;
            self.start()?;
        }
        Ok(())
    }

    fn reconfigure_in_place(&self) -> Result<(), CameraError> {
        let display = self.shared.display.state();
        let (mut capture, sensor, outputs) = {
            let mut session = self.shared.lock();
            if session.machine.state() != CameraState::Configured {
                return Err(CameraError::NotConfigured);
            }
            let sensor = session
                .characteristics
                .as_ref()
                .map(|c| c.sensor_info())
                .ok_or(CameraError::NotConfigured)?;
            let capture = session.capture.take().ok_or(CameraError::NotConfigured)?;
            (capture, sensor, session.outputs.clone())
        };

        // The session lock is not held here: stopping may wait for frames
        // whose listeners read the stream.
        let orientation = PreviewOrientation::derive(sensor, display, true);
        let result = capture
            .stop_repeating()
            .and_then(|()| capture.set_repeating_request(&outputs));

        let mut session = self.shared.lock();
        if session.machine.state() != CameraState::Configured || session.capture.is_some() {
            drop(session);
            capture.close();
            return Err(CameraError::NotConfigured);
        }
        session.capture = Some(capture);
        result?;
        session.params = PreviewParams::new(session.params.format, orientation);
        tracing::debug!(target: "atalk_camera_module", degrees = orientation.degrees, swap = orientation.swap, flip = orientation.flip, "reconfigured for rotation");
        Ok(())
    }

    /// Closes the current camera and selects `camera_id`. Capture restarts
    /// only when local video is enabled.
    pub fn switch_camera(&self, camera_id: impl Into<String>, local_video_enabled: bool) -> Result<(), CameraError> {
        let _transition = self.begin_transition();
        self.stop()?;
        let camera_id = camera_id.into();
        tracing::info!(target: "atalk_camera_module", camera = %camera_id, local_video_enabled, "switching camera");
        self.shared.lock().camera_id = Some(camera_id);
        if local_video_enabled {
            self.start()?;
        }
        Ok(())
    }

    /// Blocks until `predicate` accepts the camera state. Returns the state
    /// reached, or `None` on timeout.
    pub fn wait_for_state(
        &self,
        timeout: Duration,
        predicate: impl Fn(CameraState) -> bool,
    ) -> Option<CameraState> {
        let session = self.shared.lock();
        let (session, _) = self
            .shared
            .state_changed
            .wait_timeout_while(session, timeout, |s| !predicate(s.machine.state()))
            .unwrap_or_else(|p| p.into_inner());
        let state = session.machine.state();
        predicate(state).then_some(state)
    }
}

impl Drop for CameraStreamBase {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Clears the stream's in-transition flag when dropped.
#[must_use]
pub struct TransitionGuard {
    shared: Arc<Shared>,
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.shared.in_transition.store(false, Ordering::Release);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn backend(&self) -> CameraBackend {
        self.manager.backend()
    }

    fn notify_error(&self, error: CameraError) {
        notify(
            &self.events_tx,
            CameraEvent::Error {
                backend: self.backend(),
                error,
            },
        );
    }

    fn handle_event(&self, event: DeviceEvent) {
        let kind = event.kind();
        let mut session = self.lock();
        let Some(state) = session.machine.apply(kind) else {
            drop(session);
            close_payload(event);
            return;
        };

        match event {
            DeviceEvent::Opened(device) => {
                session.device = Some(device);
                drop(session);
                self.on_opened();
            },
            DeviceEvent::SessionConfigured(capture) => self.on_configured(session, capture),
            _ if state.is_failure() => self.on_failure(session, state),
            _ => {},
        }
        self.state_changed.notify_all();
    }

    fn on_opened(&self) {
        self.semaphore.release();
        let (camera, params) = {
            let session = self.lock();
            (session.camera_id.clone().unwrap_or_default(), session.params)
        };
        notify(
            &self.events_tx,
            CameraEvent::Opened {
                backend: self.backend(),
                camera: camera.clone(),
                size: params.format,
            },
        );
        self.state_changed.notify_all();

        let outputs = match self.targets.on_init_preview(&params) {
            Ok(outputs) => outputs,
            Err(err) => {
                tracing::error!(target: "atalk_camera_module", %camera, %err, "could not prepare capture outputs");
                self.configure_failed();
                return;
            },
        };

        let mut guard = self.lock();
        let session = &mut *guard;
        let (Some(device), Some(events)) = (session.device.as_mut(), session.events.clone()) else {
            return;
        };
        if let Err(err) = device.create_capture_session(&outputs, events) {
            drop(guard);
            tracing::error!(target: "atalk_camera_module", %camera, %err, "could not create capture session");
            self.configure_failed();
            return;
        }
        session.outputs = outputs;
    }

    fn configure_failed(&self) {
        let mut session = self.lock();
        if session.machine.state() == CameraState::Created {
            session.machine.fail(CameraState::ConfigureFailed);
            self.on_failure(session, CameraState::ConfigureFailed);
        }
    }

    fn on_configured(&self, mut session: MutexGuard<'_, Session>, mut capture: Box<dyn CaptureSession>) {
        if session.device.is_none() {
            capture.close();
            return;
        }
        let camera = session.camera_id.clone().unwrap_or_default();
        if let Err(err) = capture.set_repeating_request(&session.outputs) {
            tracing::error!(target: "atalk_camera_module", %camera, %err, "could not start repeating request");
            capture.close();
            session.machine.fail(CameraState::ConfigureFailed);
            self.on_failure(session, CameraState::ConfigureFailed);
            return;
        }
        session.capture = Some(capture);
        drop(session);
        tracing::info!(target: "atalk_camera_module", %camera, "camera capture started");
        notify(
            &self.events_tx,
            CameraEvent::Configured {
                backend: self.backend(),
                camera,
            },
        );
    }

    fn on_failure(&self, mut session: MutexGuard<'_, Session>, state: CameraState) {
        let capture = session.capture.take();
        let device = session.device.take();
        let camera = session.camera_id.clone().unwrap_or_default();
        drop(session);

        if let Some(mut capture) = capture {
            capture.close();
        }
        if let Some(mut device) = device {
            device.close();
        }
        self.semaphore.release();

        let failure = state.failure().unwrap_or(CameraFailure::Unknown(0));
        let size = self.config.desired_size();
        tracing::error!(target: "atalk_camera_module", %camera, %size, %failure, "camera failed");
        self.notify_error(CameraError::Device {
            camera,
            size,
            failure,
        });
        self.state_changed.notify_all();
    }
}

fn close_payload(event: DeviceEvent) {
    match event {
        DeviceEvent::Opened(mut device) => device.close(),
        DeviceEvent::SessionConfigured(mut capture) => capture.close(),
        _ => {},
    }
}

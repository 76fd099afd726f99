// This is free and unencumbered software released into the public domain.

//! In-memory camera platform and GL backend for the integration tests.

#![allow(dead_code)]

use atalk_camera_module::shared::{
    CameraBackend, CameraCharacteristics, CameraDevice, CameraError, CameraEvent, CameraImage,
    CameraManager, CaptureSession, DeviceEvent, DeviceEventSender, Facing, GlError, ImageListener,
    ImageReceiver, NativeWindow, PlanarImage, Size, ViewHost,
    gl::{
        GlBackend, GlContextId, GlProgramId, GlShaderId, GlSurfaceId, GlTextureId,
        IDENTITY_MATRIX, ShaderKind, SurfaceTexture,
    },
};
use std::{
    borrow::Cow,
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        mpsc::Receiver,
    },
    thread,
    time::{Duration, Instant},
};

pub const WAIT: Duration = Duration::from_secs(3);

pub fn camera(id: &str, facing: Facing, sensor_orientation: u32, sizes: &[Size]) -> CameraCharacteristics {
    CameraCharacteristics {
        id: id.to_string(),
        facing,
        sensor_orientation,
        output_sizes: sizes.to_vec(),
    }
}

/// Polls `condition` until it holds or [`WAIT`] elapses.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Collects the notifications queued so far.
pub fn drain_events(events: &Receiver<CameraEvent>) -> Vec<CameraEvent> {
    events.try_iter().collect()
}

/// Packed I420 frame where every byte is `(index * 7) mod 251`.
pub fn patterned_frame(size: Size) -> Vec<u8> {
    (0..size.yuv420_len()).map(|i| (i * 7 % 251) as u8).collect()
}

pub fn i420_image(size: Size) -> Box<dyn CameraImage> {
    Box::new(PlanarImage::i420(patterned_frame(size), size, 1).expect("valid I420 frame"))
}

#[derive(Default)]
pub struct PlatformState {
    pub open_failure: Mutex<Option<i32>>,
    pub configure_fails: AtomicBool,
    pub fail_next_repeating: AtomicBool,
    pub opens: AtomicUsize,
    pub opened_ids: Mutex<Vec<String>>,
    pub sessions: AtomicUsize,
    pub session_outputs: Mutex<Vec<NativeWindow>>,
    pub repeating_requests: AtomicUsize,
    pub device_closes: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub receivers_closed: AtomicUsize,
    /// Stopping the repeating request delivers one last frame from a
    /// reader thread and joins it, as the ffmpeg backend does.
    pub drain_on_stop: AtomicBool,
    events: Mutex<Option<DeviceEventSender>>,
    receivers: Mutex<Vec<(NativeWindow, Size, ImageListener, Arc<AtomicBool>)>>,
}

impl PlatformState {
    fn newest_listener(&self) -> Option<(ImageListener, Size)> {
        let receivers = self.receivers.lock().unwrap();
        receivers
            .iter()
            .rev()
            .find(|(_, _, _, closed)| !closed.load(Ordering::SeqCst))
            .map(|(_, size, listener, _)| (Arc::clone(listener), *size))
    }
}

/// Camera platform whose devices open and configure immediately.
pub struct FakeManager {
    cameras: Vec<CameraCharacteristics>,
    next_window: AtomicUsize,
    pub state: Arc<PlatformState>,
}

impl FakeManager {
    pub fn new(cameras: Vec<CameraCharacteristics>) -> Arc<Self> {
        Arc::new(Self {
            cameras,
            next_window: AtomicUsize::new(0x1000),
            state: Arc::default(),
        })
    }

    pub fn fail_open(&self, code: Option<i32>) {
        *self.state.open_failure.lock().unwrap() = code;
    }

    /// Posts `event` to the stream that opened the last camera.
    pub fn inject(&self, event: DeviceEvent) -> bool {
        match self.state.events.lock().unwrap().as_ref() {
            Some(events) => events.send(event),
            None => false,
        }
    }

    /// Hands `image` to the newest open image receiver.
    pub fn deliver(&self, image: Box<dyn CameraImage>) -> bool {
        match self.state.newest_listener() {
            Some((listener, _)) => {
                listener(image);
                true
            },
            None => false,
        }
    }

    pub fn receiver_sizes(&self) -> Vec<Size> {
        let receivers = self.state.receivers.lock().unwrap();
        receivers.iter().map(|(_, size, _, _)| *size).collect()
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }
}

impl dogma::Named for FakeManager {
    fn name(&self) -> Cow<'_, str> {
        "fake".into()
    }
}

impl CameraManager for FakeManager {
    fn backend(&self) -> CameraBackend {
        CameraBackend::Host
    }

    fn camera_ids(&self) -> Result<Vec<String>, CameraError> {
        Ok(self.cameras.iter().map(|c| c.id.clone()).collect())
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError> {
        self.cameras
            .iter()
            .find(|c| c.id == camera_id)
            .cloned()
            .ok_or(CameraError::NoCamera)
    }

    fn open_camera(&self, camera_id: &str, events: DeviceEventSender) -> Result<(), CameraError> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        self.state.opened_ids.lock().unwrap().push(camera_id.to_string());
        *self.state.events.lock().unwrap() = Some(events.clone());

        let failure = *self.state.open_failure.lock().unwrap();
        match failure {
            Some(code) => events.send(DeviceEvent::OpenFailed(code)),
            None => events.send(DeviceEvent::Opened(Box::new(FakeDevice {
                id: camera_id.to_string(),
                state: Arc::clone(&self.state),
                closed: false,
            }))),
        };
        Ok(())
    }

    fn create_image_receiver(
        &self,
        size: Size,
        _max_images: usize,
        listener: ImageListener,
    ) -> Result<Box<dyn ImageReceiver>, CameraError> {
        let window = NativeWindow(self.next_window.fetch_add(1, Ordering::SeqCst));
        let closed = Arc::new(AtomicBool::new(false));
        self.state
            .receivers
            .lock()
            .unwrap()
            .push((window, size, listener, Arc::clone(&closed)));
        Ok(Box::new(FakeReceiver {
            window,
            closed,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeDevice {
    id: String,
    state: Arc<PlatformState>,
    closed: bool,
}

impl CameraDevice for FakeDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: &[NativeWindow],
        events: DeviceEventSender,
    ) -> Result<(), CameraError> {
        self.state.sessions.fetch_add(1, Ordering::SeqCst);
        *self.state.session_outputs.lock().unwrap() = outputs.to_vec();
        if self.state.configure_fails.load(Ordering::SeqCst) {
            events.send(DeviceEvent::SessionConfigureFailed);
        } else {
            events.send(DeviceEvent::SessionConfigured(Box::new(FakeSession {
                state: Arc::clone(&self.state),
                closed: false,
            })));
        }
        Ok(())
    }

    fn close(&mut self) {
        if !std::mem::replace(&mut self.closed, true) {
            self.state.device_closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeSession {
    state: Arc<PlatformState>,
    closed: bool,
}

impl CaptureSession for FakeSession {
    fn set_repeating_request(&mut self, _targets: &[NativeWindow]) -> Result<(), CameraError> {
        if self.state.fail_next_repeating.swap(false, Ordering::SeqCst) {
            return Err(CameraError::other("repeating request rejected"));
        }
        self.state.repeating_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<(), CameraError> {
        if !self.state.drain_on_stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some((listener, size)) = self.state.newest_listener() {
            thread::spawn(move || listener(i420_image(size)))
                .join()
                .map_err(|_| CameraError::other("reader thread panicked"))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if !std::mem::replace(&mut self.closed, true) {
            self.state.session_closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeReceiver {
    window: NativeWindow,
    closed: Arc<AtomicBool>,
    state: Arc<PlatformState>,
}

impl ImageReceiver for FakeReceiver {
    fn window(&self) -> NativeWindow {
        self.window
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.receivers_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// View host that only counts what it was asked to do.
#[derive(Default)]
pub struct FakeViewHost {
    pub ensured: AtomicUsize,
    pub released: AtomicUsize,
    pub removed: AtomicUsize,
}

impl ViewHost for FakeViewHost {
    fn ensure_view(&self) {
        self.ensured.fetch_add(1, Ordering::SeqCst);
    }

    fn release_view(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn remove_view(&self) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }
}

/// GL backend recording the calls that matter for ordering checks.
pub struct FakeGl {
    next_id: AtomicU64,
    surface_size: Size,
    recordable: Mutex<HashSet<u64>>,
    pub log: Arc<Mutex<Vec<String>>>,
    pub contexts_destroyed: AtomicUsize,
    pub make_current_calls: AtomicUsize,
    pub release_current_calls: AtomicUsize,
    pub draws: Mutex<Vec<Size>>,
    pub swaps: AtomicUsize,
    pub presentation_times: Mutex<Vec<u64>>,
    /// Every buffer swap with the surface it presented.
    pub swap_log: Mutex<Vec<(GlSurfaceId, Instant)>>,
    /// Surfaces that received a presentation time, i.e. encoder surfaces.
    pub timed_surfaces: Mutex<HashSet<u64>>,
    textures: Mutex<Vec<Arc<FakeSurfaceTexture>>>,
}

impl FakeGl {
    pub fn new(surface_size: Size) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            surface_size,
            recordable: Mutex::default(),
            log: Arc::default(),
            contexts_destroyed: AtomicUsize::new(0),
            make_current_calls: AtomicUsize::new(0),
            release_current_calls: AtomicUsize::new(0),
            draws: Mutex::default(),
            swaps: AtomicUsize::new(0),
            presentation_times: Mutex::default(),
            swap_log: Mutex::default(),
            timed_surfaces: Mutex::default(),
            textures: Mutex::default(),
        })
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Position of the first log entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.log.lock().unwrap().iter().position(|e| e == entry)
    }

    /// Swap instants split into (preview, encoder) surfaces.
    pub fn swap_times(&self) -> (Vec<Instant>, Vec<Instant>) {
        let timed = self.timed_surfaces.lock().unwrap().clone();
        let (encoder, preview): (Vec<_>, Vec<_>) = self
            .swap_log
            .lock()
            .unwrap()
            .iter()
            .copied()
            .partition(|(surface, _)| timed.contains(&surface.0));
        (
            preview.into_iter().map(|(_, at)| at).collect(),
            encoder.into_iter().map(|(_, at)| at).collect(),
        )
    }

    pub fn texture(&self) -> Option<Arc<FakeSurfaceTexture>> {
        self.textures.lock().unwrap().last().cloned()
    }
}

impl GlBackend for FakeGl {
    fn create_context(&self, _share: Option<GlContextId>, recordable: bool) -> Result<GlContextId, GlError> {
        let id = self.next();
        if recordable {
            self.recordable.lock().unwrap().insert(id);
        }
        Ok(GlContextId(id))
    }

    fn create_window_surface(&self, _context: GlContextId, _window: NativeWindow) -> Result<GlSurfaceId, GlError> {
        Ok(GlSurfaceId(self.next()))
    }

    fn make_current(&self, _context: GlContextId, _surface: GlSurfaceId) -> Result<(), GlError> {
        self.make_current_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_current(&self) {
        self.release_current_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn swap_buffers(&self, surface: GlSurfaceId) -> Result<(), GlError> {
        self.swaps.fetch_add(1, Ordering::SeqCst);
        self.swap_log.lock().unwrap().push((surface, Instant::now()));
        Ok(())
    }

    fn set_presentation_time(&self, surface: GlSurfaceId, timestamp_ns: u64) -> Result<(), GlError> {
        self.timed_surfaces.lock().unwrap().insert(surface.0);
        self.presentation_times.lock().unwrap().push(timestamp_ns);
        Ok(())
    }

    fn surface_size(&self, _surface: GlSurfaceId) -> Result<Size, GlError> {
        Ok(self.surface_size)
    }

    fn destroy_surface(&self, _surface: GlSurfaceId) {}

    fn destroy_context(&self, context: GlContextId) {
        self.contexts_destroyed.fetch_add(1, Ordering::SeqCst);
        if self.recordable.lock().unwrap().contains(&context.0) {
            self.record("destroy_encoder_context");
        } else {
            self.record("destroy_context");
        }
    }

    fn compile_shader(&self, _kind: ShaderKind, _source: &str) -> Result<GlShaderId, GlError> {
        Ok(GlShaderId(self.next() as u32))
    }

    fn link_program(&self, _vertex: GlShaderId, _fragment: GlShaderId) -> Result<GlProgramId, GlError> {
        Ok(GlProgramId(self.next() as u32))
    }

    fn delete_shader(&self, _shader: GlShaderId) {}

    fn delete_program(&self, _program: GlProgramId) {
        self.record("delete_program");
    }

    fn create_external_texture(&self) -> Result<GlTextureId, GlError> {
        Ok(GlTextureId(self.next() as u32))
    }

    fn delete_texture(&self, _texture: GlTextureId) {
        self.record("delete_texture");
    }

    fn draw_external_texture(
        &self,
        _program: GlProgramId,
        _texture: GlTextureId,
        _st_matrix: &[f32; 16],
        viewport: Size,
    ) -> Result<(), GlError> {
        self.draws.lock().unwrap().push(viewport);
        Ok(())
    }

    fn create_surface_texture(&self, _texture: GlTextureId) -> Result<Arc<dyn SurfaceTexture>, GlError> {
        let texture = Arc::new(FakeSurfaceTexture {
            window: NativeWindow(0x5000 + self.next() as usize),
            log: Arc::clone(&self.log),
            callback: Mutex::new(None),
            default_size: Mutex::new(None),
            updates: AtomicUsize::new(0),
            timestamp: AtomicU64::new(0),
        });
        self.textures.lock().unwrap().push(Arc::clone(&texture));
        Ok(texture)
    }
}

pub struct FakeSurfaceTexture {
    window: NativeWindow,
    log: Arc<Mutex<Vec<String>>>,
    callback: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    pub default_size: Mutex<Option<Size>>,
    pub updates: AtomicUsize,
    timestamp: AtomicU64,
}

impl FakeSurfaceTexture {
    /// Simulates the camera producing a frame. Returns `false` when no
    /// callback is installed.
    pub fn frame_available(&self) -> bool {
        self.timestamp.fetch_add(33_000_000, Ordering::SeqCst);
        match self.callback.lock().unwrap().as_ref() {
            Some(callback) => {
                callback();
                true
            },
            None => false,
        }
    }
}

impl SurfaceTexture for FakeSurfaceTexture {
    fn update_tex_image(&self) -> Result<(), GlError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn transform_matrix(&self) -> [f32; 16] {
        IDENTITY_MATRIX
    }

    fn timestamp_ns(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }

    fn window(&self) -> NativeWindow {
        self.window
    }

    fn set_default_buffer_size(&self, size: Size) {
        *self.default_size.lock().unwrap() = Some(size);
    }

    fn set_on_frame_available(&self, callback: Option<Box<dyn Fn() + Send + Sync>>) {
        *self.callback.lock().unwrap() = callback;
    }

    fn release(&self) {
        self.log.lock().unwrap().push("release_surface_texture".into());
    }
}

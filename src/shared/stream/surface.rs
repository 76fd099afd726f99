// This is free and unencumbered software released into the public domain.

use super::now_ns_best_effort;
use crate::shared::{
    Buffer, BufferFlags, CameraError, CameraEvent, CameraManager, CameraStream,
    CameraStreamBase, CameraSurfaceRenderer, CodecInputSurface, DisplayInfo, FrameSignal,
    GlError, NativeWindow, OpenGlContext, OpenGlCtxProvider, PixelFormat, PreviewParams, Promise,
    ProviderError, StreamConfig, StreamTargets, TransferHandler, UiThread, VideoFormat,
    gl::SurfaceTexture, notify,
};
use derive_more::Display;
use std::{
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

const HANDOFF_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum CapturePhase {
    #[default]
    #[display("not started")]
    NotStarted,
    /// Waiting for the consumer to hand over the encoder input surface.
    #[display("awaiting encoder surface")]
    AwaitingEncoderSurface,
    #[display("capturing")]
    Capturing,
    #[display("stopped")]
    Stopped,
}

struct Inner {
    ctx_provider: Arc<OpenGlCtxProvider>,
    ui: Arc<dyn UiThread>,
    config: StreamConfig,
    running: AtomicBool,
    phase: Mutex<CapturePhase>,
    handler: RwLock<Option<Arc<dyn TransferHandler>>>,
    encoder_window: Promise<NativeWindow>,
    camera_target: Promise<NativeWindow>,
    texture: Mutex<Option<Arc<dyn SurfaceTexture>>>,
    frame: Arc<FrameSignal>,
    frames_rendered: AtomicU64,
}

impl Inner {
    fn set_phase(&self, phase: CapturePhase) {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner()) = phase;
        tracing::debug!(target: "atalk_camera_module", %phase, "capture phase");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn transfer_handler(&self) -> Option<Arc<dyn TransferHandler>> {
        self.handler.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

struct SurfaceTargets {
    inner: Arc<Inner>,
}

impl StreamTargets for SurfaceTargets {
    fn on_init_preview(&self, params: &PreviewParams) -> Result<Vec<NativeWindow>, CameraError> {
        let timeout = self.inner.config.view_timeout;
        let window = self
            .inner
            .camera_target
            .wait(timeout)
            .ok_or(ProviderError::CreateTimeout(timeout))?;
        if let Some(texture) = self.inner.texture.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            texture.set_default_buffer_size(params.format);
        }
        Ok(vec![window])
    }

    fn on_camera_closed(&self) {}
}

/// GL objects owned by the capture thread.
struct Pipeline {
    preview: Option<Arc<OpenGlContext>>,
    encoder: Option<CodecInputSurface>,
    renderer: Arc<Mutex<CameraSurfaceRenderer>>,
    texture: Option<Arc<dyn SurfaceTexture>>,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            preview: None,
            encoder: None,
            renderer: Arc::default(),
            texture: None,
        }
    }

    fn build(&mut self, inner: &Inner, encoder_window: NativeWindow) -> Result<(), CameraError> {
        let preview = self.preview.insert(inner.ctx_provider.obtain_object()?);
        let gl = inner.ctx_provider.backend();
        let encoder = self
            .encoder
            .insert(CodecInputSurface::new(Arc::clone(gl), encoder_window, preview)?);

        let texture_id = {
            let current = encoder.make_current()?;
            let mut renderer = self.renderer.lock().unwrap_or_else(|p| p.into_inner());
            renderer.surface_created(&current)?;
            renderer.texture_id()?
        };

        let texture = self.texture.insert(gl.create_surface_texture(texture_id)?);
        let frame = Arc::clone(&inner.frame);
        texture.set_on_frame_available(Some(Box::new(move || frame.notify())));
        *inner.texture.lock().unwrap_or_else(|p| p.into_inner()) = Some(Arc::clone(texture));
        inner.camera_target.resolve(texture.window());
        Ok(())
    }

    fn run(&self, inner: &Inner) -> Result<(), CameraError> {
        let (Some(encoder), Some(texture)) = (&self.encoder, &self.texture) else {
            return Err(GlError::NotInitialized.into());
        };

        while inner.is_running() {
            if !inner.frame.wait(inner.config.frame_timeout) {
                if inner.is_running() {
                    tracing::warn!(target: "atalk_camera_module", timeout = ?inner.config.frame_timeout, "no camera frame");
                }
                continue;
            }
            if !inner.is_running() {
                break;
            }
            let started = Instant::now();

            {
                let _current = encoder.make_current()?;
                texture.update_tex_image()?;
            }

            self.paint_preview(inner, texture);

            let elapsed = started.elapsed();
            if elapsed < inner.config.min_frame_interval {
                thread::sleep(inner.config.min_frame_interval - elapsed);
            }

            {
                let current = encoder.make_current()?;
                self.renderer
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .draw_frame(&current, texture.as_ref())?;
                current.set_presentation_time(texture.timestamp_ns())?;
                current.swap_buffers()?;
            }
            inner.frames_rendered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Draws the latched frame into the local preview on the UI thread and
    /// waits for it to finish.
    fn paint_preview(&self, inner: &Inner, texture: &Arc<dyn SurfaceTexture>) {
        let (done_tx, done_rx) = mpsc::sync_channel::<Result<bool, GlError>>(1);
        let provider = Arc::clone(&inner.ctx_provider);
        let renderer = Arc::clone(&self.renderer);
        let texture = Arc::clone(texture);

        inner.ui.run_on_ui(Box::new(move || {
            let paint = || -> Result<bool, GlError> {
                let Some(preview) = provider.try_obtain_object() else {
                    return Ok(false);
                };
                let current = preview.make_current()?;
                renderer
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .draw_frame(&current, texture.as_ref())?;
                current.swap_buffers()?;
                Ok(true)
            };
            let _ = done_tx.send(paint());
        }));

        match done_rx.recv_timeout(inner.config.paint_timeout) {
            Ok(Ok(true)) => {},
            Ok(Ok(false)) => {
                tracing::trace!(target: "atalk_camera_module", "preview surface gone, frame not painted");
            },
            Ok(Err(err)) => {
                tracing::warn!(target: "atalk_camera_module", %err, "preview paint failed");
            },
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(target: "atalk_camera_module", timeout = ?inner.config.paint_timeout, "preview paint timed out");
            },
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!(target: "atalk_camera_module", "preview paint task was dropped");
            },
        }
    }

    /// Releases renderer, texture and encoder context, in that order.
    fn release(&mut self, inner: &Inner) {
        if let Some(encoder) = &self.encoder {
            match encoder.make_current() {
                Ok(current) => self
                    .renderer
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .release(&current),
                Err(err) => {
                    tracing::warn!(target: "atalk_camera_module", %err, "could not release renderer");
                },
            }
        }
        if let Some(texture) = self.texture.take() {
            texture.set_on_frame_available(None);
            texture.release();
        }
        inner.texture.lock().unwrap_or_else(|p| p.into_inner()).take();
        inner.camera_target.take();
        if let Some(encoder) = self.encoder.take() {
            encoder.release();
        }
        self.preview = None;
    }
}

fn capture_loop(inner: Arc<Inner>) -> Result<(), CameraError> {
    inner.set_phase(CapturePhase::AwaitingEncoderSurface);
    let encoder_window = loop {
        if !inner.is_running() {
            inner.set_phase(CapturePhase::Stopped);
            return Ok(());
        }
        if let Some(window) = inner.encoder_window.peek() {
            break window;
        }
        if let Some(handler) = inner.transfer_handler() {
            handler.transfer_data();
        }
        thread::sleep(HANDOFF_POLL_INTERVAL);
    };

    inner.set_phase(CapturePhase::Capturing);
    tracing::info!(target: "atalk_camera_module", %encoder_window, "encoder surface received, capturing");

    let mut pipeline = Pipeline::new();
    let result = pipeline
        .build(&inner, encoder_window)
        .and_then(|()| pipeline.run(&inner));
    pipeline.release(&inner);
    inner.set_phase(CapturePhase::Stopped);

    if let Err(err) = &result {
        tracing::error!(target: "atalk_camera_module", %err, "capture thread failed");
    }
    result
}

/// Camera stream rendering through the GPU into a local preview and an
/// encoder input surface, without copying pixels through the CPU.
///
/// The consumer hands over the encoder surface by passing a buffer holding
/// [`BufferData::Surface`](crate::shared::BufferData::Surface) to
/// [`CameraStream::read`].
pub struct SurfaceStream {
    base: CameraStreamBase,
    inner: Arc<Inner>,
    capture: Option<JoinHandle<Result<(), CameraError>>>,
}

impl core::fmt::Debug for SurfaceStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SurfaceStream")
            .field("base", &self.base)
            .field("phase", &self.phase())
            .field("frames_rendered", &self.frames_rendered())
            .finish()
    }
}

impl SurfaceStream {
    pub fn new(
        manager: Arc<dyn CameraManager>,
        display: Arc<dyn DisplayInfo>,
        config: StreamConfig,
        ctx_provider: Arc<OpenGlCtxProvider>,
        ui: Arc<dyn UiThread>,
    ) -> Self {
        let inner = Arc::new(Inner {
            ctx_provider,
            ui,
            config: config.clone(),
            running: AtomicBool::new(false),
            phase: Mutex::new(CapturePhase::NotStarted),
            handler: RwLock::new(None),
            encoder_window: Promise::new(),
            camera_target: Promise::new(),
            texture: Mutex::new(None),
            frame: Arc::new(FrameSignal::new()),
            frames_rendered: AtomicU64::new(0),
        });
        let targets = Arc::clone(&inner);
        let base = CameraStreamBase::new(manager, display, config, move |_| {
            Arc::new(SurfaceTargets { inner: targets })
        });
        Self {
            base,
            inner,
            capture: None,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        *self.inner.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.inner.frames_rendered.load(Ordering::Relaxed)
    }

    fn stop_capture(&mut self) -> Result<(), CameraError> {
        self.inner.running.store(false, Ordering::Release);
        self.inner.frame.notify();
        let Some(capture) = self.capture.take() else {
            return Ok(());
        };
        let result = match capture.join() {
            Ok(result) => result,
            Err(_) => Err(CameraError::other("capture thread panicked")),
        };
        self.inner.encoder_window.take();
        result
    }
}

impl CameraStream for SurfaceStream {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.capture.is_some() {
            return Ok(());
        }
        self.inner.running.store(true, Ordering::Release);
        let inner = Arc::clone(&self.inner);
        let capture = thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || capture_loop(inner))
            .map_err(|e| CameraError::driver("spawning capture thread", e))?;
        self.capture = Some(capture);

        if let Err(err) = self.base.start() {
            let _ = self.stop_capture();
            return Err(err);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        self.inner.running.store(false, Ordering::Release);
        self.inner.frame.notify();
        let closed = self.base.stop();
        let captured = self.stop_capture();
        self.inner.ctx_provider.release_object();

        if let Err(err) = &captured {
            tracing::error!(target: "atalk_camera_module", %err, "capture thread ended with error");
            notify(
                self.base.events_tx(),
                CameraEvent::Error {
                    backend: self.base.backend(),
                    error: CameraError::other(err.to_string()),
                },
            );
        }
        closed.and(captured)
    }

    fn read(&mut self, buffer: &mut Buffer) -> Result<(), CameraError> {
        let params = self.base.preview_params();
        buffer.flags = BufferFlags::LIVE_DATA | BufferFlags::SYSTEM_TIME;
        buffer.timestamp_ns = now_ns_best_effort();
        buffer.format = Some(VideoFormat {
            pixel_format: PixelFormat::Surface,
            size: params.preview_size,
            fps: self.base.config().fps,
        });

        match buffer.surface() {
            Some(window) => {
                if !self.inner.encoder_window.is_resolved() {
                    self.inner.encoder_window.resolve(window);
                }
            },
            None => buffer.set_discard(true),
        }
        Ok(())
    }

    fn set_transfer_handler(&mut self, handler: Option<Arc<dyn TransferHandler>>) {
        *self.inner.handler.write().unwrap_or_else(|p| p.into_inner()) = handler;
    }

    fn base(&self) -> &CameraStreamBase {
        &self.base
    }
}

impl Drop for SurfaceStream {
    fn drop(&mut self) {
        if self.capture.is_some() {
            let _ = self.stop();
        }
    }
}

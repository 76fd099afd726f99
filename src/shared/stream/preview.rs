// This is free and unencumbered software released into the public domain.

use super::now_ns_best_effort;
use crate::shared::{
    Buffer, BufferData, BufferFlags, CameraBackend, CameraError, CameraEvent, CameraImage,
    CameraManager, CameraStream, CameraStreamBase, DisplayInfo, ImageListener, ImageReceiver,
    NativeWindow, OverflowPolicy, PixelFormat, PreviewParams, PreviewSurfaceProvider, RingBuffer,
    StreamConfig, StreamTargets, TransferHandler, TransformError, VideoFormat, report_drop,
    yuv::yuv420_planar_rotate,
};
use std::{
    sync::{Arc, Condvar, Mutex, RwLock, mpsc::SyncSender},
    time::Duration,
};

type SharedHandler = Arc<RwLock<Option<Arc<dyn TransferHandler>>>>;

/// Images delivered by the camera and not yet read.
struct ImageQueue {
    images: Mutex<RingBuffer<Box<dyn CameraImage>>>,
    available: Condvar,
}

impl ImageQueue {
    fn new(capacity: usize) -> Self {
        Self {
            images: Mutex::new(RingBuffer::new(capacity, OverflowPolicy::OverwriteOldest)),
            available: Condvar::new(),
        }
    }

    /// Returns `true` if an older image had to be dropped.
    fn push(&self, image: Box<dyn CameraImage>) -> bool {
        let evicted = self
            .images
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(image);
        self.available.notify_one();
        // The evicted image goes back to the platform here, outside the lock.
        evicted.is_some()
    }

    fn pop(&self, timeout: Duration) -> Option<Box<dyn CameraImage>> {
        let guard = self.images.lock().unwrap_or_else(|p| p.into_inner());
        let (mut images, _) = self
            .available
            .wait_timeout_while(guard, timeout, |images| images.is_empty())
            .unwrap_or_else(|p| p.into_inner());
        images.pop()
    }

    fn len(&self) -> usize {
        self.images.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn clear(&self) {
        let drained: Vec<_> = {
            let mut images = self.images.lock().unwrap_or_else(|p| p.into_inner());
            core::iter::from_fn(|| images.pop()).collect()
        };
        drop(drained);
    }
}

struct ImageTargets {
    manager: Arc<dyn CameraManager>,
    max_images: usize,
    queue: Arc<ImageQueue>,
    handler: SharedHandler,
    events_tx: SyncSender<CameraEvent>,
    receiver: Mutex<Option<Box<dyn ImageReceiver>>>,
    surface: Option<Arc<PreviewSurfaceProvider>>,
}

impl ImageTargets {
    fn listener(&self) -> ImageListener {
        let queue = Arc::clone(&self.queue);
        let handler = Arc::clone(&self.handler);
        let events_tx = self.events_tx.clone();
        let backend = self.manager.backend();
        Arc::new(move |image: Box<dyn CameraImage>| {
            if queue.push(image) {
                report_drop(&events_tx, backend);
            }
            let handler = handler.read().unwrap_or_else(|p| p.into_inner()).clone();
            if let Some(handler) = handler {
                handler.transfer_data();
            }
        })
    }

    /// Queued images go back to the receiver before it is closed.
    fn close_receiver(&self) {
        self.queue.clear();
        let receiver = self.receiver.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(mut receiver) = receiver {
            receiver.close();
        }
    }
}

impl StreamTargets for ImageTargets {
    fn on_init_preview(&self, params: &PreviewParams) -> Result<Vec<NativeWindow>, CameraError> {
        self.close_receiver();
        let receiver =
            self.manager
                .create_image_receiver(params.format, self.max_images, self.listener())?;
        let mut outputs = vec![receiver.window()];
        *self.receiver.lock().unwrap_or_else(|p| p.into_inner()) = Some(receiver);

        if let Some(surface) = &self.surface {
            let window = match surface.try_obtain_object() {
                Some(window) if surface.is_held() => window,
                _ => surface.obtain_object()?,
            };
            outputs.push(window);
        }
        Ok(outputs)
    }

    fn on_camera_closed(&self) {
        self.close_receiver();
        if let Some(surface) = self.surface.as_ref().filter(|s| s.is_held()) {
            surface.release_object();
            if let Err(err) = surface.wait_for_object_release() {
                tracing::warn!(target: "atalk_camera_module", %err, "preview surface still alive after close");
            }
        }
    }
}

/// Camera stream delivering rotated I420 frames through [`CameraStream::read`].
pub struct PreviewStream {
    base: CameraStreamBase,
    queue: Arc<ImageQueue>,
    handler: SharedHandler,
    sequence: u64,
}

impl core::fmt::Debug for PreviewStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PreviewStream")
            .field("base", &self.base)
            .field("queued", &self.queued())
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl PreviewStream {
    pub fn new(manager: Arc<dyn CameraManager>, display: Arc<dyn DisplayInfo>, config: StreamConfig) -> Self {
        Self::build(manager, display, config, None)
    }

    /// Also renders the camera into a local preview surface.
    pub fn with_preview_surface(
        manager: Arc<dyn CameraManager>,
        display: Arc<dyn DisplayInfo>,
        config: StreamConfig,
        surface: Arc<PreviewSurfaceProvider>,
    ) -> Self {
        Self::build(manager, display, config, Some(surface))
    }

    fn build(
        manager: Arc<dyn CameraManager>,
        display: Arc<dyn DisplayInfo>,
        config: StreamConfig,
        surface: Option<Arc<PreviewSurfaceProvider>>,
    ) -> Self {
        let queue = Arc::new(ImageQueue::new(config.buffer_frames));
        let handler: SharedHandler = Arc::default();
        let max_images = config.max_images;
        let base = CameraStreamBase::new(Arc::clone(&manager), display, config, |events_tx| {
            Arc::new(ImageTargets {
                manager,
                max_images,
                queue: Arc::clone(&queue),
                handler: Arc::clone(&handler),
                events_tx: events_tx.clone(),
                receiver: Mutex::new(None),
                surface,
            })
        });
        Self {
            base,
            queue,
            handler,
            sequence: 0,
        }
    }

    /// Images waiting to be read.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn backend(&self) -> CameraBackend {
        self.base.backend()
    }
}

impl CameraStream for PreviewStream {
    fn start(&mut self) -> Result<(), CameraError> {
        self.base.start()
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        self.base.stop()
    }

    fn read(&mut self, buffer: &mut Buffer) -> Result<(), CameraError> {
        let config = self.base.config();
        let image = self.queue.pop(config.frame_timeout);
        let params = self.base.preview_params();

        self.sequence += 1;
        buffer.sequence = self.sequence;
        buffer.flags = BufferFlags::LIVE_DATA | BufferFlags::SYSTEM_TIME;
        buffer.format = Some(VideoFormat {
            pixel_format: PixelFormat::I420,
            size: params.preview_size,
            fps: config.fps,
        });

        let Some(image) = image else {
            buffer.set_discard(true);
            return Ok(());
        };
        if self.base.in_transition() {
            tracing::trace!(target: "atalk_camera_module", "discarding frame read during reconfiguration");
            buffer.set_discard(true);
            return Ok(());
        }

        buffer.timestamp_ns = now_ns_best_effort();
        let mut bytes = buffer.take_bytes(params.preview_size.yuv420_len());
        let result = transform(image.as_ref(), &mut bytes, &params);
        buffer.data = BufferData::Bytes(bytes);
        if let Err(err) = result {
            tracing::debug!(target: "atalk_camera_module", %err, "discarding frame");
            buffer.set_discard(true);
        }
        Ok(())
    }

    fn set_transfer_handler(&mut self, handler: Option<Arc<dyn TransferHandler>>) {
        *self.handler.write().unwrap_or_else(|p| p.into_inner()) = handler;
    }

    fn base(&self) -> &CameraStreamBase {
        &self.base
    }
}

fn transform(image: &dyn CameraImage, dst: &mut [u8], params: &PreviewParams) -> Result<(), CameraError> {
    if image.size() != params.format {
        return Err(TransformError::ImageSize {
            expected: params.format,
            actual: image.size(),
        }
        .into());
    }
    let planes = image.planes()?;
    let orientation = params.orientation;
    yuv420_planar_rotate(&planes, dst, params.preview_size, orientation.swap, orientation.flip)?;
    Ok(())
}

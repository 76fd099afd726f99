// This is free and unencumbered software released into the public domain.

//! Traits the host platform implements for cameras, image delivery, the
//! display and the UI thread.
//!
//! Asynchronous results (device opened, session configured, device errors)
//! are reported by sending [`DeviceEvent`](super::DeviceEvent)s through the
//! [`DeviceEventSender`] handed to the call. Implementations must never call
//! back into a stream synchronously from these methods.

use super::{
    CameraBackend, CameraError, DeviceEventSender, DisplayState, Facing, Rotation, SensorInfo,
    Size, yuv::YuvPlanes,
};
use derive_more::Display;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

/// Opaque handle of a platform window or surface that frames can be
/// rendered into (an `ANativeWindow*` on Android).
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[display("window:{_0:#x}")]
pub struct NativeWindow(pub usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraCharacteristics {
    pub id: String,
    pub facing: Facing,
    /// Clockwise angle the sensor image must be rotated to be upright on
    /// the device in its natural orientation.
    pub sensor_orientation: u32,
    /// Sizes the camera can deliver as YUV 4:2:0 images.
    pub output_sizes: Vec<Size>,
}

impl CameraCharacteristics {
    pub fn sensor_info(&self) -> SensorInfo {
        SensorInfo {
            sensor_orientation: self.sensor_orientation,
            facing: self.facing,
        }
    }
}

/// Entry point of a camera platform. [`dogma::Named::name`] identifies the
/// platform API in logs and listings.
pub trait CameraManager: dogma::Named + Send + Sync {
    fn backend(&self) -> CameraBackend;

    fn camera_ids(&self) -> Result<Vec<String>, CameraError>;

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError>;

    /// Starts opening `camera_id`. Completion is signalled with
    /// `DeviceEvent::Opened` or `DeviceEvent::OpenFailed`.
    fn open_camera(&self, camera_id: &str, events: DeviceEventSender) -> Result<(), CameraError>;

    /// Creates a receiver that delivers YUV 4:2:0 images of `size` to
    /// `listener`, with at most `max_images` in flight.
    fn create_image_receiver(
        &self,
        size: Size,
        max_images: usize,
        listener: ImageListener,
    ) -> Result<Box<dyn ImageReceiver>, CameraError>;
}

pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Starts configuring a capture session writing into `outputs`.
    /// Completion is signalled with `DeviceEvent::SessionConfigured` or
    /// `DeviceEvent::SessionConfigureFailed`.
    fn create_capture_session(
        &mut self,
        outputs: &[NativeWindow],
        events: DeviceEventSender,
    ) -> Result<(), CameraError>;

    fn close(&mut self);
}

pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, targets: &[NativeWindow]) -> Result<(), CameraError>;

    fn stop_repeating(&mut self) -> Result<(), CameraError>;

    fn close(&mut self);
}

pub trait ImageReceiver: Send {
    /// Window to register as a capture session output.
    fn window(&self) -> NativeWindow;

    fn close(&mut self);
}

/// Called on the platform's image thread for every image that arrives.
pub type ImageListener = Arc<dyn Fn(Box<dyn CameraImage>) + Send + Sync>;

/// One YUV 4:2:0 image. The platform buffer is returned when it is dropped.
pub trait CameraImage: Send {
    fn size(&self) -> Size;

    fn timestamp_ns(&self) -> u64;

    fn planes(&self) -> Result<YuvPlanes<'_>, CameraError>;
}

pub trait DisplayInfo: Send + Sync {
    fn rotation(&self) -> Rotation;

    fn is_landscape(&self) -> bool;

    fn state(&self) -> DisplayState {
        DisplayState {
            rotation: self.rotation(),
            landscape: self.is_landscape(),
        }
    }
}

/// Display whose rotation is set by the host, e.g. from a sensor listener.
#[derive(Debug, Default)]
pub struct FixedDisplay {
    degrees: AtomicU32,
    landscape: AtomicBool,
}

impl FixedDisplay {
    pub fn new(rotation: Rotation, landscape: bool) -> Self {
        Self {
            degrees: AtomicU32::new(rotation.degrees()),
            landscape: AtomicBool::new(landscape),
        }
    }

    /// Portrait-natural device: quarter turns make it landscape.
    pub fn set_rotation(&self, rotation: Rotation) {
        self.degrees.store(rotation.degrees(), Ordering::Release);
        self.landscape
            .store(rotation.degrees() % 180 == 90, Ordering::Release);
    }
}

impl DisplayInfo for FixedDisplay {
    fn rotation(&self) -> Rotation {
        Rotation::from_degrees(self.degrees.load(Ordering::Acquire))
    }

    fn is_landscape(&self) -> bool {
        self.landscape.load(Ordering::Acquire)
    }
}

pub trait UiThread: Send + Sync {
    fn run_on_ui(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs UI tasks on the calling thread, for hosts without a UI loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectUi;

impl UiThread for DirectUi {
    fn run_on_ui(&self, task: Box<dyn FnOnce() + Send>) {
        task()
    }
}

// This is free and unencumbered software released into the public domain.

use super::Size;
use std::time::Duration;

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(2500);
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(2500);
pub const DEFAULT_VIEW_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_FRAME_INTERVAL: Duration = Duration::from_millis(80);

#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Camera to open; the first one reported by the platform when unset.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Capacity of the queue of images waiting for `read`.
    pub buffer_frames: usize,
    /// Images the platform may have in flight at once.
    pub max_images: usize,
    /// How long open and close wait for the camera lock.
    pub open_timeout: Duration,
    /// How long `read` and the capture loop wait for the next frame.
    pub frame_timeout: Duration,
    /// How long view-dependent objects may take to appear or go away.
    pub view_timeout: Duration,
    /// Upper bound on waiting for a preview paint on the UI thread.
    pub paint_timeout: Duration,
    /// Capture loop pacing.
    pub min_frame_interval: Duration,
    pub diagnostics: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            device: None,
            width: 640,
            height: 480,
            fps: 30.0,
            buffer_frames: 4,
            max_images: 5,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            view_timeout: DEFAULT_VIEW_TIMEOUT,
            paint_timeout: DEFAULT_VIEW_TIMEOUT,
            min_frame_interval: DEFAULT_MIN_FRAME_INTERVAL,
            diagnostics: false,
        }
    }
}

impl StreamConfig {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            ..Default::default()
        }
    }

    pub fn desired_size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_buffer_frames(mut self, n: usize) -> Self {
        self.buffer_frames = n.max(1);
        self
    }

    pub fn with_max_images(mut self, n: usize) -> Self {
        self.max_images = n.max(1);
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    pub fn with_view_timeout(mut self, timeout: Duration) -> Self {
        self.view_timeout = timeout;
        self
    }

    pub fn with_paint_timeout(mut self, timeout: Duration) -> Self {
        self.paint_timeout = timeout;
        self
    }

    pub fn with_min_frame_interval(mut self, interval: Duration) -> Self {
        self.min_frame_interval = interval;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }
}

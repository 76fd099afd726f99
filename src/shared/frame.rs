// This is free and unencumbered software released into the public domain.

use super::{
    CameraError, CameraImage, NativeWindow, Size,
    yuv::{Plane, YuvPlanes},
};
use bytes::Bytes;
use derive_more::Display;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed planar YUV 4:2:0: Y, then U, then V, 12 bits per pixel.
    #[display("I420")]
    I420,
    /// Frames are rendered into a platform surface rather than copied.
    #[display("surface")]
    Surface,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoFormat {
    pub pixel_format: PixelFormat,
    pub size: Size,
    pub fps: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    /// The buffer holds no usable frame.
    pub const DISCARD: Self = Self(1 << 1);
    pub const LIVE_DATA: Self = Self(1 << 15);
    /// `timestamp_ns` is wall-clock time rather than a device clock.
    pub const SYSTEM_TIME: Self = Self(1 << 7);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl core::ops::BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BufferData {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// Encoder input surface handed to a surface stream.
    Surface(NativeWindow),
}

/// Unit of the pull contract between a stream and its consumer.
#[derive(Clone, Debug, Default)]
pub struct Buffer {
    pub data: BufferData,
    pub format: Option<VideoFormat>,
    pub timestamp_ns: u64,
    pub sequence: u64,
    pub flags: BufferFlags,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_surface(window: NativeWindow) -> Self {
        Self {
            data: BufferData::Surface(window),
            ..Default::default()
        }
    }

    pub fn is_discarded(&self) -> bool {
        self.flags.contains(BufferFlags::DISCARD)
    }

    pub fn set_discard(&mut self, discard: bool) {
        if discard {
            self.flags.insert(BufferFlags::DISCARD);
        } else {
            self.flags.remove(BufferFlags::DISCARD);
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            BufferData::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn surface(&self) -> Option<NativeWindow> {
        match self.data {
            BufferData::Surface(window) => Some(window),
            _ => None,
        }
    }

    /// Takes the byte storage out of the buffer, resized to exactly `len`.
    /// Any previous allocation is reused.
    pub fn take_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = match core::mem::take(&mut self.data) {
            BufferData::Bytes(bytes) => bytes,
            _ => Vec::with_capacity(len),
        };
        bytes.resize(len, 0);
        bytes
    }
}

#[derive(Clone, Debug)]
struct OwnedPlane {
    data: Bytes,
    row_stride: usize,
    pixel_stride: usize,
}

impl OwnedPlane {
    fn view(&self) -> Plane<'_> {
        Plane::new(&self.data, self.row_stride, self.pixel_stride)
    }
}

/// Camera image with owned planes, produced by software capture backends.
#[derive(Clone, Debug)]
pub struct PlanarImage {
    size: Size,
    timestamp_ns: u64,
    planes: [OwnedPlane; 3],
}

impl PlanarImage {
    /// Wraps one packed I420 frame of `size`.
    pub fn i420(data: impl Into<Bytes>, size: Size, timestamp_ns: u64) -> Result<Self, CameraError> {
        let data = data.into();
        if data.len() != size.yuv420_len() {
            return Err(CameraError::other(format!(
                "I420 frame of {size} needs {} bytes, got {}",
                size.yuv420_len(),
                data.len()
            )));
        }
        let (w, h) = (size.width as usize, size.height as usize);
        let luma = w * h;
        let chroma = (w / 2) * (h / 2);
        let plane = |start: usize, len: usize, row_stride: usize| OwnedPlane {
            data: data.slice(start..start + len),
            row_stride,
            pixel_stride: 1,
        };
        Ok(Self {
            size,
            timestamp_ns,
            planes: [
                plane(0, luma, w),
                plane(luma, chroma, w / 2),
                plane(luma + chroma, chroma, w / 2),
            ],
        })
    }

    /// Builds an image from separate planes given as `(data, row_stride,
    /// pixel_stride)`.
    pub fn from_planes(size: Size, timestamp_ns: u64, planes: [(Bytes, usize, usize); 3]) -> Self {
        let [y, u, v] = planes.map(|(data, row_stride, pixel_stride)| OwnedPlane {
            data,
            row_stride,
            pixel_stride,
        });
        Self {
            size,
            timestamp_ns,
            planes: [y, u, v],
        }
    }

    pub fn luma(&self) -> &[u8] {
        &self.planes[0].data
    }
}

impl CameraImage for PlanarImage {
    fn size(&self) -> Size {
        self.size
    }

    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    fn planes(&self) -> Result<YuvPlanes<'_>, CameraError> {
        let [y, u, v] = &self.planes;
        Ok(YuvPlanes {
            y: y.view(),
            u: u.view(),
            v: v.view(),
        })
    }
}

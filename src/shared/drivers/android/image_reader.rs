// This is free and unencumbered software released into the public domain.

use super::MediaStatus;
use crate::shared::{
    CameraError, CameraImage, ImageListener, ImageReceiver, NativeWindow, Size,
    yuv::{Plane, YuvPlanes},
};
use core::{ffi::c_void, ptr::null_mut};
use ndk_sys::{
    AIMAGE_FORMATS, AImage, AImage_delete, AImage_getHeight, AImage_getPlaneData,
    AImage_getPlanePixelStride, AImage_getPlaneRowStride, AImage_getTimestamp, AImage_getWidth,
    AImageReader, AImageReader_ImageListener, AImageReader_acquireNextImage, AImageReader_delete,
    AImageReader_getWindow, AImageReader_new, AImageReader_setImageListener,
};

struct ListenerContext {
    listener: ImageListener,
    raw: AImageReader_ImageListener,
}

unsafe extern "C" fn on_image_available(context: *mut c_void, reader: *mut AImageReader) {
    let context = unsafe { &*(context as *const ListenerContext) };
    let mut handle = null_mut();
    let status = unsafe { AImageReader_acquireNextImage(reader, &mut handle) };
    if let Err(status) = MediaStatus::check(status) {
        tracing::trace!(target: "atalk_camera_module", %status, "no image acquired");
        return;
    }
    match AndroidImage::wrap(handle) {
        Ok(image) => (context.listener)(Box::new(image)),
        Err(err) => tracing::debug!(target: "atalk_camera_module", %err, "dropping unreadable image"),
    }
}

pub(crate) struct AndroidImageReader {
    handle: *mut AImageReader,
    window: NativeWindow,
    context: Box<ListenerContext>,
}

unsafe impl Send for AndroidImageReader {}

impl AndroidImageReader {
    pub(crate) fn new(size: Size, max_images: usize, listener: ImageListener) -> Result<Self, CameraError> {
        let mut handle = null_mut();
        MediaStatus::check(unsafe {
            AImageReader_new(
                size.width as i32,
                size.height as i32,
                AIMAGE_FORMATS::AIMAGE_FORMAT_YUV_420_888.0 as i32,
                max_images.max(1) as i32,
                &mut handle,
            )
        })
        .map_err(|status| status.into_error("creating the image reader"))?;

        let mut reader = Self {
            handle,
            window: NativeWindow(0),
            context: Box::new(ListenerContext {
                listener,
                raw: AImageReader_ImageListener {
                    context: null_mut(),
                    onImageAvailable: Some(on_image_available),
                },
            }),
        };

        let mut window = null_mut();
        MediaStatus::check(unsafe { AImageReader_getWindow(reader.handle, &mut window) })
            .map_err(|status| status.into_error("getting the image reader window"))?;
        reader.window = NativeWindow(window as usize);

        reader.context.raw.context = (&*reader.context as *const ListenerContext).cast_mut().cast();
        MediaStatus::check(unsafe { AImageReader_setImageListener(reader.handle, &mut reader.context.raw) })
            .map_err(|status| status.into_error("registering the image listener"))?;
        Ok(reader)
    }
}

impl ImageReceiver for AndroidImageReader {
    fn window(&self) -> NativeWindow {
        self.window
    }

    fn close(&mut self) {
        if self.handle.is_null() {
            return;
        }
        unsafe {
            AImageReader_setImageListener(self.handle, null_mut());
            AImageReader_delete(self.handle);
        }
        self.handle = null_mut();
    }
}

impl Drop for AndroidImageReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// One acquired `AImage`, deleted when dropped.
pub(crate) struct AndroidImage {
    handle: *mut AImage,
    size: Size,
    timestamp_ns: u64,
}

unsafe impl Send for AndroidImage {}

impl AndroidImage {
    fn wrap(handle: *mut AImage) -> Result<Self, CameraError> {
        let mut image = Self {
            handle,
            size: Size::default(),
            timestamp_ns: 0,
        };
        let (mut width, mut height, mut timestamp) = (0, 0, 0);
        unsafe {
            MediaStatus::check(AImage_getWidth(handle, &mut width))
                .and_then(|_| MediaStatus::check(AImage_getHeight(handle, &mut height)))
                .map_err(|status| status.into_error("reading the image size"))?;
            // Timestamps are best effort; zero means unknown.
            let _ = AImage_getTimestamp(handle, &mut timestamp);
        }
        image.size = Size::new(width.max(0) as u32, height.max(0) as u32);
        image.timestamp_ns = timestamp.max(0) as u64;
        Ok(image)
    }

    fn plane(&self, index: i32) -> Result<Plane<'_>, CameraError> {
        let (mut data, mut len, mut row_stride, mut pixel_stride) = (null_mut(), 0, 0, 0);
        unsafe {
            MediaStatus::check(AImage_getPlaneData(self.handle, index, &mut data, &mut len))
                .and_then(|_| MediaStatus::check(AImage_getPlaneRowStride(self.handle, index, &mut row_stride)))
                .and_then(|_| {
                    MediaStatus::check(AImage_getPlanePixelStride(self.handle, index, &mut pixel_stride))
                })
                .map_err(|status| status.into_error("reading an image plane"))?;
        }
        if data.is_null() || len <= 0 {
            return Err(CameraError::other(format!("image plane {index} is empty")));
        }
        let data = unsafe { core::slice::from_raw_parts(data.cast_const(), len as usize) };
        Ok(Plane::new(data, row_stride.max(0) as usize, pixel_stride.max(0) as usize))
    }
}

impl CameraImage for AndroidImage {
    fn size(&self) -> Size {
        self.size
    }

    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    fn planes(&self) -> Result<YuvPlanes<'_>, CameraError> {
        Ok(YuvPlanes {
            y: self.plane(0)?,
            u: self.plane(1)?,
            v: self.plane(2)?,
        })
    }
}

impl Drop for AndroidImage {
    fn drop(&mut self) {
        unsafe {
            AImage_delete(self.handle);
        }
        self.handle = null_mut();
    }
}

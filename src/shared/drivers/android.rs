// This is free and unencumbered software released into the public domain.

//! Camera2 NDK backend.

mod camera_device;
use camera_device::*;

mod camera_status;
use camera_status::*;

mod capture_session;
use capture_session::*;

mod image_reader;
use image_reader::*;

mod media_status;
use media_status::*;

mod metadata;
use metadata::*;

use crate::shared::{
    CameraBackend, CameraCharacteristics, CameraError, CameraManager, DeviceEventSender,
    ImageListener, ImageReceiver, Size,
};
use alloc::borrow::Cow;
use core::{ffi::CStr, ptr::null_mut};
use ndk_sys::{
    ACameraManager, ACameraManager_create, ACameraManager_delete,
    ACameraManager_deleteCameraIdList, ACameraManager_getCameraIdList,
    android_get_device_api_level,
};
use scopeguard::defer;

#[link(name = "camera2ndk")]
unsafe extern "C" {}

#[link(name = "mediandk")]
unsafe extern "C" {}

#[derive(Debug)]
pub struct AndroidCameraManager {
    handle: *mut ACameraManager,
    pub api_level: u32,
}

// ACameraManager is thread-safe.
unsafe impl Send for AndroidCameraManager {}
unsafe impl Sync for AndroidCameraManager {}

impl Drop for AndroidCameraManager {
    fn drop(&mut self) {
        unsafe {
            ACameraManager_delete(self.handle);
        }
        self.handle = null_mut();
    }
}

impl AndroidCameraManager {
    pub fn new() -> Result<Self, CameraError> {
        let api_level = unsafe { android_get_device_api_level() }.max(0) as u32;
        let handle = unsafe { ACameraManager_create() };
        if handle.is_null() {
            return Err(CameraError::NoDriver);
        }
        tracing::debug!(target: "atalk_camera_module", api_level, "camera manager created");
        Ok(Self { handle, api_level })
    }
}

impl dogma::Named for AndroidCameraManager {
    fn name(&self) -> Cow<'_, str> {
        "camera2".into()
    }
}

impl CameraManager for AndroidCameraManager {
    fn backend(&self) -> CameraBackend {
        CameraBackend::Android
    }

    fn camera_ids(&self) -> Result<Vec<String>, CameraError> {
        let mut list_ptr = null_mut();
        CameraStatus::check(unsafe { ACameraManager_getCameraIdList(self.handle, &mut list_ptr) })
            .map_err(|status| status.into_error("listing cameras"))?;
        defer! {
            unsafe { ACameraManager_deleteCameraIdList(list_ptr); }
        }

        let list = unsafe { &*list_ptr };
        if list.numCameras < 1 {
            return Ok(Vec::new());
        }
        let ids = unsafe { core::slice::from_raw_parts(list.cameraIds, list.numCameras as usize) };
        Ok(ids
            .iter()
            .filter(|p| !p.is_null())
            .map(|p| unsafe { CStr::from_ptr(*p) }.to_string_lossy().into_owned())
            .collect())
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraCharacteristics, CameraError> {
        Ok(CameraMetadata::query(self.handle, camera_id)?.characteristics(camera_id))
    }

    fn open_camera(&self, camera_id: &str, events: DeviceEventSender) -> Result<(), CameraError> {
        AndroidDevice::open(self.handle, camera_id, events)
    }

    fn create_image_receiver(
        &self,
        size: Size,
        max_images: usize,
        listener: ImageListener,
    ) -> Result<Box<dyn ImageReceiver>, CameraError> {
        Ok(Box::new(AndroidImageReader::new(size, max_images, listener)?))
    }
}

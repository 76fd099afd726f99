// This is free and unencumbered software released into the public domain.

use super::{AndroidSession, CameraStatus};
use crate::shared::{
    CameraDevice, CameraError, CameraFailure, DeviceEvent, DeviceEventSender, NativeWindow,
};
use core::{
    ffi::{c_int, c_void},
    ptr::null_mut,
};
use ndk_sys::{
    ACameraDevice, ACameraDevice_StateCallbacks, ACameraDevice_close, ACameraManager,
    ACameraManager_openCamera, camera_status_t,
};
use std::ffi::CString;

/// Context of the device state callbacks. Boxed so its address stays fixed
/// for as long as the device is open.
struct DeviceCallbacks {
    events: DeviceEventSender,
    raw: ACameraDevice_StateCallbacks,
}

unsafe extern "C" fn on_disconnected(context: *mut c_void, _device: *mut ACameraDevice) {
    let callbacks = unsafe { &*(context as *const DeviceCallbacks) };
    callbacks.events.send(DeviceEvent::Disconnected);
}

unsafe extern "C" fn on_error(context: *mut c_void, _device: *mut ACameraDevice, error: c_int) {
    let callbacks = unsafe { &*(context as *const DeviceCallbacks) };
    callbacks.events.send(DeviceEvent::Error(error));
}

/// Maps a failed `ACameraManager_openCamera` onto the device error codes.
fn open_failure_code(status: camera_status_t) -> i32 {
    match status {
        camera_status_t::ACAMERA_ERROR_CAMERA_IN_USE => CameraFailure::IN_USE,
        camera_status_t::ACAMERA_ERROR_MAX_CAMERA_IN_USE => CameraFailure::MAX_CAMERAS_IN_USE,
        camera_status_t::ACAMERA_ERROR_CAMERA_DISABLED => CameraFailure::DISABLED,
        camera_status_t::ACAMERA_ERROR_CAMERA_DEVICE => CameraFailure::DEVICE,
        camera_status_t::ACAMERA_ERROR_CAMERA_SERVICE => CameraFailure::SERVICE,
        other => other.0,
    }
}

pub(crate) struct AndroidDevice {
    id: String,
    handle: *mut ACameraDevice,
    _callbacks: Box<DeviceCallbacks>,
}

// The NDK device handle may be used from any thread.
unsafe impl Send for AndroidDevice {}

impl AndroidDevice {
    /// Opens `camera_id` and posts `Opened` or `OpenFailed` to `events`.
    pub(crate) fn open(
        manager: *mut ACameraManager,
        camera_id: &str,
        events: DeviceEventSender,
    ) -> Result<(), CameraError> {
        let id = CString::new(camera_id)
            .map_err(|_| CameraError::invalid_config(format!("camera id {camera_id:?}")))?;

        let mut callbacks = Box::new(DeviceCallbacks {
            events: events.clone(),
            raw: ACameraDevice_StateCallbacks {
                context: null_mut(),
                onDisconnected: Some(on_disconnected),
                onError: Some(on_error),
            },
        });
        callbacks.raw.context = (&*callbacks as *const DeviceCallbacks).cast_mut().cast();

        let mut handle = null_mut();
        let status = unsafe {
            ACameraManager_openCamera(manager, id.as_ptr(), &mut callbacks.raw, &mut handle)
        };
        if let Err(status) = CameraStatus::check(status) {
            tracing::warn!(target: "atalk_camera_module", camera = camera_id, %status, "ACameraManager_openCamera failed");
            events.send(DeviceEvent::OpenFailed(open_failure_code(status.0)));
            return Ok(());
        }

        let device = Self {
            id: camera_id.to_string(),
            handle,
            _callbacks: callbacks,
        };
        events.send(DeviceEvent::Opened(Box::new(device)));
        Ok(())
    }
}

impl CameraDevice for AndroidDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: &[NativeWindow],
        events: DeviceEventSender,
    ) -> Result<(), CameraError> {
        if self.handle.is_null() {
            return Err(CameraError::Closed);
        }
        match AndroidSession::create(self.handle, outputs) {
            Ok(session) => {
                events.send(DeviceEvent::SessionConfigured(Box::new(session)));
            },
            Err(status) => {
                tracing::warn!(target: "atalk_camera_module", camera = %self.id, %status, "capture session configuration failed");
                events.send(DeviceEvent::SessionConfigureFailed);
            },
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.handle.is_null() {
            return;
        }
        let status = unsafe { ACameraDevice_close(self.handle) };
        if let Err(status) = CameraStatus::check(status) {
            tracing::debug!(target: "atalk_camera_module", camera = %self.id, %status, "ACameraDevice_close failed");
        }
        self.handle = null_mut();
    }
}

impl Drop for AndroidDevice {
    fn drop(&mut self) {
        self.close();
    }
}

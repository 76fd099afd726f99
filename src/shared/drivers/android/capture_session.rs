// This is free and unencumbered software released into the public domain.

use super::{CameraResult, CameraStatus};
use crate::shared::{CameraError, CaptureSession, NativeWindow};
use core::{ffi::c_void, ptr::null_mut};
use ndk_sys::{
    ACameraCaptureSession, ACameraCaptureSession_close, ACameraCaptureSession_setRepeatingRequest,
    ACameraCaptureSession_stateCallbacks, ACameraCaptureSession_stopRepeating, ACameraDevice,
    ACameraDevice_createCaptureRequest, ACameraDevice_createCaptureSession,
    ACameraDevice_request_template, ACameraOutputTarget, ACameraOutputTarget_create,
    ACameraOutputTarget_free, ACaptureRequest, ACaptureRequest_addTarget, ACaptureRequest_free,
    ACaptureSessionOutput, ACaptureSessionOutputContainer, ACaptureSessionOutputContainer_add,
    ACaptureSessionOutputContainer_create, ACaptureSessionOutputContainer_free,
    ACaptureSessionOutput_create, ACaptureSessionOutput_free, ANativeWindow,
};

unsafe extern "C" fn on_closed(_context: *mut c_void, _session: *mut ACameraCaptureSession) {
    tracing::trace!(target: "atalk_camera_module", "capture session closed");
}

unsafe extern "C" fn on_ready(_context: *mut c_void, _session: *mut ACameraCaptureSession) {
    tracing::trace!(target: "atalk_camera_module", "capture session ready");
}

unsafe extern "C" fn on_active(_context: *mut c_void, _session: *mut ACameraCaptureSession) {
    tracing::trace!(target: "atalk_camera_module", "capture session active");
}

#[inline]
fn window_ptr(window: NativeWindow) -> *mut ANativeWindow {
    window.0 as *mut ANativeWindow
}

/// Repeating preview request and the output targets it writes to.
struct PreviewRequest {
    handle: *mut ACaptureRequest,
    targets: Vec<*mut ACameraOutputTarget>,
}

impl PreviewRequest {
    fn new(device: *mut ACameraDevice, windows: &[NativeWindow]) -> CameraResult<Self> {
        let mut request = Self {
            handle: null_mut(),
            targets: Vec::with_capacity(windows.len()),
        };
        CameraStatus::check(unsafe {
            ACameraDevice_createCaptureRequest(
                device,
                ACameraDevice_request_template::TEMPLATE_PREVIEW,
                &mut request.handle,
            )
        })?;
        for window in windows {
            let mut target = null_mut();
            CameraStatus::check(unsafe { ACameraOutputTarget_create(window_ptr(*window), &mut target) })?;
            request.targets.push(target);
            CameraStatus::check(unsafe { ACaptureRequest_addTarget(request.handle, target) })?;
        }
        Ok(request)
    }
}

impl Drop for PreviewRequest {
    fn drop(&mut self) {
        unsafe {
            for target in self.targets.drain(..) {
                ACameraOutputTarget_free(target);
            }
            if !self.handle.is_null() {
                ACaptureRequest_free(self.handle);
            }
        }
        self.handle = null_mut();
    }
}

/// Output container with one session output per window.
struct SessionOutputs {
    container: *mut ACaptureSessionOutputContainer,
    outputs: Vec<*mut ACaptureSessionOutput>,
}

impl SessionOutputs {
    fn new(windows: &[NativeWindow]) -> CameraResult<Self> {
        let mut result = Self {
            container: null_mut(),
            outputs: Vec::with_capacity(windows.len()),
        };
        CameraStatus::check(unsafe { ACaptureSessionOutputContainer_create(&mut result.container) })?;
        for window in windows {
            let mut output = null_mut();
            CameraStatus::check(unsafe { ACaptureSessionOutput_create(window_ptr(*window), &mut output) })?;
            result.outputs.push(output);
            CameraStatus::check(unsafe { ACaptureSessionOutputContainer_add(result.container, output) })?;
        }
        Ok(result)
    }
}

impl Drop for SessionOutputs {
    fn drop(&mut self) {
        unsafe {
            for output in self.outputs.drain(..) {
                ACaptureSessionOutput_free(output);
            }
            if !self.container.is_null() {
                ACaptureSessionOutputContainer_free(self.container);
            }
        }
        self.container = null_mut();
    }
}

pub(crate) struct AndroidSession {
    device: *mut ACameraDevice,
    handle: *mut ACameraCaptureSession,
    request: Option<PreviewRequest>,
    // Dropped after the session is closed.
    _outputs: SessionOutputs,
    _callbacks: Box<ACameraCaptureSession_stateCallbacks>,
}

unsafe impl Send for AndroidSession {}

impl AndroidSession {
    pub(crate) fn create(device: *mut ACameraDevice, windows: &[NativeWindow]) -> CameraResult<Self> {
        let outputs = SessionOutputs::new(windows)?;
        let callbacks = Box::new(ACameraCaptureSession_stateCallbacks {
            context: null_mut(),
            onClosed: Some(on_closed),
            onReady: Some(on_ready),
            onActive: Some(on_active),
        });
        let mut handle = null_mut();
        CameraStatus::check(unsafe {
            ACameraDevice_createCaptureSession(device, outputs.container, &*callbacks, &mut handle)
        })?;
        Ok(Self {
            device,
            handle,
            request: None,
            _outputs: outputs,
            _callbacks: callbacks,
        })
    }
}

impl CaptureSession for AndroidSession {
    fn set_repeating_request(&mut self, targets: &[NativeWindow]) -> Result<(), CameraError> {
        if self.handle.is_null() {
            return Err(CameraError::Closed);
        }
        let mut request = PreviewRequest::new(self.device, targets)
            .map_err(|status| status.into_error("building the preview request"))?;
        CameraStatus::check(unsafe {
            ACameraCaptureSession_setRepeatingRequest(
                self.handle,
                null_mut(),
                1,
                &mut request.handle,
                null_mut(),
            )
        })
        .map_err(|status| status.into_error("starting the repeating request"))?;
        self.request = Some(request);
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<(), CameraError> {
        if self.handle.is_null() || self.request.is_none() {
            return Ok(());
        }
        CameraStatus::check(unsafe { ACameraCaptureSession_stopRepeating(self.handle) })
            .map_err(|status| status.into_error("stopping the repeating request"))
    }

    fn close(&mut self) {
        if self.handle.is_null() {
            return;
        }
        unsafe {
            ACameraCaptureSession_close(self.handle);
        }
        self.handle = null_mut();
        self.request = None;
    }
}

impl Drop for AndroidSession {
    fn drop(&mut self) {
        self.close();
    }
}

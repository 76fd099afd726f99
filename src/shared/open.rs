// This is free and unencumbered software released into the public domain.

use super::{CameraError, CameraManager, StreamConfig};
use std::sync::Arc;

/// Returns the camera platform compiled into this build.
pub fn open_platform(config: &StreamConfig) -> Result<Arc<dyn CameraManager>, CameraError> {
    let _ = config;
    cfg_if::cfg_if! {
        if #[cfg(all(feature = "android", target_os = "android"))] {
            Ok(Arc::new(super::drivers::android::AndroidCameraManager::new()?))
        } else if #[cfg(feature = "ffmpeg")] {
            Ok(Arc::new(super::drivers::ffmpeg::FfmpegCameraManager::new(config.clone())))
        } else {
            Err(CameraError::NoDriver)
        }
    }
}

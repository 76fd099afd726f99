// This is free and unencumbered software released into the public domain.

use super::CameraStatus;
use crate::shared::{CameraCharacteristics, CameraError, Facing, Size};
use core::{mem::zeroed, ptr::null_mut};
use ndk_sys::{
    ACameraManager, ACameraManager_getCameraCharacteristics, ACameraMetadata,
    ACameraMetadata_const_entry, ACameraMetadata_free, ACameraMetadata_getConstEntry,
    AIMAGE_FORMATS, acamera_metadata_tag,
};
use std::ffi::CString;

const LENS_FACING_FRONT: u8 = 0;
const LENS_FACING_BACK: u8 = 1;

/// Owned `ACameraMetadata` of one camera.
pub(crate) struct CameraMetadata {
    handle: *mut ACameraMetadata,
}

impl Drop for CameraMetadata {
    fn drop(&mut self) {
        unsafe {
            ACameraMetadata_free(self.handle);
        }
        self.handle = null_mut();
    }
}

impl CameraMetadata {
    pub(crate) fn query(manager: *mut ACameraManager, camera_id: &str) -> Result<Self, CameraError> {
        let id = CString::new(camera_id)
            .map_err(|_| CameraError::invalid_config(format!("camera id {camera_id:?}")))?;
        let mut handle = null_mut();
        CameraStatus::check(unsafe {
            ACameraManager_getCameraCharacteristics(manager, id.as_ptr(), &mut handle)
        })
        .map_err(|status| status.into_error("reading camera characteristics"))?;
        Ok(Self { handle })
    }

    fn entry(&self, tag: acamera_metadata_tag) -> Option<ACameraMetadata_const_entry> {
        let mut entry: ACameraMetadata_const_entry = unsafe { zeroed() };
        let status = unsafe { ACameraMetadata_getConstEntry(self.handle, tag.0, &mut entry) };
        (CameraStatus::check(status).is_ok() && entry.count > 0).then_some(entry)
    }

    pub(crate) fn facing(&self) -> Facing {
        let Some(entry) = self.entry(acamera_metadata_tag::ACAMERA_LENS_FACING) else {
            return Facing::External;
        };
        match unsafe { *entry.data.u8_ } {
            LENS_FACING_FRONT => Facing::Front,
            LENS_FACING_BACK => Facing::Back,
            _ => Facing::External,
        }
    }

    pub(crate) fn sensor_orientation(&self) -> u32 {
        self.entry(acamera_metadata_tag::ACAMERA_SENSOR_ORIENTATION)
            .map(|entry| unsafe { *entry.data.i32_ }.rem_euclid(360) as u32)
            .unwrap_or(0)
    }

    /// YUV 4:2:0 output sizes, from `(format, width, height, is_input)`
    /// quadruples.
    pub(crate) fn yuv_output_sizes(&self) -> Vec<Size> {
        let Some(entry) =
            self.entry(acamera_metadata_tag::ACAMERA_SCALER_AVAILABLE_STREAM_CONFIGURATIONS)
        else {
            return Vec::new();
        };
        let values = unsafe { core::slice::from_raw_parts(entry.data.i32_, entry.count as usize) };
        let yuv = AIMAGE_FORMATS::AIMAGE_FORMAT_YUV_420_888.0 as i32;
        let mut sizes: Vec<Size> = Vec::new();
        for config in values.chunks_exact(4) {
            let (format, width, height, is_input) = (config[0], config[1], config[2], config[3]);
            if format != yuv || is_input != 0 || width <= 0 || height <= 0 {
                continue;
            }
            let size = Size::new(width as u32, height as u32);
            if !sizes.contains(&size) {
                sizes.push(size);
            }
        }
        sizes
    }

    pub(crate) fn characteristics(&self, camera_id: &str) -> CameraCharacteristics {
        CameraCharacteristics {
            id: camera_id.to_string(),
            facing: self.facing(),
            sensor_orientation: self.sensor_orientation(),
            output_sizes: self.yuv_output_sizes(),
        }
    }
}

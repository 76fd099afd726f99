// This is free and unencumbered software released into the public domain.

use super::{Facing, Rotation, Size};

/// What the orientation derivation needs to know about the selected camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorInfo {
    /// Clockwise mounting angle of the sensor, in degrees.
    pub sensor_orientation: u32,
    pub facing: Facing,
}

/// Snapshot of the display at the time orientation is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub rotation: Rotation,
    pub landscape: bool,
}

/// Rotation applied to camera frames before they leave the stream.
///
/// `degrees` is the counter-clockwise correction. `swap` means output width
/// and height are the transposed sensor dimensions; `flip` selects the
/// half-turn variant of the remap (see [`crate::shared::yuv`]).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreviewOrientation {
    pub degrees: u32,
    pub swap: bool,
    pub flip: bool,
}

impl PreviewOrientation {
    /// Derives the orientation from sensor mounting, facing and display.
    ///
    /// With `init_format` the result is normalized to an upright image for
    /// the current display rotation. Without it only the raw sensor angle is
    /// used, so a remote peer sees device rotation uncorrected.
    pub fn derive(sensor: SensorInfo, display: DisplayState, init_format: bool) -> Self {
        let sensor_degrees = sensor.sensor_orientation % 360;
        let degrees = if !init_format {
            sensor_degrees
        } else if sensor.facing.is_front() {
            (sensor_degrees + display.rotation.degrees()) % 360
        } else {
            (display.rotation.degrees() + 360 - sensor_degrees) % 360
        };
        Self::from_degrees(degrees, sensor.facing, display.landscape)
    }

    pub fn from_degrees(degrees: u32, facing: Facing, landscape: bool) -> Self {
        let swap = degrees == 90 || degrees == 270;
        let flip = if facing.is_front() {
            degrees == 180 || (landscape && degrees == 270)
        } else {
            degrees == 90 || degrees == 180
        };
        Self {
            degrees,
            swap,
            flip,
        }
    }

    /// Output frame size for frames captured at `format`.
    pub const fn apply(self, format: Size) -> Size {
        if self.swap { format.transposed() } else { format }
    }
}

/// Negotiated geometry of a running stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreviewParams {
    /// Size the camera captures at, in sensor orientation.
    pub format: Size,
    /// Size of frames handed downstream, after rotation.
    pub preview_size: Size,
    pub orientation: PreviewOrientation,
}

impl PreviewParams {
    pub const fn new(format: Size, orientation: PreviewOrientation) -> Self {
        Self {
            format,
            preview_size: orientation.apply(format),
            orientation,
        }
    }
}

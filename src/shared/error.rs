// This is free and unencumbered software released into the public domain.

use super::{Size, gl::ShaderKind};
use std::{error::Error as StdError, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no suitable camera backend available")]
    NoDriver,

    #[error("no camera device available")]
    NoCamera,

    #[error("camera session is not configured")]
    NotConfigured,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("stream closed")]
    Closed,

    /// The open/close lock could not be taken in time.
    #[error("camera {camera} is busy: timed out opening it at {size}")]
    CameraBusy { camera: String, size: Size },

    /// The platform reported a failure while opening or running the camera.
    #[error("camera {camera} failed at {size}: {failure}")]
    Device {
        camera: String,
        size: Size,
        failure: CameraFailure,
    },

    #[error("camera {camera} supports no preview size close to {desired}")]
    NoSuitableSize { camera: String, desired: Size },

    #[error(transparent)]
    Gl(#[from] GlError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("driver error while {context}")]
    DriverError {
        context: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{0}")]
    Other(String),
}

impl CameraError {
    #[inline]
    pub fn driver(context: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::DriverError {
            context,
            source: Box::new(source),
        }
    }

    #[inline]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    #[inline]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[inline]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Reason attached to a failed camera open or a fatal device error.
///
/// The numeric codes are the ones camera platforms report in their device
/// error callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CameraFailure {
    #[error("camera already in use")]
    InUse,

    #[error("too many cameras in use")]
    ResourceLimited,

    #[error("camera disabled by policy")]
    Disabled,

    #[error("fatal camera device error")]
    FatalDevice,

    #[error("fatal camera service error")]
    FatalService,

    #[error("capture session could not be configured")]
    ConfigureFailed,

    #[error("unknown camera error {0}")]
    Unknown(i32),
}

impl CameraFailure {
    pub const IN_USE: i32 = 1;
    pub const MAX_CAMERAS_IN_USE: i32 = 2;
    pub const DISABLED: i32 = 3;
    pub const DEVICE: i32 = 4;
    pub const SERVICE: i32 = 5;

    pub fn from_code(code: i32) -> Self {
        match code {
            Self::IN_USE => Self::InUse,
            Self::MAX_CAMERAS_IN_USE => Self::ResourceLimited,
            Self::DISABLED => Self::Disabled,
            Self::DEVICE => Self::FatalDevice,
            Self::SERVICE => Self::FatalService,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum GlError {
    #[error("EGL initialization failed: {0}")]
    EglInit(String),

    #[error("could not create GL context: {0}")]
    ContextCreation(String),

    #[error("could not create window surface: {0}")]
    SurfaceCreation(String),

    #[error("{kind} shader failed to compile: {log}")]
    ShaderCompile { kind: ShaderKind, log: String },

    #[error("shader program failed to link: {0}")]
    ProgramLink(String),

    #[error("renderer has not been initialized")]
    NotInitialized,

    #[error("GL object was already released")]
    Released,

    #[error("{context}: {message}")]
    Backend {
        context: &'static str,
        message: String,
    },
}

impl GlError {
    pub fn backend(context: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            context,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("view object was not created within {0:?}")]
    CreateTimeout(Duration),

    #[error("view object was not released within {0:?}")]
    ReleaseTimeout(Duration),

    #[error("view object is already held by another consumer")]
    AlreadyHeld,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("output size {0} must be non-empty with even dimensions")]
    Dimensions(Size),

    #[error("output buffer holds {actual} bytes, expected {expected}")]
    OutputLength { expected: usize, actual: usize },

    #[error("{plane} plane too small: needs {needed} bytes, has {actual}")]
    PlaneBounds {
        plane: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("{plane} plane has zero pixel stride")]
    PixelStride { plane: &'static str },

    #[error("image is {actual}, stream expects {expected}")]
    ImageSize { expected: Size, actual: Size },
}

// This is free and unencumbered software released into the public domain.

mod config;
pub use config::*;

mod driver;
pub use driver::*;

pub mod drivers {
    #[cfg(feature = "ffmpeg")]
    pub mod ffmpeg;

    #[cfg(all(feature = "android", target_os = "android"))]
    pub mod android;
}

mod error;
pub use error::*;

mod frame;
pub use frame::*;

mod geometry;
pub use geometry::*;

pub mod gl;
pub use gl::{CameraSurfaceRenderer, CodecInputSurface, CurrentContext, GlBackend, OpenGlContext};

mod open;
pub use open::*;

mod orientation;
pub use orientation::*;

pub mod platform;
pub use platform::{
    CameraCharacteristics, CameraDevice, CameraImage, CameraManager, CaptureSession, DisplayInfo,
    DirectUi, FixedDisplay, ImageListener, ImageReceiver, NativeWindow, UiThread,
};

mod promise;
pub use promise::*;

mod provider;
pub use provider::*;

mod ring;
pub use ring::*;

mod semaphore;
pub use semaphore::*;

mod session;
pub use session::*;

mod stream;
pub use stream::*;

pub mod yuv;

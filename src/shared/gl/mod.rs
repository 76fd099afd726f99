// This is free and unencumbered software released into the public domain.

//! EGL/GLES plumbing for the zero-copy preview path.
//!
//! The platform supplies a [`GlBackend`]; everything above it deals in the
//! opaque handles defined here.

mod context;
pub use context::*;

mod renderer;
pub use renderer::*;

use super::{GlError, NativeWindow, Size};
use derive_more::Display;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[display("ctx#{_0}")]
pub struct GlContextId(pub u64);

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[display("surface#{_0}")]
pub struct GlSurfaceId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlShaderId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlProgramId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlTextureId(pub u32);

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ShaderKind {
    #[display("vertex")]
    Vertex,
    #[display("fragment")]
    Fragment,
}

/// EGL display connection plus the handful of GLES calls the renderer needs.
///
/// Context-bound calls (`draw_*`, shader and texture management) act on the
/// context made current on the calling thread.
pub trait GlBackend: Send + Sync {
    /// Creates a GLES 2 context, sharing objects with `share` if given.
    /// `recordable` requests a config usable with video encoder surfaces.
    fn create_context(&self, share: Option<GlContextId>, recordable: bool) -> Result<GlContextId, GlError>;

    fn create_window_surface(&self, context: GlContextId, window: NativeWindow) -> Result<GlSurfaceId, GlError>;

    fn make_current(&self, context: GlContextId, surface: GlSurfaceId) -> Result<(), GlError>;

    fn release_current(&self);

    fn swap_buffers(&self, surface: GlSurfaceId) -> Result<(), GlError>;

    fn set_presentation_time(&self, surface: GlSurfaceId, timestamp_ns: u64) -> Result<(), GlError>;

    fn surface_size(&self, surface: GlSurfaceId) -> Result<Size, GlError>;

    fn destroy_surface(&self, surface: GlSurfaceId);

    fn destroy_context(&self, context: GlContextId);

    fn compile_shader(&self, kind: ShaderKind, source: &str) -> Result<GlShaderId, GlError>;

    fn link_program(&self, vertex: GlShaderId, fragment: GlShaderId) -> Result<GlProgramId, GlError>;

    fn delete_shader(&self, shader: GlShaderId);

    fn delete_program(&self, program: GlProgramId);

    fn create_external_texture(&self) -> Result<GlTextureId, GlError>;

    fn delete_texture(&self, texture: GlTextureId);

    /// Draws `texture` over the whole `viewport` with `program`, applying
    /// the texture coordinate transform `st_matrix`.
    fn draw_external_texture(
        &self,
        program: GlProgramId,
        texture: GlTextureId,
        st_matrix: &[f32; 16],
        viewport: Size,
    ) -> Result<(), GlError>;

    /// Wraps `texture` in a consumer the camera can render into.
    fn create_surface_texture(&self, texture: GlTextureId) -> Result<Arc<dyn SurfaceTexture>, GlError>;
}

/// Camera-fed external texture.
pub trait SurfaceTexture: Send + Sync {
    /// Latches the most recent frame into the texture. Needs a current
    /// context of the texture's share group.
    fn update_tex_image(&self) -> Result<(), GlError>;

    fn transform_matrix(&self) -> [f32; 16];

    /// Timestamp of the latched frame.
    fn timestamp_ns(&self) -> u64;

    /// Producer side, used as a capture session target.
    fn window(&self) -> NativeWindow;

    fn set_default_buffer_size(&self, size: Size);

    /// Installs the callback run on an arbitrary thread for every new frame.
    fn set_on_frame_available(&self, callback: Option<Box<dyn Fn() + Send + Sync>>);

    fn release(&self);
}

pub const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

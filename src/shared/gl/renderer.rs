// This is free and unencumbered software released into the public domain.

use super::{CurrentContext, GlProgramId, GlTextureId, ShaderKind, SurfaceTexture};
use crate::shared::GlError;

pub const VERTEX_SHADER: &str = "\
uniform mat4 uMVPMatrix;
uniform mat4 uSTMatrix;
attribute vec4 aPosition;
attribute vec4 aTextureCoord;
varying vec2 vTextureCoord;
void main() {
    gl_Position = uMVPMatrix * aPosition;
    vTextureCoord = (uSTMatrix * aTextureCoord).xy;
}
";

pub const FRAGMENT_SHADER: &str = "\
#extension GL_OES_EGL_image_external : require
precision mediump float;
varying vec2 vTextureCoord;
uniform samplerExternalOES sTexture;
void main() {
    gl_FragColor = texture2D(sTexture, vTextureCoord);
}
";

/// Draws the camera's external texture unchanged onto the current surface.
#[derive(Debug, Default)]
pub struct CameraSurfaceRenderer {
    program: Option<GlProgramId>,
    texture: Option<GlTextureId>,
}

impl CameraSurfaceRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the shader program and the external texture.
    pub fn surface_created(&mut self, current: &CurrentContext<'_>) -> Result<(), GlError> {
        let gl = current.backend();
        if self.program.is_some() {
            return Ok(());
        }

        let vertex = gl.compile_shader(ShaderKind::Vertex, VERTEX_SHADER)?;
        let fragment = match gl.compile_shader(ShaderKind::Fragment, FRAGMENT_SHADER) {
            Ok(fragment) => fragment,
            Err(err) => {
                gl.delete_shader(vertex);
                return Err(err);
            },
        };
        let program = gl.link_program(vertex, fragment);
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);
        let program = program?;

        let texture = match gl.create_external_texture() {
            Ok(texture) => texture,
            Err(err) => {
                gl.delete_program(program);
                return Err(err);
            },
        };

        self.program = Some(program);
        self.texture = Some(texture);
        Ok(())
    }

    pub fn texture_id(&self) -> Result<GlTextureId, GlError> {
        self.texture.ok_or(GlError::NotInitialized)
    }

    /// Draws the latched frame of `texture` over the whole current surface.
    pub fn draw_frame(&self, current: &CurrentContext<'_>, texture: &dyn SurfaceTexture) -> Result<(), GlError> {
        let (Some(program), Some(texture_id)) = (self.program, self.texture) else {
            return Err(GlError::NotInitialized);
        };
        let viewport = current.surface_size()?;
        current
            .backend()
            .draw_external_texture(program, texture_id, &texture.transform_matrix(), viewport)
    }

    pub fn release(&mut self, current: &CurrentContext<'_>) {
        let gl = current.backend();
        if let Some(program) = self.program.take() {
            gl.delete_program(program);
        }
        if let Some(texture) = self.texture.take() {
            gl.delete_texture(texture);
        }
    }
}

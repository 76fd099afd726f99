// This is free and unencumbered software released into the public domain.

use super::{GlBackend, GlContextId, GlSurfaceId};
use crate::shared::{GlError, NativeWindow, Size};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};

/// Serializes `make_current` across all contexts of one share group.
type ContextLock = Arc<Mutex<()>>;

/// One EGL context bound to one window surface.
///
/// The context and surface are destroyed exactly once, by [`release`] or on
/// drop, whichever comes first.
///
/// [`release`]: OpenGlContext::release
pub struct OpenGlContext {
    backend: Arc<dyn GlBackend>,
    context: GlContextId,
    surface: GlSurfaceId,
    window: NativeWindow,
    lock: ContextLock,
    released: AtomicBool,
}

impl core::fmt::Debug for OpenGlContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpenGlContext")
            .field("context", &self.context)
            .field("surface", &self.surface)
            .field("window", &self.window)
            .field("released", &self.is_released())
            .finish()
    }
}

impl OpenGlContext {
    /// Creates a context rendering into `window`, in the share group of
    /// `share` when given.
    pub fn new(
        backend: Arc<dyn GlBackend>,
        recordable: bool,
        window: NativeWindow,
        share: Option<&OpenGlContext>,
    ) -> Result<Self, GlError> {
        if share.is_some_and(OpenGlContext::is_released) {
            return Err(GlError::Released);
        }
        let context = backend.create_context(share.map(|s| s.context), recordable)?;
        let surface = match backend.create_window_surface(context, window) {
            Ok(surface) => surface,
            Err(err) => {
                backend.destroy_context(context);
                return Err(err);
            },
        };
        tracing::debug!(target: "atalk_camera_module", %context, %surface, %window, recordable, "created GL context");

        Ok(Self {
            backend,
            context,
            surface,
            window,
            lock: share.map(|s| Arc::clone(&s.lock)).unwrap_or_default(),
            released: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> GlContextId {
        self.context
    }

    pub fn window(&self) -> NativeWindow {
        self.window
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn shares_group_with(&self, other: &OpenGlContext) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Makes this context current on the calling thread.
    ///
    /// Blocks while another context of the share group is current anywhere.
    /// The context stays current until the returned token is dropped.
    pub fn make_current(&self) -> Result<CurrentContext<'_>, GlError> {
        let guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.is_released() {
            return Err(GlError::Released);
        }
        self.backend.make_current(self.context, self.surface)?;
        Ok(CurrentContext {
            context: self,
            _guard: guard,
        })
    }

    /// Destroys the surface and context. Returns `false` if already done.
    ///
    /// Must not be called while this thread holds a [`CurrentContext`] of
    /// the same share group.
    pub fn release(&self) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.backend.destroy_surface(self.surface);
        self.backend.destroy_context(self.context);
        tracing::debug!(target: "atalk_camera_module", context = %self.context, "released GL context");
        true
    }
}

impl Drop for OpenGlContext {
    fn drop(&mut self) {
        self.release();
    }
}

/// Proof that an [`OpenGlContext`] is current on this thread.
///
/// Drawing APIs take a `&CurrentContext` so they cannot run without one.
pub struct CurrentContext<'a> {
    context: &'a OpenGlContext,
    _guard: MutexGuard<'a, ()>,
}

impl core::fmt::Debug for CurrentContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("CurrentContext").field(&self.context.context).finish()
    }
}

impl<'a> CurrentContext<'a> {
    pub fn context(&self) -> &'a OpenGlContext {
        self.context
    }

    pub fn surface_size(&self) -> Result<Size, GlError> {
        self.context.backend.surface_size(self.context.surface)
    }

    pub fn set_presentation_time(&self, timestamp_ns: u64) -> Result<(), GlError> {
        self.context
            .backend
            .set_presentation_time(self.context.surface, timestamp_ns)
    }

    pub fn swap_buffers(&self) -> Result<(), GlError> {
        self.context.backend.swap_buffers(self.context.surface)
    }

    pub(crate) fn backend(&self) -> &dyn GlBackend {
        self.context.backend.as_ref()
    }
}

impl Drop for CurrentContext<'_> {
    fn drop(&mut self) {
        self.context.backend.release_current();
    }
}

/// Recordable context drawing into a video encoder's input surface.
#[derive(Debug)]
pub struct CodecInputSurface {
    context: OpenGlContext,
}

impl CodecInputSurface {
    /// `share` is the preview context whose external texture is drawn.
    pub fn new(
        backend: Arc<dyn GlBackend>,
        encoder_window: NativeWindow,
        share: &OpenGlContext,
    ) -> Result<Self, GlError> {
        Ok(Self {
            context: OpenGlContext::new(backend, true, encoder_window, Some(share))?,
        })
    }

    pub fn make_current(&self) -> Result<CurrentContext<'_>, GlError> {
        self.context.make_current()
    }

    pub fn context(&self) -> &OpenGlContext {
        &self.context
    }

    pub fn release(&self) -> bool {
        self.context.release()
    }
}

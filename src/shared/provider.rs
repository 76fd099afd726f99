// This is free and unencumbered software released into the public domain.

use super::{
    DEFAULT_VIEW_TIMEOUT, GlBackend, GlError, NativeWindow, OpenGlContext, Promise, ProviderError,
    Size, UiThread,
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// UI-side owner of the view an object comes from.
///
/// All methods are invoked on the UI thread.
pub trait ViewHost: Send + Sync {
    /// Creates and attaches the view unless it already exists.
    fn ensure_view(&self);

    /// Lets go of the view's object, e.g. by hiding the view.
    fn release_view(&self);

    /// Detaches the view from its container.
    fn remove_view(&self);
}

/// Blocking access to an object that only exists while some view does.
///
/// The view reports the object through [`on_object_created`] and
/// [`on_object_destroyed`]; a non-UI thread waits for it with
/// [`obtain_object`]. At most one consumer holds the object at a time.
///
/// [`on_object_created`]: ViewDependentProvider::on_object_created
/// [`on_object_destroyed`]: ViewDependentProvider::on_object_destroyed
/// [`obtain_object`]: ViewDependentProvider::obtain_object
pub struct ViewDependentProvider<T> {
    host: Arc<dyn ViewHost>,
    ui: Arc<dyn UiThread>,
    object: Promise<T>,
    held: AtomicBool,
    timeout: Duration,
}

impl<T> core::fmt::Debug for ViewDependentProvider<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewDependentProvider")
            .field("available", &self.object.is_resolved())
            .field("held", &self.held.load(Ordering::Relaxed))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<T: Clone + Send + 'static> ViewDependentProvider<T> {
    pub fn new(host: Arc<dyn ViewHost>, ui: Arc<dyn UiThread>) -> Self {
        Self::with_timeout(host, ui, DEFAULT_VIEW_TIMEOUT)
    }

    pub fn with_timeout(host: Arc<dyn ViewHost>, ui: Arc<dyn UiThread>, timeout: Duration) -> Self {
        Self {
            host,
            ui,
            object: Promise::new(),
            held: AtomicBool::new(false),
            timeout,
        }
    }

    /// Makes sure the view exists and waits for its object.
    pub fn obtain_object(&self) -> Result<T, ProviderError> {
        if self.held.swap(true, Ordering::AcqRel) {
            return Err(ProviderError::AlreadyHeld);
        }

        let host = Arc::clone(&self.host);
        self.ui.run_on_ui(Box::new(move || host.ensure_view()));

        match self.object.wait(self.timeout) {
            Some(object) => Ok(object),
            None => {
                self.held.store(false, Ordering::Release);
                tracing::error!(target: "atalk_camera_module", timeout = ?self.timeout, "view object was not created in time");
                Err(ProviderError::CreateTimeout(self.timeout))
            },
        }
    }

    /// The current object, if any, without waiting or taking ownership.
    pub fn try_obtain_object(&self) -> Option<T> {
        self.object.peek()
    }

    /// Gives the object back and asks the view to let go of it.
    pub fn release_object(&self) {
        if !self.held.swap(false, Ordering::AcqRel) {
            return;
        }
        let host = Arc::clone(&self.host);
        self.ui.run_on_ui(Box::new(move || host.release_view()));
    }

    /// Waits until the view has destroyed its object, then removes the view.
    pub fn wait_for_object_release(&self) -> Result<(), ProviderError> {
        if !self.object.wait_empty(self.timeout) {
            tracing::warn!(target: "atalk_camera_module", timeout = ?self.timeout, "view object was not released in time");
            return Err(ProviderError::ReleaseTimeout(self.timeout));
        }
        let host = Arc::clone(&self.host);
        self.ui.run_on_ui(Box::new(move || host.remove_view()));
        Ok(())
    }

    pub fn on_object_created(&self, object: T) {
        self.object.resolve(object);
    }

    pub fn on_object_destroyed(&self) -> Option<T> {
        self.object.take()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Provides the native window of the local preview surface view.
pub type PreviewSurfaceProvider = ViewDependentProvider<NativeWindow>;

/// Provides the GL context of the local preview texture view.
///
/// The host forwards the texture view's surface callbacks here; a context
/// is created when the surface appears and released when it goes away.
pub struct OpenGlCtxProvider {
    backend: Arc<dyn GlBackend>,
    provider: ViewDependentProvider<Arc<OpenGlContext>>,
    size: Mutex<Size>,
}

impl core::fmt::Debug for OpenGlCtxProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpenGlCtxProvider")
            .field("provider", &self.provider)
            .field("size", &self.surface_size())
            .finish()
    }
}

impl OpenGlCtxProvider {
    pub fn new(backend: Arc<dyn GlBackend>, host: Arc<dyn ViewHost>, ui: Arc<dyn UiThread>) -> Self {
        Self::with_timeout(backend, host, ui, DEFAULT_VIEW_TIMEOUT)
    }

    pub fn with_timeout(
        backend: Arc<dyn GlBackend>,
        host: Arc<dyn ViewHost>,
        ui: Arc<dyn UiThread>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            provider: ViewDependentProvider::with_timeout(host, ui, timeout),
            size: Mutex::new(Size::default()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn GlBackend> {
        &self.backend
    }

    pub fn obtain_object(&self) -> Result<Arc<OpenGlContext>, ProviderError> {
        self.provider.obtain_object()
    }

    pub fn try_obtain_object(&self) -> Option<Arc<OpenGlContext>> {
        self.provider.try_obtain_object()
    }

    pub fn release_object(&self) {
        self.provider.release_object()
    }

    pub fn wait_for_object_release(&self) -> Result<(), ProviderError> {
        self.provider.wait_for_object_release()
    }

    pub fn surface_size(&self) -> Size {
        *self.size.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn on_surface_texture_available(&self, window: NativeWindow, size: Size) -> Result<(), GlError> {
        let context = OpenGlContext::new(Arc::clone(&self.backend), false, window, None)?;
        *self.size.lock().unwrap_or_else(|p| p.into_inner()) = size;
        self.provider.on_object_created(Arc::new(context));
        Ok(())
    }

    pub fn on_surface_texture_size_changed(&self, size: Size) {
        tracing::debug!(target: "atalk_camera_module", %size, "preview surface resized");
        *self.size.lock().unwrap_or_else(|p| p.into_inner()) = size;
    }

    /// Releases the preview context. Returns `true` so the host may free
    /// the surface itself.
    pub fn on_surface_texture_destroyed(&self) -> bool {
        if let Some(context) = self.provider.on_object_destroyed() {
            context.release();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::DirectUi;
    use std::{sync::atomic::AtomicUsize, thread};

    #[derive(Default)]
    struct CountingHost {
        ensured: AtomicUsize,
        released: AtomicUsize,
        removed: AtomicUsize,
    }

    impl ViewHost for CountingHost {
        fn ensure_view(&self) {
            self.ensured.fetch_add(1, Ordering::SeqCst);
        }
        fn release_view(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
        fn remove_view(&self) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn provider(timeout: Duration) -> (Arc<CountingHost>, Arc<PreviewSurfaceProvider>) {
        let host = Arc::new(CountingHost::default());
        let provider = ViewDependentProvider::with_timeout(host.clone(), Arc::new(DirectUi), timeout);
        (host, Arc::new(provider))
    }

    #[test]
    fn obtain_waits_for_creation() {
        let (host, provider) = provider(Duration::from_secs(5));
        let creator = {
            let provider = Arc::clone(&provider);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                provider.on_object_created(NativeWindow(7));
            })
        };
        assert_eq!(provider.obtain_object(), Ok(NativeWindow(7)));
        creator.join().unwrap();
        assert_eq!(host.ensured.load(Ordering::SeqCst), 1);
        assert!(provider.is_held());
    }

    #[test]
    fn obtain_times_out() {
        let (_, provider) = provider(Duration::from_millis(30));
        assert_eq!(
            provider.obtain_object(),
            Err(ProviderError::CreateTimeout(Duration::from_millis(30)))
        );
        assert!(!provider.is_held());
    }

    #[test]
    fn single_holder_until_release() {
        let (host, provider) = provider(Duration::from_millis(30));
        provider.on_object_created(NativeWindow(1));
        assert!(provider.obtain_object().is_ok());
        assert_eq!(provider.obtain_object(), Err(ProviderError::AlreadyHeld));
        provider.release_object();
        provider.release_object();
        assert_eq!(host.released.load(Ordering::SeqCst), 1);
        assert_eq!(provider.obtain_object(), Ok(NativeWindow(1)));
    }

    #[test]
    fn try_obtain_never_blocks() {
        let (_, provider) = provider(Duration::from_secs(5));
        assert_eq!(provider.try_obtain_object(), None);
        provider.on_object_created(NativeWindow(3));
        assert_eq!(provider.try_obtain_object(), Some(NativeWindow(3)));
        assert!(!provider.is_held());
    }

    #[test]
    fn release_wait_removes_view_after_destroy() {
        let (host, provider) = provider(Duration::from_millis(30));
        provider.on_object_created(NativeWindow(1));
        assert_eq!(
            provider.wait_for_object_release(),
            Err(ProviderError::ReleaseTimeout(Duration::from_millis(30)))
        );
        assert_eq!(host.removed.load(Ordering::SeqCst), 0);
        assert_eq!(provider.on_object_destroyed(), Some(NativeWindow(1)));
        assert_eq!(provider.wait_for_object_release(), Ok(()));
        assert_eq!(host.removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_reports_holder() {
        let (_, provider) = provider(Duration::from_millis(30));
        provider.on_object_created(NativeWindow(2));
        assert!(format!("{provider:?}").contains("held: false"));
        assert!(provider.obtain_object().is_ok());
        let debug = format!("{provider:?}");
        assert!(debug.contains("available: true"), "{debug}");
        assert!(debug.contains("held: true"), "{debug}");
    }
}

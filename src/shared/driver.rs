// This is free and unencumbered software released into the public domain.

use crate::shared::{Buffer, CameraError, CameraStreamBase, DeviceEvent, DeviceEventSender, Size};
use derive_more::Display;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError, SyncSender, TrySendError},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum CameraBackend {
    #[display("android")]
    Android,
    #[display("ffmpeg")]
    Ffmpeg,
    /// Supplied by the embedding application.
    #[display("host")]
    Host,
}

/// User-facing notifications. Logging is separate and more detailed.
#[derive(Debug)]
pub enum CameraEvent {
    Opened {
        backend: CameraBackend,
        camera: String,
        size: Size,
    },
    Configured {
        backend: CameraBackend,
        camera: String,
    },
    FrameDropped {
        backend: CameraBackend,
    },
    Error {
        backend: CameraBackend,
        error: CameraError,
    },
    Closed {
        backend: CameraBackend,
        camera: String,
    },
}

pub(crate) fn notify(events_tx: &SyncSender<CameraEvent>, event: CameraEvent) {
    match events_tx.try_send(event) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {},
        Err(TrySendError::Full(event)) => {
            tracing::debug!(target: "atalk_camera_module", ?event, "event queue full, notification lost");
        },
    }
}

pub(crate) fn report_drop(events_tx: &SyncSender<CameraEvent>, backend: CameraBackend) {
    notify(events_tx, CameraEvent::FrameDropped { backend });
}

/// Background thread that serializes platform [`DeviceEvent`]s.
pub struct EventLoop {
    tx: mpsc::Sender<DeviceEvent>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventLoop")
            .field("stopped", &self.stop.load(Ordering::Relaxed))
            .finish()
    }
}

impl EventLoop {
    pub fn spawn(
        name: impl Into<String>,
        mut handler: impl FnMut(DeviceEvent) + Send + 'static,
    ) -> Result<Self, CameraError> {
        let (tx, rx) = mpsc::channel::<DeviceEvent>();
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);

        let join = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                while !stop2.load(Ordering::Relaxed) {
                    match rx.recv_timeout(Duration::from_millis(200)) {
                        Ok(DeviceEvent::Shutdown) => break,
                        Ok(event) => handler(event),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| CameraError::driver("spawning camera event thread", e))?;

        Ok(Self {
            tx,
            stop,
            join: Some(join),
        })
    }

    pub fn sender(&self) -> DeviceEventSender {
        DeviceEventSender::new(self.tx.clone())
    }

    /// Stops the loop. Events still queued are dropped with their payloads.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.tx.send(DeviceEvent::Shutdown);
        if let Some(join) = self.join.take() {
            if join.thread().id() == thread::current().id() {
                return;
            }
            if join.join().is_err() {
                tracing::error!(target: "atalk_camera_module", "camera event thread panicked");
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Told when a stream has data for its consumer to `read`.
pub trait TransferHandler: Send + Sync {
    fn transfer_data(&self);
}

impl<F: Fn() + Send + Sync> TransferHandler for F {
    fn transfer_data(&self) {
        self()
    }
}

/// Pull-based video source.
pub trait CameraStream: Send {
    fn start(&mut self) -> Result<(), CameraError>;

    fn stop(&mut self) -> Result<(), CameraError>;

    /// Fills `buffer` with the next frame or marks it discarded. Never
    /// blocks longer than the configured frame timeout.
    fn read(&mut self, buffer: &mut Buffer) -> Result<(), CameraError>;

    fn set_transfer_handler(&mut self, handler: Option<Arc<dyn TransferHandler>>);

    fn base(&self) -> &CameraStreamBase;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn event_loop_delivers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let mut event_loop = EventLoop::spawn("test-events", move |event: DeviceEvent| {
            seen2.lock().unwrap().push(event.kind());
        })
        .unwrap();

        let sender = event_loop.sender();
        assert!(sender.send(DeviceEvent::OpenFailed(1)));
        assert!(sender.send(DeviceEvent::Closed));
        thread::sleep(Duration::from_millis(100));
        event_loop.stop();

        use crate::shared::DeviceEventKind as E;
        assert_eq!(*seen.lock().unwrap(), vec![E::OpenFailed(1), E::Closed]);
        assert!(!sender.send(DeviceEvent::Closed));
    }

    #[test]
    fn closures_are_transfer_handlers() {
        let hits = Arc::new(AtomicBool::new(false));
        let hits2 = Arc::clone(&hits);
        let handler: Arc<dyn TransferHandler> = Arc::new(move || hits2.store(true, Ordering::SeqCst));
        handler.transfer_data();
        assert!(hits.load(Ordering::SeqCst));
    }
}

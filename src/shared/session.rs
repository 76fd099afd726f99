// This is free and unencumbered software released into the public domain.

use super::{CameraDevice, CameraFailure, CaptureSession};
use derive_more::Display;
use std::sync::mpsc::Sender;

/// Lifecycle of the camera owned by a stream.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum CameraState {
    #[default]
    #[display("idle")]
    Idle,
    #[display("opening")]
    Opening,
    #[display("created")]
    Created,
    #[display("configured")]
    Configured,
    #[display("configure failed")]
    ConfigureFailed,
    #[display("create failed: {_0}")]
    CreateFailed(CameraFailure),
    #[display("fatal error: {_0}")]
    FatalError(CameraFailure),
    #[display("released")]
    Released,
}

impl CameraState {
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::ConfigureFailed | Self::CreateFailed(_) | Self::FatalError(_)
        )
    }

    /// States from which a new open may begin.
    pub const fn can_open(self) -> bool {
        matches!(self, Self::Idle | Self::Released) || self.is_failure()
    }

    pub const fn failure(self) -> Option<CameraFailure> {
        match self {
            Self::ConfigureFailed => Some(CameraFailure::ConfigureFailed),
            Self::CreateFailed(failure) | Self::FatalError(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Asynchronous notification from the platform camera stack.
pub enum DeviceEvent {
    Opened(Box<dyn CameraDevice>),
    OpenFailed(i32),
    SessionConfigured(Box<dyn CaptureSession>),
    SessionConfigureFailed,
    Disconnected,
    Error(i32),
    Closed,
    /// Stops the event loop. Never sent by platforms.
    Shutdown,
}

impl DeviceEvent {
    pub fn kind(&self) -> DeviceEventKind {
        match self {
            Self::Opened(_) => DeviceEventKind::Opened,
            Self::OpenFailed(code) => DeviceEventKind::OpenFailed(*code),
            Self::SessionConfigured(_) => DeviceEventKind::SessionConfigured,
            Self::SessionConfigureFailed => DeviceEventKind::SessionConfigureFailed,
            Self::Disconnected => DeviceEventKind::Disconnected,
            Self::Error(code) => DeviceEventKind::Error(*code),
            Self::Closed => DeviceEventKind::Closed,
            Self::Shutdown => DeviceEventKind::Shutdown,
        }
    }
}

impl core::fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Opened(device) => f.debug_tuple("Opened").field(&device.id()).finish(),
            Self::SessionConfigured(_) => f.write_str("SessionConfigured"),
            other => core::fmt::Debug::fmt(&other.kind(), f),
        }
    }
}

/// [`DeviceEvent`] without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceEventKind {
    Opened,
    OpenFailed(i32),
    SessionConfigured,
    SessionConfigureFailed,
    Disconnected,
    Error(i32),
    Closed,
    Shutdown,
}

/// Handle platforms use to post [`DeviceEvent`]s to a stream's event loop.
#[derive(Clone, Debug)]
pub struct DeviceEventSender {
    tx: Sender<DeviceEvent>,
}

impl DeviceEventSender {
    pub fn new(tx: Sender<DeviceEvent>) -> Self {
        Self { tx }
    }

    /// Returns `false` when the event loop is gone. The event is then
    /// dropped, which also releases any device or session it carries.
    pub fn send(&self, event: DeviceEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Transition table of [`CameraState`].
///
/// Returns `None` for events that do not apply to `state`; these are stale
/// callbacks from a previous open and must be ignored.
pub fn next_state(state: CameraState, event: DeviceEventKind) -> Option<CameraState> {
    use CameraState::*;
    use DeviceEventKind as E;

    match (state, event) {
        (_, E::Shutdown) => None,
        (Idle, _) => None,
        (Released, _) => None,

        (Opening, E::Opened) => Some(Created),
        (Opening, E::OpenFailed(code) | E::Error(code)) => {
            Some(CreateFailed(CameraFailure::from_code(code)))
        },
        (Opening, E::Disconnected) => Some(CreateFailed(CameraFailure::FatalDevice)),

        (Created, E::SessionConfigured) => Some(Configured),
        (Created, E::SessionConfigureFailed) => Some(ConfigureFailed),

        (Created | Configured, E::Error(code)) => Some(FatalError(CameraFailure::from_code(code))),
        (Created | Configured, E::Disconnected) => Some(FatalError(CameraFailure::FatalDevice)),

        (_, E::Closed) => Some(Released),
        _ => None,
    }
}

/// Current [`CameraState`] plus the table that moves it forward.
#[derive(Clone, Copy, Debug, Default)]
pub struct CameraStateMachine {
    state: CameraState,
}

impl CameraStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    /// Moves to `Opening`. Fails when a camera is already open or opening.
    pub fn begin_open(&mut self) -> bool {
        if !self.state.can_open() {
            return false;
        }
        self.state = CameraState::Opening;
        true
    }

    pub fn release(&mut self) {
        self.state = CameraState::Released;
    }

    /// Enters a failure state reached outside the platform callbacks, e.g.
    /// when issuing the capture request fails.
    pub fn fail(&mut self, state: CameraState) {
        debug_assert!(state.is_failure());
        self.state = state;
    }

    /// Applies `event`, returning the new state or `None` if it was ignored.
    pub fn apply(&mut self, event: DeviceEventKind) -> Option<CameraState> {
        let next = next_state(self.state, event);
        match next {
            Some(next) => {
                tracing::debug!(target: "atalk_camera_module", from = %self.state, to = %next, ?event, "camera state change");
                self.state = next;
            },
            None => {
                tracing::debug!(target: "atalk_camera_module", state = %self.state, ?event, "ignoring camera event");
            },
        }
        next
    }
}

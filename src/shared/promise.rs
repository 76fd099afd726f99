// This is free and unencumbered software released into the public domain.

use std::{
    sync::{Condvar, Mutex},
    time::Duration,
};

/// Single-slot rendezvous that one side resolves and another side awaits.
///
/// Unlike a oneshot channel the slot can be cleared and resolved again, and
/// waiters can block on either state (resolved or empty).
#[derive(Debug)]
pub struct Promise<T> {
    slot: Mutex<Option<T>>,
    changed: Condvar,
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            changed: Condvar::new(),
        }
    }

    /// Stores `value`, replacing any previous one, and wakes all waiters.
    pub fn resolve(&self, value: T) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        let previous = slot.replace(value);
        self.changed.notify_all();
        previous
    }

    /// Empties the slot and wakes all waiters.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        let previous = slot.take();
        self.changed.notify_all();
        previous
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).is_some()
    }

    /// Blocks until the slot is empty. Returns `false` on timeout.
    pub fn wait_empty(&self, timeout: Duration) -> bool {
        let guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        let (slot, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |slot| slot.is_some())
            .unwrap_or_else(|p| p.into_inner());
        slot.is_none()
    }
}

impl<T: Clone> Promise<T> {
    pub fn peek(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Blocks until a value is present and returns a copy of it.
    pub fn wait(&self, timeout: Duration) -> Option<T> {
        let guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        let (slot, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .unwrap_or_else(|p| p.into_inner());
        slot.clone()
    }
}

/// Lossy "new frame" flag. Several notifications before a wait collapse
/// into one.
#[derive(Debug, Default)]
pub struct FrameSignal {
    available: Mutex<bool>,
    changed: Condvar,
}

impl FrameSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let mut available = self.available.lock().unwrap_or_else(|p| p.into_inner());
        *available = true;
        self.changed.notify_all();
    }

    /// Waits for the flag and clears it. Returns `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.available.lock().unwrap_or_else(|p| p.into_inner());
        let (mut available, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |available| !*available)
            .unwrap_or_else(|p| p.into_inner());
        let fired = *available;
        *available = false;
        fired
    }

    pub fn is_set(&self) -> bool {
        *self.available.lock().unwrap_or_else(|p| p.into_inner())
    }
}

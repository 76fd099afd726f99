// This is free and unencumbered software released into the public domain.

use std::{
    sync::{Condvar, Mutex},
    time::Duration,
};

/// Semaphore with a single permit guarding camera open and close.
///
/// Releasing an already available permit is a no-op, so the permit count
/// stays within `0..=1`.
#[derive(Debug)]
pub struct BinarySemaphore {
    available: Mutex<bool>,
    changed: Condvar,
}

impl Default for BinarySemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl BinarySemaphore {
    pub fn new() -> Self {
        Self {
            available: Mutex::new(true),
            changed: Condvar::new(),
        }
    }

    /// Takes the permit, waiting at most `timeout`. Returns whether it was taken.
    pub fn acquire(&self, timeout: Duration) -> bool {
        let guard = self.available.lock().unwrap_or_else(|p| p.into_inner());
        let (mut available, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |available| !*available)
            .unwrap_or_else(|p| p.into_inner());
        if *available {
            *available = false;
            true
        } else {
            false
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.acquire(Duration::ZERO)
    }

    /// Returns the permit. Returns `false` when it was not taken.
    pub fn release(&self) -> bool {
        let mut available = self.available.lock().unwrap_or_else(|p| p.into_inner());
        if *available {
            return false;
        }
        *available = true;
        self.changed.notify_one();
        true
    }

    pub fn available_permits(&self) -> usize {
        usize::from(*self.available.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

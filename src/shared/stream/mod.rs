// This is free and unencumbered software released into the public domain.

mod base;
pub use base::*;

mod preview;
pub use preview::*;

mod surface;
pub use surface::*;

use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
pub(crate) fn now_ns_best_effort() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

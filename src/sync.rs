//! Synchronization primitives for search control.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared cancellation flag polled cooperatively by a search.
///
/// Wraps `Arc<AtomicBool>`; cloning shares the flag. Stores are release and
/// loads are acquire, so a search safe-point reached after `stop()` returns
/// is guaranteed to observe the flag.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create a new flag (initially not stopped).
    #[must_use]
    pub fn new() -> Self {
        StopFlag(Arc::new(AtomicBool::new(false)))
    }

    /// Check if the flag is set.
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Set the flag.
    #[inline]
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

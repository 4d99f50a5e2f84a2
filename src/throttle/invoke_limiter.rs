use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::TokenBucket;

/// Drops side effects that arrive faster than the configured window.
///
/// Calls that find no permit are discarded, never queued. Callers keep their
/// authoritative state up to date outside the limiter and only route the
/// notification of that state through it.
#[derive(Debug)]
pub struct InvokeLimiter {
    bucket: TokenBucket,
    disposed: AtomicBool,
}

impl InvokeLimiter {
    /// One invocation per `interval`
    pub fn new(interval: Duration) -> Self {
        Self::with_capacity(1, interval)
    }

    pub fn with_capacity(capacity: u32, interval: Duration) -> Self {
        Self {
            bucket: TokenBucket::new(capacity, interval),
            disposed: AtomicBool::new(false),
        }
    }

    /// Run `action` on the calling thread if a permit is available.
    ///
    /// Returns whether the action ran.
    pub fn invoke<F>(&self, action: F) -> bool
    where
        F: FnOnce(),
    {
        if self.is_disposed() || !self.bucket.try_take(1) {
            return false;
        }

        action();
        true
    }

    /// Stop running actions. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

//! Refilling permit counter shared by both throttling disciplines.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A bucket of `capacity` permits that is topped back up to full once
/// `interval` has elapsed since the previous refill.
///
/// Refill is evaluated lazily on access, so an idle bucket costs nothing.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    interval: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, capacity: u32, interval: Duration, now: Instant) {
        if now.duration_since(self.last_refill) >= interval {
            self.tokens = capacity;
            self.last_refill = now;
        }
    }
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(capacity: u32, interval: Duration) -> Self {
        Self {
            capacity,
            interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take `n` permits if at least `n` are available.
    ///
    /// Either all `n` permits are consumed or none are.
    pub fn try_take(&self, n: u32) -> bool {
        let mut state = self.state.lock();
        state.refill(self.capacity, self.interval, Instant::now());

        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Permits currently available
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        state.refill(self.capacity, self.interval, Instant::now());
        state.tokens
    }

    /// Time remaining until the bucket is next refilled
    pub fn time_until_refill(&self) -> Duration {
        let state = self.state.lock();
        let elapsed = Instant::now().duration_since(state.last_refill);
        self.interval.saturating_sub(elapsed)
    }
}

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::TokenBucket;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Per-key admission control.
///
/// Each key gets its own bucket on first use. Buckets are never evicted, so
/// memory grows with the number of distinct keys seen by the process.
#[derive(Debug)]
pub struct AdmissionLimiter<K>
where
    K: Hash + Eq,
{
    capacity: u32,
    window: Duration,
    buckets: DashMap<K, Arc<TokenBucket>>,
}

impl<K> AdmissionLimiter<K>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
{
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: DashMap::new(),
        }
    }

    /// Get or atomically create the bucket for `key`
    pub fn bucket(&self, key: &K) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.value().clone();
        }

        self.buckets
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(key = ?key, capacity = self.capacity, "Creating admission bucket");
                Arc::new(TokenBucket::new(self.capacity, self.window))
            })
            .clone()
    }

    /// Admit or reject one request for `key`
    pub fn check(&self, key: &K) -> Admission {
        let bucket = self.bucket(key);

        if bucket.try_take(1) {
            Admission::Admitted
        } else {
            Admission::Rejected {
                retry_after: bucket.time_until_refill(),
            }
        }
    }

    /// Number of keys that have a bucket
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_after_capacity() {
        let limiter = AdmissionLimiter::new(10, Duration::from_secs(60));

        for _ in 0..10 {
            assert!(limiter.check(&addr(1)).is_admitted());
        }

        match limiter.check(&addr(1)) {
            Admission::Rejected { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(60))
            }
            Admission::Admitted => panic!("11th request should be rejected"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_availability() {
        let limiter = AdmissionLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check(&addr(1)).is_admitted());
        assert!(limiter.check(&addr(1)).is_admitted());
        assert!(!limiter.check(&addr(1)).is_admitted());

        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(limiter.bucket(&addr(1)).available(), 2);
        assert!(limiter.check(&addr(1)).is_admitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = AdmissionLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check(&addr(1)).is_admitted());
        assert!(!limiter.check(&addr(1)).is_admitted());
        assert!(limiter.check(&addr(2)).is_admitted());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_concurrent_first_use_shares_one_bucket() {
        let limiter = Arc::new(AdmissionLimiter::new(5, Duration::from_secs(3600)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..5)
                        .filter(|_| limiter.check(&addr(9)).is_admitted())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 5);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}

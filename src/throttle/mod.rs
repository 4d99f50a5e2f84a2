//! Throttling primitives
//!
//! Two disciplines built on one [`TokenBucket`]:
//!
//! - [`InvokeLimiter`] drops side effects that arrive faster than a window
//!   allows (used for live search progress notifications)
//! - [`AdmissionLimiter`] accepts or rejects discrete requests per key (used
//!   at the HTTP boundary, keyed by client address)

pub mod admission;
pub mod invoke_limiter;
pub mod token_bucket;

pub use admission::{Admission, AdmissionLimiter};
pub use invoke_limiter::InvokeLimiter;
pub use token_bucket::TokenBucket;

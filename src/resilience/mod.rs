//! Resilience
//!
//! Retry policy for gateway calls. Every call shares the same backoff
//! behavior so rate-limit and transient handling is uniform and testable.

pub mod retry;

pub use retry::{parse_retry_after, RetryPolicy, DEFAULT_RETRY_POLICY};

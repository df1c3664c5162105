//! Credential Acquisition
//!
//! The login flow is opaque to the rest of the crate: something that, given a
//! deadline, eventually produces a bearer string or fails.

mod command;
mod static_token;

pub use command::CommandCredentialAcquirer;
pub use static_token::StaticCredentialAcquirer;

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::AcquisitionError;

/// Raw output of one login flow.
#[derive(Clone)]
pub struct AcquiredCredential {
    pub token: SecretString,
    /// How the token was obtained.
    pub source: String,
}

impl AcquiredCredential {
    pub fn new(token: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            source: source.into(),
        }
    }
}

impl std::fmt::Debug for AcquiredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquiredCredential")
            .field("token", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

/// Credential acquirer interface.
///
/// Implementations must give up once `timeout` elapses. The token lifecycle
/// manager guarantees they are never invoked concurrently.
#[async_trait]
pub trait CredentialAcquirer: Send + Sync {
    async fn acquire(&self, timeout: Duration) -> Result<AcquiredCredential, AcquisitionError>;
}

/// Mock acquirer for testing.
///
/// Scripted outcomes are served in FIFO order; once drained, the default
/// outcome is repeated.
pub struct MockCredentialAcquirer {
    outcomes: Mutex<VecDeque<Result<String, AcquisitionError>>>,
    default_outcome: Mutex<Option<Result<String, AcquisitionError>>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl Default for MockCredentialAcquirer {
    fn default() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockCredentialAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquirer that always returns `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.set_default_outcome(Ok(token.into()));
        mock
    }

    pub fn queue_token(&self, token: impl Into<String>) -> &Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(Ok(token.into()));
        }
        self
    }

    pub fn queue_error(&self, error: AcquisitionError) -> &Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(Err(error));
        }
        self
    }

    pub fn set_default_outcome(&self, outcome: Result<String, AcquisitionError>) -> &Self {
        if let Ok(mut default) = self.default_outcome.lock() {
            *default = Some(outcome);
        }
        self
    }

    /// Simulated login latency.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        if let Ok(mut current) = self.delay.lock() {
            *current = delay;
        }
        self
    }

    /// Number of times `acquire` was invoked.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<String, AcquisitionError> {
        let queued = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front());
        queued
            .or_else(|| self.default_outcome.lock().ok().and_then(|d| d.clone()))
            .unwrap_or(Err(AcquisitionError::MissingToken))
    }
}

#[async_trait]
impl CredentialAcquirer for MockCredentialAcquirer {
    async fn acquire(&self, timeout: Duration) -> Result<AcquiredCredential, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay.lock().map(|d| *d).unwrap_or_default();
        if delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(AcquisitionError::Timeout { timeout });
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.next_outcome()
            .map(|token| AcquiredCredential::new(token, "mock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_mock_serves_queue_then_default() {
        let mock = MockCredentialAcquirer::with_token("default-token");
        mock.queue_error(AcquisitionError::Failed {
            message: "captcha".to_string(),
        });

        let first = mock.acquire(Duration::from_secs(1)).await;
        assert!(matches!(first, Err(AcquisitionError::Failed { .. })));

        let second = mock.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.token.expose_secret(), "default-token");
        assert_eq!(second.source, "mock");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_honors_timeout() {
        let mock = MockCredentialAcquirer::with_token("late");
        mock.set_delay(Duration::from_secs(10));

        let result = mock.acquire(Duration::from_secs(2)).await;
        assert_eq!(
            result.unwrap_err(),
            AcquisitionError::Timeout {
                timeout: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let acquired = AcquiredCredential::new("secret-jwt", "static");
        assert!(!format!("{:?}", acquired).contains("secret-jwt"));
    }
}

//! Token Lifecycle Manager
//!
//! Owns the single credential slot and guarantees at most one acquisition in
//! flight, whose outcome every concurrent waiter observes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{CredentialProbe, TokenStore};
use crate::acquisition::CredentialAcquirer;
use crate::error::AcquisitionError;
use crate::types::{AcquisitionRecord, Credential, GatewayConfig};

/// Observable credential state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Nothing acquired yet, or reset.
    Empty,
    /// A login flow is running.
    Acquiring,
    /// Cached credential outlives the safety margin.
    Valid,
    /// Cached credential is inside the safety margin.
    Expired,
    /// Last acquisition failed, or the remote service rejected the credential.
    Invalid,
}

/// Diagnostic view of the credential slot. Never carries the bearer string.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TokenStatus {
    pub state: TokenState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TokenStatus {
    fn new(state: TokenState, credential: Option<&Credential>, last_error: Option<String>) -> Self {
        Self {
            state,
            subject: credential.and_then(|c| c.claims().subject.clone()),
            group_id: credential.and_then(|c| c.group_id().map(String::from)),
            expires_at: credential.and_then(Credential::expires_at),
            expires_in_secs: credential
                .and_then(Credential::expires_at)
                .map(|exp| (exp - Utc::now()).num_seconds()),
            fingerprint: credential.map(|c| c.fingerprint().to_string()),
            source: credential.map(|c| c.source().to_string()),
            acquired_at: credential.map(Credential::acquired_at),
            last_error,
        }
    }
}

/// Token provider interface used by the gateway.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a credential outliving the safety margin, acquiring one if
    /// needed.
    async fn ensure_valid(&self) -> Result<Arc<Credential>, AcquisitionError>;

    /// Report that the remote service rejected `rejected`.
    async fn invalidate(&self, rejected: &Credential);

    async fn state(&self) -> TokenState;

    async fn status(&self) -> TokenStatus;

    /// Drop the cached credential.
    async fn reset(&self);
}

type SharedAcquisition = Shared<BoxFuture<'static, Result<Arc<Credential>, AcquisitionError>>>;

enum Slot {
    Empty,
    /// `discarded` is set by a reset; the outcome is then dropped, not
    /// installed.
    Acquiring {
        generation: u64,
        outcome: SharedAcquisition,
        discarded: bool,
    },
    Valid(Arc<Credential>),
    Invalid {
        previous: Option<Arc<Credential>>,
        error: Option<AcquisitionError>,
    },
}

/// Settings for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct TokenManagerConfig {
    pub safety_margin: Duration,
    pub acquisition_timeout: Duration,
    pub group_claims: Vec<String>,
}

impl From<&GatewayConfig> for TokenManagerConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            safety_margin: config.safety_margin,
            acquisition_timeout: config.acquisition_timeout,
            group_claims: config.group_claims.clone(),
        }
    }
}

struct ManagerInner {
    config: TokenManagerConfig,
    acquirer: Arc<dyn CredentialAcquirer>,
    probe: Option<Arc<dyn CredentialProbe>>,
    store: Arc<TokenStore>,
    slot: Mutex<Slot>,
    generation: AtomicU64,
}

/// Default token provider.
///
/// Acquisition runs on its own task, so a waiter that gives up never cancels
/// the login flow the others are waiting on.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    inner: Arc<ManagerInner>,
}

impl TokenLifecycleManager {
    pub fn new(
        config: TokenManagerConfig,
        acquirer: Arc<dyn CredentialAcquirer>,
        probe: Option<Arc<dyn CredentialProbe>>,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                acquirer,
                probe,
                store,
                slot: Mutex::new(Slot::Empty),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    fn start_acquisition(&self, generation: u64) -> SharedAcquisition {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_acquisition(generation).await });

        task.map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(e) => Err(AcquisitionError::Aborted {
                message: e.to_string(),
            }),
        })
        .boxed()
        .shared()
    }
}

#[derive(Default)]
struct AttemptDetails {
    source: Option<String>,
    probe_status: Option<u16>,
}

impl ManagerInner {
    async fn run_acquisition(&self, generation: u64) -> Result<Arc<Credential>, AcquisitionError> {
        let started = Instant::now();
        info!(generation, "Acquiring credential");

        let mut details = AttemptDetails::default();
        let outcome = self.acquire_and_verify(&mut details).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let discarded = {
            let mut slot = self.slot.lock().await;
            match &*slot {
                Slot::Acquiring {
                    generation: g,
                    discarded,
                    ..
                } if *g == generation => {
                    let discarded = *discarded;
                    *slot = match &outcome {
                        _ if discarded => Slot::Empty,
                        Ok(credential) => Slot::Valid(Arc::clone(credential)),
                        Err(e) => Slot::Invalid {
                            previous: None,
                            error: Some(e.clone()),
                        },
                    };
                    discarded
                }
                _ => true,
            }
        };

        if discarded {
            info!(generation, duration_ms, "Acquisition finished after reset, outcome discarded");
            return outcome;
        }

        match &outcome {
            Ok(credential) => info!(
                fingerprint = credential.fingerprint(),
                source = credential.source(),
                expires_at = ?credential.expires_at(),
                duration_ms,
                "Credential acquired"
            ),
            Err(e) => warn!(error = %e, duration_ms, "Credential acquisition failed"),
        }

        let record = AcquisitionRecord {
            success: outcome.is_ok(),
            timestamp: Utc::now(),
            source: details.source,
            probe_status: details.probe_status,
            error: outcome.as_ref().err().map(ToString::to_string),
            duration_ms,
        };
        self.store
            .record_acquisition(record, outcome.as_ref().ok().map(|c| c.as_ref()))
            .await;

        outcome
    }

    async fn acquire_and_verify(
        &self,
        details: &mut AttemptDetails,
    ) -> Result<Arc<Credential>, AcquisitionError> {
        let acquired = self
            .acquirer
            .acquire(self.config.acquisition_timeout)
            .await?;
        details.source = Some(acquired.source.clone());

        let credential = Credential::from_token(
            acquired.token.expose_secret().as_str(),
            acquired.source,
            &self.config.group_claims,
        );

        if let Some(error) = credential.claims_error() {
            return Err(AcquisitionError::InvalidToken {
                message: error.to_string(),
            });
        }
        if !credential.is_fresh(self.config.safety_margin) {
            return Err(AcquisitionError::InvalidToken {
                message: "token expires within the safety margin".to_string(),
            });
        }

        if let Some(probe) = &self.probe {
            let probed = probe.probe(&credential).await;
            details.probe_status = match &probed {
                Ok(status) | Err(AcquisitionError::ProbeRejected { status }) => Some(*status),
                Err(_) => None,
            };
            probed?;
        }

        Ok(Arc::new(credential))
    }
}

#[async_trait]
impl TokenProvider for TokenLifecycleManager {
    async fn ensure_valid(&self) -> Result<Arc<Credential>, AcquisitionError> {
        loop {
            let mut slot = self.inner.slot.lock().await;
            match &*slot {
                Slot::Valid(credential) if credential.is_fresh(self.inner.config.safety_margin) => {
                    return Ok(Arc::clone(credential));
                }
                // a resolved future here means the task died before updating the slot
                Slot::Acquiring {
                    outcome, discarded, ..
                } if outcome.peek().is_none() => {
                    let outcome = outcome.clone();
                    let discarded = *discarded;
                    drop(slot);
                    let result = outcome.await;
                    if discarded {
                        // the flow predates a reset; start over once it is done
                        continue;
                    }
                    return result;
                }
                _ => {}
            }

            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let outcome = self.start_acquisition(generation);
            *slot = Slot::Acquiring {
                generation,
                outcome: outcome.clone(),
                discarded: false,
            };
            drop(slot);

            return outcome.await;
        }
    }

    async fn invalidate(&self, rejected: &Credential) {
        let mut slot = self.inner.slot.lock().await;
        let current = match &*slot {
            Slot::Valid(current) if current.same_token(rejected) => Arc::clone(current),
            _ => return,
        };
        warn!(
            fingerprint = current.fingerprint(),
            "Remote service rejected credential, invalidating"
        );
        *slot = Slot::Invalid {
            previous: Some(Arc::clone(&current)),
            error: None,
        };
        drop(slot);

        self.inner.store.record_rejection(&current).await;
    }

    async fn state(&self) -> TokenState {
        match &*self.inner.slot.lock().await {
            Slot::Empty => TokenState::Empty,
            Slot::Acquiring { .. } => TokenState::Acquiring,
            Slot::Valid(credential) if credential.is_fresh(self.inner.config.safety_margin) => {
                TokenState::Valid
            }
            Slot::Valid(_) => TokenState::Expired,
            Slot::Invalid { .. } => TokenState::Invalid,
        }
    }

    async fn status(&self) -> TokenStatus {
        let margin = self.inner.config.safety_margin;
        match &*self.inner.slot.lock().await {
            Slot::Empty => TokenStatus::new(TokenState::Empty, None, None),
            Slot::Acquiring { .. } => TokenStatus::new(TokenState::Acquiring, None, None),
            Slot::Valid(credential) => {
                let state = if credential.is_fresh(margin) {
                    TokenState::Valid
                } else {
                    TokenState::Expired
                };
                TokenStatus::new(state, Some(credential.as_ref()), None)
            }
            Slot::Invalid { previous, error } => TokenStatus::new(
                TokenState::Invalid,
                previous.as_deref(),
                error.as_ref().map(ToString::to_string),
            ),
        }
    }

    async fn reset(&self) {
        let mut slot = self.inner.slot.lock().await;
        match &mut *slot {
            // the running login keeps the slot so no second one starts beside it
            Slot::Acquiring { discarded, .. } => *discarded = true,
            other => *other = Slot::Empty,
        }
        info!("Credential slot reset");
    }
}

/// Mock token provider for testing.
///
/// Queued credentials are handed out one per acquisition; the current one is
/// reused until invalidated.
#[derive(Default)]
pub struct MockTokenProvider {
    queued: std::sync::Mutex<VecDeque<Result<Arc<Credential>, AcquisitionError>>>,
    current: std::sync::Mutex<Option<Arc<Credential>>>,
    acquisitions: AtomicUsize,
    invalidations: AtomicUsize,
}

impl MockTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_credential(&self, credential: Credential) -> &Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(Ok(Arc::new(credential)));
        }
        self
    }

    pub fn queue_error(&self, error: AcquisitionError) -> &Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(Err(error));
        }
        self
    }

    pub fn acquisition_count(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn invalidation_count(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    fn current(&self) -> Option<Arc<Credential>> {
        self.current.lock().ok().and_then(|c| c.clone())
    }
}

#[async_trait]
impl TokenProvider for MockTokenProvider {
    async fn ensure_valid(&self) -> Result<Arc<Credential>, AcquisitionError> {
        if let Some(credential) = self.current() {
            return Ok(credential);
        }

        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let next = self
            .queued
            .lock()
            .ok()
            .and_then(|mut queued| queued.pop_front())
            .unwrap_or(Err(AcquisitionError::MissingToken))?;
        if let Ok(mut current) = self.current.lock() {
            *current = Some(Arc::clone(&next));
        }
        Ok(next)
    }

    async fn invalidate(&self, rejected: &Credential) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut current) = self.current.lock() {
            if current.as_ref().is_some_and(|c| c.same_token(rejected)) {
                *current = None;
            }
        }
    }

    async fn state(&self) -> TokenState {
        match self.current() {
            Some(_) => TokenState::Valid,
            None => TokenState::Empty,
        }
    }

    async fn status(&self) -> TokenStatus {
        let current = self.current();
        let state = if current.is_some() {
            TokenState::Valid
        } else {
            TokenState::Empty
        };
        TokenStatus::new(state, current.as_deref(), None)
    }

    async fn reset(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }
}

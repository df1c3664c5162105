//! Credential Probe
//!
//! One lightweight authenticated request confirming a new token is accepted,
//! not merely well-formed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::AcquisitionError;
use crate::types::{Credential, GatewayConfig};

/// Credential probe interface.
#[async_trait]
pub trait CredentialProbe: Send + Sync {
    /// Returns the accepting status code.
    async fn probe(&self, credential: &Credential) -> Result<u16, AcquisitionError>;
}

/// Probe issuing `GET probe_path` against the remote service.
pub struct HttpCredentialProbe<T: HttpTransport> {
    config: Arc<GatewayConfig>,
    transport: Arc<T>,
}

impl<T: HttpTransport> HttpCredentialProbe<T> {
    pub fn new(config: Arc<GatewayConfig>, transport: Arc<T>) -> Self {
        Self { config, transport }
    }
}

#[async_trait]
impl<T: HttpTransport> CredentialProbe for HttpCredentialProbe<T> {
    async fn probe(&self, credential: &Credential) -> Result<u16, AcquisitionError> {
        let url = self
            .config
            .endpoint_url(&self.config.probe_path)
            .map_err(|e| AcquisitionError::ProbeFailed {
                message: format!("invalid probe url: {}", e),
            })?;

        let request = HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: self.config.request_headers(credential.bearer()),
            body: None,
            timeout: Some(self.config.attempt_timeout),
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AcquisitionError::ProbeFailed {
                message: e.to_string(),
            })?;

        debug!(
            status = response.status,
            fingerprint = credential.fingerprint(),
            "Probe completed"
        );

        if response.is_success() {
            Ok(response.status)
        } else {
            Err(AcquisitionError::ProbeRejected {
                status: response.status,
            })
        }
    }
}

/// Mock probe for testing.
pub struct MockCredentialProbe {
    outcome: Mutex<Result<u16, AcquisitionError>>,
    calls: AtomicUsize,
}

impl MockCredentialProbe {
    pub fn accepting() -> Self {
        Self {
            outcome: Mutex::new(Ok(200)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            outcome: Mutex::new(Err(AcquisitionError::ProbeRejected { status })),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_outcome(&self, outcome: Result<u16, AcquisitionError>) {
        if let Ok(mut current) = self.outcome.lock() {
            *current = outcome;
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProbe for MockCredentialProbe {
    async fn probe(&self, _credential: &Credential) -> Result<u16, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .lock()
            .map(|outcome| outcome.clone())
            .unwrap_or(Err(AcquisitionError::ProbeFailed {
                message: "mock probe poisoned".to_string(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::gateway_config;
    use crate::core::{HttpResponse, MockHttpTransport};
    use crate::error::NetworkError;
    use crate::types::{default_group_claims, test_tokens::jwt_expiring_in};

    fn setup() -> (Arc<MockHttpTransport>, HttpCredentialProbe<MockHttpTransport>, Credential) {
        let config = gateway_config()
            .base_url("https://api.example.com/v1")
            .subscription_key("sub-key")
            .probe_path("/tenants")
            .build()
            .unwrap();
        let transport = Arc::new(MockHttpTransport::new());
        let probe = HttpCredentialProbe::new(Arc::new(config), Arc::clone(&transport));
        let credential =
            Credential::from_token(jwt_expiring_in(3600), "test", &default_group_claims());
        (transport, probe, credential)
    }

    #[tokio::test]
    async fn test_probe_accepts_2xx() {
        let (transport, probe, credential) = setup();
        transport.queue_json_response(200, serde_json::json!([{"tenantId": "t1"}]));

        assert_eq!(probe.probe(&credential).await.unwrap(), 200);

        let request = transport.get_last_request().unwrap();
        assert_eq!(request.url, "https://api.example.com/v1/tenants");
        assert_eq!(request.method, HttpMethod::Get);
        assert!(request.headers["authorization"].starts_with("Bearer "));
        assert_eq!(request.headers["ocp-apim-subscription-key"], "sub-key");
    }

    #[tokio::test]
    async fn test_probe_rejection() {
        let (transport, probe, credential) = setup();
        transport.queue_response(HttpResponse::new(401, "unauthorized"));

        assert_eq!(
            probe.probe(&credential).await.unwrap_err(),
            AcquisitionError::ProbeRejected { status: 401 }
        );
    }

    #[tokio::test]
    async fn test_probe_network_failure() {
        let (transport, probe, credential) = setup();
        transport.queue_error(NetworkError::ConnectionFailed {
            message: "dns".to_string(),
        });

        assert!(matches!(
            probe.probe(&credential).await,
            Err(AcquisitionError::ProbeFailed { .. })
        ));
    }
}

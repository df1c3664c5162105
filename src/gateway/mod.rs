//! Resilient API Gateway
//!
//! Executes validated requests with the current credential, classifies the
//! outcome, retries what the policy allows and records every attempt.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::error::{ApiError, ConfigurationError, GatewayError, GatewayResult, NetworkError};
use crate::resilience::parse_retry_after;
use crate::token::{TokenProvider, TokenStore};
use crate::types::{CallOutcome, CallRecord, Credential, GatewayConfig, ValidatedRequest};

const ERROR_BODY_SNIPPET: usize = 200;

/// Successful response.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; `null` when the body was empty.
    pub body: Value,
    /// Resolved request path.
    pub endpoint: String,
}

/// Resilient API gateway.
pub struct ApiGateway<T: HttpTransport, P: TokenProvider> {
    config: Arc<GatewayConfig>,
    transport: Arc<T>,
    tokens: Arc<P>,
    store: Arc<TokenStore>,
}

impl<T: HttpTransport, P: TokenProvider> ApiGateway<T, P> {
    pub fn new(
        config: Arc<GatewayConfig>,
        transport: Arc<T>,
        tokens: Arc<P>,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            config,
            transport,
            tokens,
            store,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<P> {
        &self.tokens
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Execute a validated request.
    ///
    /// An auth failure triggers one forced reacquire and a single resend.
    /// Rate-limited and transient failures are retried within the policy
    /// budget, after which the last observed error is returned.
    pub async fn execute(&self, request: &ValidatedRequest) -> GatewayResult<ApiResponse> {
        let mut credential = self.tokens.ensure_valid().await?;
        let path = request.resolve_path(credential.group_id())?;
        let url = self.build_url(&path, request.query())?;
        let body = request.body().map(Value::to_string);
        let method = request.method();
        let idempotent = request.is_idempotent();
        let policy = &self.config.retry;

        let mut attempt: u32 = 0;
        let mut retries: u32 = 0;
        let mut reauthenticated = false;

        loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = self
                .send_once(method, &url, &path, &credential, body.clone())
                .await;
            self.record(&path, method, &outcome, attempt, started).await;

            let error = match outcome {
                Ok(response) => {
                    debug!(
                        operation = request.operation(),
                        endpoint = %path,
                        status = response.status,
                        attempt,
                        "Request succeeded"
                    );
                    return Ok(response);
                }
                Err(error) => error,
            };

            if matches!(error, ApiError::AuthFailure { .. }) && !reauthenticated {
                warn!(
                    operation = request.operation(),
                    endpoint = %path,
                    status = ?error.status(),
                    fingerprint = credential.fingerprint(),
                    "Credential rejected, reacquiring once"
                );
                self.tokens.invalidate(&credential).await;
                credential = self.tokens.ensure_valid().await?;
                reauthenticated = true;
                continue;
            }

            if error.is_retryable(idempotent) && policy.allows_retry(retries + 1) {
                let delay = policy.delay_for(retries, error.retry_after());
                warn!(
                    operation = request.operation(),
                    endpoint = %path,
                    method = method.as_str(),
                    status = ?error.status(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying request"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
                continue;
            }

            info!(
                operation = request.operation(),
                endpoint = %path,
                method = method.as_str(),
                code = error.error_code(),
                attempt,
                "Request failed"
            );
            return Err(GatewayError::Api(error));
        }
    }

    fn build_url(&self, path: &str, query: &[(String, String)]) -> GatewayResult<Url> {
        let mut url = self
            .config
            .endpoint_url(path)
            .map_err(|e| ConfigurationError::InvalidValue {
                field: "endpoint".to_string(),
                message: format!("{}: {}", path, e),
            })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        url: &Url,
        path: &str,
        credential: &Credential,
        body: Option<String>,
    ) -> Result<ApiResponse, ApiError> {
        let timeout = self.config.attempt_timeout;
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers: self.config.request_headers(credential.bearer()),
            body,
            timeout: Some(timeout),
        };

        let response = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(e.into_api_error()),
            Err(_) => return Err(NetworkError::Timeout { timeout }.into_api_error()),
        };

        classify(response, path)
    }

    async fn record(
        &self,
        path: &str,
        method: HttpMethod,
        outcome: &Result<ApiResponse, ApiError>,
        attempt: u32,
        started: Instant,
    ) {
        let (status_code, call_outcome, error) = match outcome {
            Ok(response) => (Some(response.status), CallOutcome::Success, None),
            Err(e) => (e.status(), e.outcome(), Some(e.to_string())),
        };

        self.store
            .record_call(CallRecord {
                endpoint: path.to_string(),
                method: method.as_str().to_string(),
                status_code,
                outcome: call_outcome,
                error,
                attempt,
                timestamp: Utc::now(),
                duration_ms: started.elapsed().as_millis() as u64,
            })
            .await;
    }
}

/// Map a response onto the outcome classes.
pub fn classify(response: HttpResponse, endpoint: &str) -> Result<ApiResponse, ApiError> {
    let status = response.status;
    match status {
        200..=299 => {
            let body = if response.body.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&response.body).map_err(|e| ApiError::Fatal {
                    status: Some(status),
                    message: format!("response body is not JSON: {}", e),
                })?
            };
            Ok(ApiResponse {
                status,
                body,
                endpoint: endpoint.to_string(),
            })
        }
        401 | 403 => Err(ApiError::AuthFailure {
            status,
            body: response.body,
        }),
        404 => Err(ApiError::NotFound {
            body: response.body,
        }),
        422 => Err(ApiError::ValidationRejected {
            body: response.body,
        }),
        429 => Err(ApiError::RateLimited {
            retry_after: response.header("retry-after").and_then(parse_retry_after),
            body: response.body,
        }),
        500..=599 => Err(ApiError::Transient {
            status: Some(status),
            message: format!("HTTP {}: {}", status, snippet(&response.body)),
            maybe_applied: true,
        }),
        _ => Err(ApiError::Fatal {
            status: Some(status),
            message: format!("unexpected HTTP {}: {}", status, snippet(&response.body)),
        }),
    }
}

fn snippet(body: &str) -> &str {
    let body = body.trim();
    match body.char_indices().nth(ERROR_BODY_SNIPPET) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

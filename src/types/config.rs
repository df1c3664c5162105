//! Configuration Types
//!
//! Gateway configuration.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::resilience::RetryPolicy;

/// Header carrying the API subscription key.
pub const DEFAULT_SUBSCRIPTION_KEY_HEADER: &str = "ocp-apim-subscription-key";

/// Default configuration values.
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ACQUISITION_TIMEOUT_SECS: u64 = 400;
pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 60;
pub const DEFAULT_PROBE_PATH: &str = "/tenants";
pub const DEFAULT_CALL_HISTORY_CAPACITY: usize = 10;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Gateway configuration.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Vendor API base URL.
    pub base_url: Url,
    /// Subscription key sent with every request.
    pub subscription_key: Option<SecretString>,
    /// Header name for the subscription key.
    pub subscription_key_header: String,
    /// Fixed headers attached to every request.
    pub default_headers: HashMap<String, String>,
    /// Deadline for a single network attempt.
    pub attempt_timeout: Duration,
    /// Upper bound for one credential acquisition.
    pub acquisition_timeout: Duration,
    /// Credentials expiring within this margin are treated as stale.
    pub safety_margin: Duration,
    /// Path probed after acquisition to confirm the token is accepted.
    pub probe_path: String,
    /// Whether newly acquired credentials are probed.
    pub probe_enabled: bool,
    /// Backoff policy shared by every gateway call.
    pub retry: RetryPolicy,
    /// Bound of the call record ring buffer.
    pub call_history_capacity: usize,
    /// Diagnostics snapshot file.
    pub token_file: Option<PathBuf>,
    /// Claim names searched for the group identifier.
    pub group_claims: Vec<String>,
    /// Pagination ceiling.
    pub max_page_size: u32,
}

impl GatewayConfig {
    /// Join a relative API path onto the base URL.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path))
    }

    /// Fixed headers plus the subscription key and bearer token.
    pub(crate) fn request_headers(&self, bearer: &str) -> HashMap<String, String> {
        let mut headers = self.default_headers.clone();
        if let Some(key) = &self.subscription_key {
            headers.insert(
                self.subscription_key_header.clone(),
                key.expose_secret().clone(),
            );
        }
        headers.insert("authorization".to_string(), format!("Bearer {}", bearer));
        headers
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "subscription_key",
                &self.subscription_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("subscription_key_header", &self.subscription_key_header)
            .field("default_headers", &self.default_headers)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("acquisition_timeout", &self.acquisition_timeout)
            .field("safety_margin", &self.safety_margin)
            .field("probe_path", &self.probe_path)
            .field("probe_enabled", &self.probe_enabled)
            .field("retry", &self.retry)
            .field("call_history_capacity", &self.call_history_capacity)
            .field("token_file", &self.token_file)
            .finish()
    }
}

/// Headers every request carries unless overridden.
pub fn default_headers() -> HashMap<String, String> {
    [
        ("accept", "application/json, text/plain, */*"),
        ("content-type", "application/json"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

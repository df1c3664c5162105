//! Configuration Builder
//!
//! Fluent builder for gateway configuration.

use secrecy::SecretString;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ConfigurationError;
use crate::resilience::RetryPolicy;
use crate::types::{
    default_group_claims, default_headers, GatewayConfig, DEFAULT_ACQUISITION_TIMEOUT_SECS,
    DEFAULT_ATTEMPT_TIMEOUT_SECS,
    DEFAULT_CALL_HISTORY_CAPACITY, DEFAULT_MAX_PAGE_SIZE, DEFAULT_PROBE_PATH,
    DEFAULT_SAFETY_MARGIN_SECS, DEFAULT_SUBSCRIPTION_KEY_HEADER,
};

/// Gateway configuration builder.
#[derive(Default)]
pub struct GatewayConfigBuilder {
    base_url: Option<String>,
    subscription_key: Option<SecretString>,
    subscription_key_header: Option<String>,
    extra_headers: HashMap<String, String>,
    attempt_timeout: Option<Duration>,
    acquisition_timeout: Option<Duration>,
    safety_margin: Option<Duration>,
    probe_path: Option<String>,
    probe_enabled: Option<bool>,
    retry: Option<RetryPolicy>,
    call_history_capacity: Option<usize>,
    token_file: Option<PathBuf>,
    group_claims: Option<Vec<String>>,
    max_page_size: Option<u32>,
    env_errors: Vec<ConfigurationError>,
}

impl GatewayConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vendor API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the subscription key.
    pub fn subscription_key(mut self, key: impl Into<String>) -> Self {
        self.subscription_key = Some(SecretString::new(key.into()));
        self
    }

    /// Override the subscription key header name.
    pub fn subscription_key_header(mut self, header: impl Into<String>) -> Self {
        self.subscription_key_header = Some(header.into());
        self
    }

    /// Add a fixed header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the per-attempt network deadline.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Set the upper bound for one credential acquisition.
    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.acquisition_timeout = Some(timeout);
        self
    }

    /// Set the credential expiry safety margin.
    pub fn safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = Some(margin);
        self
    }

    /// Set the probe path.
    pub fn probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = Some(path.into());
        self
    }

    /// Enable or disable probing of new credentials.
    pub fn probe_enabled(mut self, enabled: bool) -> Self {
        self.probe_enabled = Some(enabled);
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set the call history bound.
    pub fn call_history_capacity(mut self, capacity: usize) -> Self {
        self.call_history_capacity = Some(capacity);
        self
    }

    /// Set the diagnostics snapshot file.
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Set the claim names searched for the group identifier.
    pub fn group_claims(mut self, claims: Vec<String>) -> Self {
        self.group_claims = Some(claims);
        self
    }

    /// Set the pagination ceiling.
    pub fn max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = Some(size);
        self
    }

    /// Load settings from `RMM_*` environment variables.
    pub fn from_env(self) -> Self {
        self.from_vars(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RMM_API_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Some(key) = lookup("RMM_SUBSCRIPTION_KEY") {
            self.subscription_key = Some(SecretString::new(key));
        }
        if let Some(path) = lookup("RMM_TOKEN_FILE") {
            self.token_file = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("RMM_PROBE_PATH") {
            self.probe_path = Some(path);
        }
        if let Some(value) = lookup("RMM_ATTEMPT_TIMEOUT_SECS") {
            match value.trim().parse::<u64>() {
                Ok(secs) => self.attempt_timeout = Some(Duration::from_secs(secs)),
                Err(e) => self.env_errors.push(invalid("RMM_ATTEMPT_TIMEOUT_SECS", e)),
            }
        }
        if let Some(value) = lookup("RMM_ACQUISITION_TIMEOUT_SECS") {
            match value.trim().parse::<u64>() {
                Ok(secs) => self.acquisition_timeout = Some(Duration::from_secs(secs)),
                Err(e) => self.env_errors.push(invalid("RMM_ACQUISITION_TIMEOUT_SECS", e)),
            }
        }
        if let Some(value) = lookup("RMM_SAFETY_MARGIN_SECS") {
            match value.trim().parse::<u64>() {
                Ok(secs) => self.safety_margin = Some(Duration::from_secs(secs)),
                Err(e) => self.env_errors.push(invalid("RMM_SAFETY_MARGIN_SECS", e)),
            }
        }
        if let Some(zone) = lookup("RMM_TIME_ZONE") {
            self.extra_headers.insert("x-time-zone".to_string(), zone);
        }
        if let Some(origin) = lookup("RMM_ORIGIN") {
            self.extra_headers.insert("origin".to_string(), origin);
        }
        self
    }

    /// Build the gateway configuration.
    pub fn build(self) -> Result<GatewayConfig, ConfigurationError> {
        if let Some(error) = self.env_errors.into_iter().next() {
            return Err(error);
        }

        let raw_url = self.base_url.ok_or_else(|| ConfigurationError::MissingField {
            field: "base_url".to_string(),
        })?;
        let base_url = Url::parse(&raw_url).map_err(|e| invalid("base_url", e))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigurationError::InvalidValue {
                field: "base_url".to_string(),
                message: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }

        let probe_path = self
            .probe_path
            .unwrap_or_else(|| DEFAULT_PROBE_PATH.to_string());
        if !probe_path.starts_with('/') {
            return Err(ConfigurationError::InvalidValue {
                field: "probe_path".to_string(),
                message: "must start with '/'".to_string(),
            });
        }

        let attempt_timeout = self
            .attempt_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS));
        if attempt_timeout.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                field: "attempt_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let retry = self.retry.unwrap_or_default();
        if retry.max_attempts == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let mut headers = default_headers();
        headers.extend(self.extra_headers);

        Ok(GatewayConfig {
            base_url,
            subscription_key: self.subscription_key,
            subscription_key_header: self
                .subscription_key_header
                .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_KEY_HEADER.to_string()),
            default_headers: headers,
            attempt_timeout,
            acquisition_timeout: self
                .acquisition_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_ACQUISITION_TIMEOUT_SECS)),
            safety_margin: self
                .safety_margin
                .unwrap_or(Duration::from_secs(DEFAULT_SAFETY_MARGIN_SECS)),
            probe_path,
            probe_enabled: self.probe_enabled.unwrap_or(true),
            retry,
            call_history_capacity: self
                .call_history_capacity
                .unwrap_or(DEFAULT_CALL_HISTORY_CAPACITY)
                .max(1),
            token_file: self.token_file,
            group_claims: self.group_claims.unwrap_or_else(default_group_claims),
            max_page_size: self.max_page_size.unwrap_or(DEFAULT_MAX_PAGE_SIZE).max(1),
        })
    }
}

fn invalid(field: &str, error: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        message: error.to_string(),
    }
}

/// Create a new gateway configuration builder.
pub fn gateway_config() -> GatewayConfigBuilder {
    GatewayConfigBuilder::new()
}

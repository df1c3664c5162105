//! Gateway Error Types
//!
//! Error hierarchy for credential acquisition, request validation and
//! remote API execution.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::CallOutcome;

/// Root error type for the gateway.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Credential acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl GatewayError {
    /// Get error code for envelopes and telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "RMM_VALIDATION",
            Self::Acquisition(_) => "RMM_ACQUISITION",
            Self::Api(e) => e.error_code(),
            Self::Configuration(_) => "RMM_CONFIG",
            Self::Storage(_) => "RMM_STORAGE",
        }
    }

    /// Structured details for the failure envelope, if any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(e) => serde_json::to_value(&e.violations).ok(),
            Self::Api(e) => e.details(),
            _ => None,
        }
    }
}

/// A single violated field reported by the request validator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldViolation {
    /// Parameter name as the caller supplied it.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
    /// Offending values, when the field is a batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        if !self.values.is_empty() {
            write!(f, " ({})", self.values.join(", "))?;
        }
        Ok(())
    }
}

/// Caller input rejected before any network call.
///
/// Every violated field is listed, never just the first one found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldViolation::new(field, message)])
    }

    /// Whether a violation was reported for `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request validation failed: ")?;
        let parts: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Credential acquisition failure, shared verbatim with every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("Login flow failed: {message}")]
    Failed { message: String },

    #[error("Login flow timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Login flow completed without producing a token")]
    MissingToken,

    #[error("Acquired token is unusable: {message}")]
    InvalidToken { message: String },

    #[error("Remote service rejected the new token with status {status}")]
    ProbeRejected { status: u16 },

    #[error("Token probe failed: {message}")]
    ProbeFailed { message: String },

    #[error("Acquisition task aborted: {message}")]
    Aborted { message: String },
}

/// Classified remote API failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Authentication rejected with status {status}")]
    AuthFailure { status: u16, body: String },

    #[error("Resource not found")]
    NotFound { body: String },

    #[error("Request rejected by remote validation")]
    ValidationRejected { body: String },

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited {
        retry_after: Option<Duration>,
        body: String,
    },

    #[error("Transient failure: {message}")]
    Transient {
        status: Option<u16>,
        message: String,
        /// The request may have reached the remote service.
        maybe_applied: bool,
    },

    #[error("Fatal failure: {message}")]
    Fatal { status: Option<u16>, message: String },
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthFailure { .. } => "RMM_AUTH",
            Self::NotFound { .. } => "RMM_NOT_FOUND",
            Self::ValidationRejected { .. } => "RMM_REJECTED",
            Self::RateLimited { .. } => "RMM_RATE_LIMITED",
            Self::Transient { .. } => "RMM_TRANSIENT",
            Self::Fatal { .. } => "RMM_FATAL",
        }
    }

    /// Outcome class recorded in the call log.
    pub fn outcome(&self) -> CallOutcome {
        match self {
            Self::AuthFailure { .. } => CallOutcome::AuthFailure,
            Self::NotFound { .. } => CallOutcome::NotFound,
            Self::ValidationRejected { .. } => CallOutcome::ValidationRejected,
            Self::RateLimited { .. } => CallOutcome::RateLimited,
            Self::Transient { .. } => CallOutcome::Transient,
            Self::Fatal { .. } => CallOutcome::Fatal,
        }
    }

    /// HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthFailure { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            Self::ValidationRejected { .. } => Some(422),
            Self::RateLimited { .. } => Some(429),
            Self::Transient { status, .. } | Self::Fatal { status, .. } => *status,
        }
    }

    /// Whether the backoff policy may retry this failure.
    ///
    /// Auth failures are handled separately by a forced reacquire.
    pub fn is_retryable(&self, idempotent: bool) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Transient { maybe_applied, .. } => idempotent || !maybe_applied,
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        let body = match self {
            Self::AuthFailure { body, .. }
            | Self::NotFound { body }
            | Self::ValidationRejected { body }
            | Self::RateLimited { body, .. } => body,
            _ => return None,
        };
        if body.is_empty() {
            return None;
        }
        Some(
            serde_json::from_str(body)
                .unwrap_or_else(|_| serde_json::Value::String(body.clone())),
        )
    }
}

/// Transport-level failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The request never left this process.
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Request failed: {message}")]
    RequestFailed { message: String },

    #[error("Failed to read response body: {message}")]
    BodyReadFailed { message: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl NetworkError {
    /// Map into the gateway's classification.
    pub fn into_api_error(self) -> ApiError {
        match self {
            Self::ConnectionFailed { message } => ApiError::Transient {
                status: None,
                message,
                maybe_applied: false,
            },
            e @ (Self::Timeout { .. } | Self::RequestFailed { .. } | Self::BodyReadFailed { .. }) => {
                ApiError::Transient {
                    status: None,
                    message: e.to_string(),
                    maybe_applied: true,
                }
            }
            e @ (Self::ResponseTooLarge { .. } | Self::InvalidRequest { .. }) => ApiError::Fatal {
                status: None,
                message: e.to_string(),
            },
        }
    }
}

/// Configuration error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to create HTTP client: {message}")]
    HttpClient { message: String },
}

/// Token file persistence error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Delete failed: {message}")]
    DeleteFailed { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

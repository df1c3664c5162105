//! HTTP Transport
//!
//! HTTP client interface and implementations for remote API requests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ConfigurationError, NetworkError};

/// Default response size limit (4MB).
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

/// HTTP request definition.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// JSON request body.
    pub body: Option<String>,
    /// Per-request deadline.
    pub timeout: Option<Duration>,
}

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Repeating the request cannot apply its effect twice.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Post)
    }

    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// HTTP response definition.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keys lowercased.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
            .with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport interface (for dependency injection).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send an HTTP request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError>;
}

/// Default reqwest-based HTTP transport.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
    max_response_size: usize,
}

impl ReqwestHttpTransport {
    /// Create new transport with default settings.
    pub fn new() -> Result<Self, ConfigurationError> {
        Self::with_options(Duration::from_secs(30), DEFAULT_MAX_RESPONSE_SIZE)
    }

    /// Create transport with custom options.
    pub fn with_options(
        timeout: Duration,
        max_response_size: usize,
    ) -> Result<Self, ConfigurationError> {
        // 3xx must surface; following one would replay the subscription key
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigurationError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
            max_response_size,
        })
    }

    fn map_send_error(error: reqwest::Error, timeout: Duration) -> NetworkError {
        if error.is_timeout() {
            NetworkError::Timeout { timeout }
        } else if error.is_connect() {
            NetworkError::ConnectionFailed {
                message: error.to_string(),
            }
        } else if error.is_builder() {
            NetworkError::InvalidRequest {
                message: error.to_string(),
            }
        } else {
            NetworkError::RequestFailed {
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        if let Some(body) = request.body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, timeout))?;

        let status = response.status().as_u16();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_response_size {
                return Err(NetworkError::ResponseTooLarge { size: len as usize });
            }
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                NetworkError::Timeout { timeout }
            } else {
                NetworkError::BodyReadFailed {
                    message: e.to_string(),
                }
            }
        })?;

        if body.len() > self.max_response_size {
            return Err(NetworkError::ResponseTooLarge { size: body.len() });
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Mock HTTP transport for testing.
///
/// Queued outcomes are served in FIFO order.
#[derive(Default)]
pub struct MockHttpTransport {
    outcomes: Mutex<VecDeque<Result<HttpResponse, NetworkError>>>,
    request_history: Mutex<Vec<HttpRequest>>,
    default_response: Mutex<Option<HttpResponse>>,
}

impl MockHttpTransport {
    /// Create new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: HttpResponse) -> &Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(Ok(response));
        }
        self
    }

    /// Queue a JSON response.
    pub fn queue_json_response(&self, status: u16, body: serde_json::Value) -> &Self {
        self.queue_response(HttpResponse::json(status, &body))
    }

    /// Queue a transport failure.
    pub fn queue_error(&self, error: NetworkError) -> &Self {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(Err(error));
        }
        self
    }

    /// Set default response when queue is empty.
    pub fn set_default_response(&self, response: HttpResponse) -> &Self {
        if let Ok(mut default) = self.default_response.lock() {
            *default = Some(response);
        }
        self
    }

    /// Get request history.
    pub fn get_requests(&self) -> Vec<HttpRequest> {
        self.request_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Get last request.
    pub fn get_last_request(&self) -> Option<HttpRequest> {
        self.request_history
            .lock()
            .ok()
            .and_then(|history| history.last().cloned())
    }

    pub fn request_count(&self) -> usize {
        self.request_history
            .lock()
            .map(|history| history.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        if let Ok(mut history) = self.request_history.lock() {
            history.push(request);
        }

        let queued = self
            .outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front());
        if let Some(outcome) = queued {
            return outcome;
        }

        self.default_response
            .lock()
            .ok()
            .and_then(|default| default.clone())
            .ok_or_else(|| NetworkError::ConnectionFailed {
                message: "No mock response available".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_mock_transport_serves_in_order() {
        let transport = MockHttpTransport::new();
        transport
            .queue_json_response(200, serde_json::json!({"first": true}))
            .queue_response(HttpResponse::new(503, "unavailable"));

        let first = transport.send(get("https://example.com/a")).await.unwrap();
        assert_eq!(first.status, 200);
        assert!(first.body.contains("first"));

        let second = transport.send(get("https://example.com/b")).await.unwrap();
        assert_eq!(second.status, 503);

        let history = transport.get_requests();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].url, "https://example.com/b");
    }

    #[tokio::test]
    async fn test_mock_transport_errors_when_empty() {
        let transport = MockHttpTransport::new();
        let result = transport.send(get("https://example.com")).await;
        assert!(matches!(result, Err(NetworkError::ConnectionFailed { .. })));
    }

    #[test]
    fn test_http_method() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::parse("delete"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("PATCH"), None);
        assert!(HttpMethod::Put.is_idempotent());
        assert!(!HttpMethod::Post.is_idempotent());
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let response = HttpResponse::new(429, "").with_header("Retry-After", "2");
        assert_eq!(response.header("retry-after"), Some("2"));
        assert_eq!(response.header("RETRY-AFTER"), Some("2"));
    }
}

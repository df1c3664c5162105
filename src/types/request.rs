//! Validated Request
//!
//! The only request shape the gateway accepts.

use serde_json::Value;

use crate::core::HttpMethod;
use crate::error::ValidationError;

/// Placeholder substituted with the resolved group identifier.
pub const GROUP_PLACEHOLDER: &str = "{group}";

/// A request that passed every structural check.
///
/// Constructed only inside the crate by the request validator, so no
/// caller-supplied value reaches the network boundary unchecked.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedRequest {
    operation: String,
    method: HttpMethod,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    group_id: Option<String>,
}

impl ValidatedRequest {
    pub(crate) fn new(operation: impl Into<String>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            group_id: None,
        }
    }

    pub(crate) fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub(crate) fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn with_group(mut self, group_id: Option<String>) -> Self {
        self.group_id = group_id;
        self
    }

    /// Operation name used in logs.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Path template, possibly containing `{group}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Caller-supplied group, if any.
    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn is_idempotent(&self) -> bool {
        self.method.is_idempotent()
    }

    pub fn needs_group(&self) -> bool {
        self.path.contains(GROUP_PLACEHOLDER)
    }

    /// Substitute the group placeholder.
    ///
    /// The caller-supplied group wins over the one carried by the credential.
    pub fn resolve_path(&self, credential_group: Option<&str>) -> Result<String, ValidationError> {
        if !self.needs_group() {
            return Ok(self.path.clone());
        }

        let group = self
            .group_id
            .as_deref()
            .or(credential_group)
            .ok_or_else(|| {
                ValidationError::single(
                    "group_id",
                    "no group id supplied and the credential carries no group claim",
                )
            })?;

        if !is_path_segment(group) {
            return Err(ValidationError::single(
                "group_id",
                format!("'{}' is not a valid path segment", group),
            ));
        }

        Ok(self.path.replace(GROUP_PLACEHOLDER, group))
    }
}

/// Non-empty and free of characters that would change the URL structure.
pub(crate) fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '|' | ':'))
}

//! Result Envelope
//!
//! `{success: true, ...payload}` or `{success: false, error, error_code, error_details?}`.

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{GatewayError, GatewayResult};

/// Failure half of the envelope.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationFailure {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,
}

impl From<&GatewayError> for OperationFailure {
    fn from(error: &GatewayError) -> Self {
        Self {
            error: error.to_string(),
            error_code: error.error_code().to_string(),
            error_details: error.details(),
        }
    }
}

/// Outcome of a domain operation. Never an `Err`.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationResult<T> {
    Success(T),
    Failure(OperationFailure),
}

impl<T> OperationResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&OperationFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    pub fn into_success(self) -> Option<T> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Failure(_) => None,
        }
    }
}

impl<T> From<GatewayResult<T>> for OperationResult<T> {
    fn from(result: GatewayResult<T>) -> Self {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(error) => Self::Failure(OperationFailure::from(&error)),
        }
    }
}

impl<T> From<GatewayError> for OperationResult<T> {
    fn from(error: GatewayError) -> Self {
        Self::Failure(OperationFailure::from(&error))
    }
}

impl<T: Serialize> Serialize for OperationResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut envelope = Map::new();
        match self {
            Self::Success(payload) => {
                envelope.insert("success".to_string(), Value::Bool(true));
                match serde_json::to_value(payload).map_err(S::Error::custom)? {
                    Value::Object(fields) => envelope.extend(fields),
                    Value::Null => {}
                    other => {
                        envelope.insert("data".to_string(), other);
                    }
                }
            }
            Self::Failure(failure) => {
                envelope.insert("success".to_string(), Value::Bool(false));
                if let Value::Object(fields) =
                    serde_json::to_value(failure).map_err(S::Error::custom)?
                {
                    envelope.extend(fields);
                }
            }
        }
        envelope.serialize(serializer)
    }
}

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::{AcquiredCredential, CredentialAcquirer};
use crate::error::AcquisitionError;

/// Environment variable holding a manually pasted token.
pub const STATIC_TOKEN_ENV: &str = "RMM_BEARER_TOKEN";

/// Hands out a token obtained out of band.
pub struct StaticCredentialAcquirer {
    token: Option<SecretString>,
}

impl StaticCredentialAcquirer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(SecretString::new(token.into())),
        }
    }

    /// Read the token from `RMM_BEARER_TOKEN`.
    ///
    /// A missing variable is reported at acquisition time, not here.
    pub fn from_env() -> Self {
        Self {
            token: std::env::var(STATIC_TOKEN_ENV)
                .ok()
                .filter(|t| !t.trim().is_empty())
                .map(SecretString::new),
        }
    }
}

#[async_trait]
impl CredentialAcquirer for StaticCredentialAcquirer {
    async fn acquire(&self, _timeout: Duration) -> Result<AcquiredCredential, AcquisitionError> {
        let token = self.token.as_ref().ok_or(AcquisitionError::MissingToken)?;
        Ok(AcquiredCredential::new(
            token.expose_secret().trim(),
            "static",
        ))
    }
}

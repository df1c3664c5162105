//! Credential Types
//!
//! Bearer credential with expiry and identity derived from its encoded claims.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Identity claims decoded from a bearer token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Token issuer (`iss`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Subject (`sub`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Audiences (`aud`), normalized to a list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience: Vec<String>,
    /// Group/tenant identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Expiry (`exp`) in Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_secs: Option<i64>,
}

impl CredentialClaims {
    /// Decode the payload segment of a JWT without verifying its signature.
    ///
    /// Signature verification is the remote service's job; the claims are only
    /// used to schedule reacquisition and resolve the group.
    pub fn decode(token: &str, group_claims: &[String]) -> Result<Self, String> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
            _ => return Err("token is not a three-segment JWT".to_string()),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| format!("claims segment is not base64url: {}", e))?;
        let claims: Map<String, Value> = serde_json::from_slice(&bytes)
            .map_err(|e| format!("claims segment is not a JSON object: {}", e))?;

        let expires_at_secs = claims.get("exp").and_then(|exp| {
            exp.as_i64()
                .or_else(|| exp.as_f64().map(|secs| secs as i64))
        });

        let audience = match claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.clone()],
            Some(Value::Array(auds)) => auds
                .iter()
                .filter_map(|a| a.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            issuer: string_claim(&claims, "iss"),
            subject: string_claim(&claims, "sub"),
            audience,
            group_id: find_group_claim(&claims, group_claims),
            expires_at_secs,
        })
    }
}

fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    claims.get(name).and_then(|v| v.as_str()).map(String::from)
}

/// Exact claim names win over namespaced ones such as
/// `https://example.com/groupId`.
fn find_group_claim(claims: &Map<String, Value>, names: &[String]) -> Option<String> {
    let as_id = |value: &Value| match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    for name in names {
        if let Some(id) = claims.get(name).and_then(as_id) {
            return Some(id);
        }
    }

    for name in names {
        let namespaced = claims.iter().find(|(key, _)| {
            key.contains('/') && key.rsplit('/').next() == Some(name.as_str())
        });
        if let Some(id) = namespaced.and_then(|(_, value)| as_id(value)) {
            return Some(id);
        }
    }

    None
}

/// A bearer credential held by the token lifecycle manager.
#[derive(Clone)]
pub struct Credential {
    token: SecretString,
    claims: CredentialClaims,
    claims_error: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    acquired_at: DateTime<Utc>,
    source: String,
    fingerprint: String,
}

impl Credential {
    /// Build a credential from a raw bearer string.
    ///
    /// Unparseable claims leave the credential without an expiry, which makes
    /// it stale from the start.
    pub fn from_token(
        token: impl Into<String>,
        source: impl Into<String>,
        group_claims: &[String],
    ) -> Self {
        let token = token.into();
        let fingerprint = fingerprint(&token);
        let (claims, claims_error) = match CredentialClaims::decode(&token, group_claims) {
            Ok(claims) => (claims, None),
            Err(e) => (CredentialClaims::default(), Some(e)),
        };
        let expires_at = claims
            .expires_at_secs
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        Self {
            token: SecretString::new(token),
            claims,
            claims_error,
            expires_at,
            acquired_at: Utc::now(),
            source: source.into(),
            fingerprint,
        }
    }

    pub(crate) fn bearer(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn claims(&self) -> &CredentialClaims {
        &self.claims
    }

    /// Why the claims could not be decoded, if they could not.
    pub fn claims_error(&self) -> Option<&str> {
        self.claims_error.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn group_id(&self) -> Option<&str> {
        self.claims.group_id.as_deref()
    }

    /// Short SHA-256 fingerprint for logs and diagnostics.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Whether the credential outlives `now + margin`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: std::time::Duration) -> bool {
        // a margin past the calendar range outlives every credential
        let deadline = Duration::from_std(margin)
            .ok()
            .and_then(|margin| now.checked_add_signed(margin));
        match (self.expires_at, deadline) {
            (Some(exp), Some(deadline)) => exp > deadline,
            _ => false,
        }
    }

    pub fn is_fresh(&self, margin: std::time::Duration) -> bool {
        self.is_fresh_at(Utc::now(), margin)
    }

    /// Whether both credentials carry the same bearer string.
    pub fn same_token(&self, other: &Credential) -> bool {
        self.fingerprint == other.fingerprint && self.bearer() == other.bearer()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint)
            .field("claims", &self.claims)
            .field("expires_at", &self.expires_at)
            .field("source", &self.source)
            .finish()
    }
}

fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest
        .iter()
        .take(6)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Default claim names searched for the group identifier.
pub fn default_group_claims() -> Vec<String> {
    ["group_id", "groupId", "tenant_id", "tenantId"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use super::*;

    /// Unsigned JWT carrying the given claims.
    pub fn jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.signature", header, payload)
    }

    /// JWT expiring `secs_from_now` seconds from now.
    pub fn jwt_expiring_in(secs_from_now: i64) -> String {
        jwt(serde_json::json!({
            "sub": "auth0|operator",
            "iss": "https://login.example.com/",
            "aud": ["https://api.example.com"],
            "exp": Utc::now().timestamp() + secs_from_now,
            "https://api.example.com/groupId": "group-42",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::test_tokens::*;
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_claims_decoded() {
        let token = jwt_expiring_in(3600);
        let credential = Credential::from_token(token, "test", &default_group_claims());

        assert!(credential.claims_error().is_none());
        assert_eq!(credential.claims().subject.as_deref(), Some("auth0|operator"));
        assert_eq!(credential.claims().audience, vec!["https://api.example.com"]);
        assert_eq!(credential.group_id(), Some("group-42"));
        assert!(credential.is_fresh(StdDuration::from_secs(60)));
    }

    #[test]
    fn test_exact_group_claim_preferred() {
        let token = jwt(serde_json::json!({
            "exp": Utc::now().timestamp() + 600,
            "groupId": 17,
            "https://ns.example.com/groupId": "namespaced",
        }));
        let credential = Credential::from_token(token, "test", &default_group_claims());
        assert_eq!(credential.group_id(), Some("17"));
    }

    #[test]
    fn test_unparseable_claims_are_stale() {
        let credential = Credential::from_token("not-a-jwt", "test", &default_group_claims());
        assert!(credential.claims_error().is_some());
        assert!(credential.expires_at().is_none());
        assert!(!credential.is_fresh(StdDuration::ZERO));
    }

    #[test]
    fn test_freshness_honors_margin() {
        let credential =
            Credential::from_token(jwt_expiring_in(30), "test", &default_group_claims());
        assert!(credential.is_fresh(StdDuration::from_secs(10)));
        assert!(!credential.is_fresh(StdDuration::from_secs(60)));
    }

    #[test]
    fn test_huge_margin_is_never_fresh() {
        let credential = Credential::from_token(jwt_expiring_in(3600), "test", &default_group_claims());
        assert!(!credential.is_fresh(StdDuration::from_secs(10_000_000_000_000)));
        assert!(!credential.is_fresh(StdDuration::MAX));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = jwt_expiring_in(3600);
        let credential = Credential::from_token(token.clone(), "test", &default_group_claims());
        let debug = format!("{:?}", credential);
        assert!(!debug.contains(&token));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(credential.fingerprint().len(), 12);
    }
}

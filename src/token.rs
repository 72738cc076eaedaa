use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AuthError;

pub type AccessToken = String;

/// Kind of credential held by the signer. It decides how dependent clients present it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    #[default]
    None,
    Anonymous,
    LegacySecret,
    IdToken,
    CustomToken,
    #[serde(rename = "oauth2_access_token")]
    OAuth2AccessToken,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenType::None => "none",
            TokenType::Anonymous => "anonymous",
            TokenType::LegacySecret => "legacy token",
            TokenType::IdToken => "id token",
            TokenType::CustomToken => "custom token",
            TokenType::OAuth2AccessToken => "OAuth2.0 access token",
        };
        write!(f, "{name}")
    }
}

/// A bearer credential and its validity window, in epoch seconds of the clock that was
/// current when it was issued.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Credential {
    token: AccessToken,
    token_type: TokenType,
    issued_at: i64,
    expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl Credential {
    /// Creates a credential valid for `lifetime_secs` from `issued_at`. Negative lifetimes
    /// are treated as zero so `expires_at` never precedes `issued_at`.
    pub fn new(
        token: AccessToken,
        token_type: TokenType,
        issued_at: i64,
        lifetime_secs: i64,
    ) -> Self {
        Self {
            token,
            token_type,
            issued_at,
            expires_at: issued_at.saturating_add(lifetime_secs.max(0)),
            refresh_token: None,
        }
    }

    /// The empty credential, never presented as ready.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_refresh_token(self, refresh_token: Option<String>) -> Self {
        Self {
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            ..self
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn is_none(&self) -> bool {
        self.token_type == TokenType::None
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Whether the credential can be presented to dependent clients at `now`.
    pub fn is_valid(&self, now: i64) -> bool {
        !self.is_none() && !self.is_expired(now)
    }

    /// Wall clock representation of the expiration, if it is representable.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// Moves the validity window by `delta` seconds.
    pub(crate) fn rebase(&mut self, delta: i64) {
        self.issued_at = self.issued_at.saturating_add(delta);
        self.expires_at = self.expires_at.saturating_add(delta);
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The token itself is a secret.
        write!(
            f,
            "{} (issued at {}, expires at {})",
            self.token_type, self.issued_at, self.expires_at
        )
    }
}

/// Coarse status reported to the application.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    #[default]
    Uninitialized,
    OnRequest,
    OnRefresh,
    Ready,
    Error,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenStatus::Uninitialized => "uninitialized",
            TokenStatus::OnRequest => "on request",
            TokenStatus::OnRefresh => "on refreshing",
            TokenStatus::Ready => "ready",
            TokenStatus::Error => "error",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenInfo {
    pub token_type: TokenType,
    pub status: TokenStatus,
    pub error: Option<AuthError>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn credential_expiry_boundary() {
        let credential = Credential::new("T1".into(), TokenType::IdToken, 1_000, 3600);

        assert_eq!(credential.expires_at(), 4_600);
        assert!(credential.is_valid(4_599));
        assert!(!credential.is_valid(4_600));
        assert!(credential.is_expired(4_600));
    }

    #[test]
    fn negative_lifetime_never_precedes_issuance() {
        let credential = Credential::new("T1".into(), TokenType::IdToken, 1_000, -50);
        assert_eq!(credential.expires_at(), credential.issued_at());
    }

    #[test]
    fn huge_lifetime_saturates() {
        let credential = Credential::new("T1".into(), TokenType::IdToken, 1_000, i64::MAX);
        assert_eq!(credential.expires_at(), i64::MAX);
        assert!(credential.expires_at_utc().is_none());
    }

    #[test]
    fn none_credential_is_never_valid() {
        let credential = Credential::none();
        assert!(credential.is_none());
        assert!(!credential.is_valid(-10));
    }

    #[test]
    fn empty_refresh_token_is_dropped() {
        let credential = Credential::new("T1".into(), TokenType::IdToken, 0, 10)
            .with_refresh_token(Some(String::new()));
        assert_eq!(credential.refresh_token(), None);
    }

    #[test]
    fn display_does_not_leak_the_token() {
        let credential = Credential::new("super-secret".into(), TokenType::IdToken, 0, 10);
        assert!(!credential.to_string().contains("super-secret"));
    }

    #[test]
    fn serialization() {
        let credential = Credential::new("T1".into(), TokenType::OAuth2AccessToken, 10, 5);
        assert_eq!(
            serde_json::to_string(&credential).unwrap(),
            r#"{"token":"T1","token_type":"oauth2_access_token","issued_at":10,"expires_at":15}"#
        );
    }
}

use serde::{Deserialize, Serialize};

/// Lifetime of a service account assertion. Google rejects assertions living longer.
pub const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Claims of the assertion exchanged for an OAuth2 access token.
///
/// Field order is the serialization order, the encoded assertion is byte-exact for identical
/// claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Issuer. Service account email.
    pub(crate) iss: String,
    /// Subject. Service account email.
    pub(crate) sub: String,
    /// Audience. Full URL of the token endpoint.
    pub(crate) aud: String,
    /// Space separated scopes requested for the access token.
    pub(crate) scope: String,
    /// Issued at (epoch seconds).
    pub(crate) iat: i64,
    /// Expiration time (epoch seconds).
    pub(crate) exp: i64,
}

impl Claims {
    pub fn new(client_email: &str, aud: String, scopes: &[String], iat: i64) -> Self {
        Self {
            iss: client_email.to_owned(),
            sub: client_email.to_owned(),
            aud,
            scope: scopes.join(" "),
            iat,
            exp: iat.saturating_add(ASSERTION_LIFETIME_SECS),
        }
    }

    pub fn exp(&self) -> i64 {
        self.exp
    }
}

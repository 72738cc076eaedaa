use tracing::debug;

use crate::token::{Credential, TokenType};

/// Upper bound for the lifetime of an externally injected ID token.
pub const MAX_EXTERNAL_TOKEN_TTL: u64 = 3600;

/// Holds the active credential. Replacements are whole-value swaps, readers never observe a
/// partially updated credential.
#[derive(Debug, Default)]
pub struct CredentialStore {
    credential: Credential,
    external: bool,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_token(&self) -> (&str, i64) {
        (self.credential.token(), self.credential.expires_at())
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = credential;
        self.external = false;
    }

    /// Drops the credential: token type none, expired since the epoch, no refresh token.
    pub fn invalidate(&mut self) {
        debug!("invalidating stored credential");
        self.credential = Credential::none();
        self.external = false;
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.credential.is_expired(now)
    }

    /// Whether the stored credential was injected by the application rather than acquired.
    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Stores an ID token provided by the application.
    ///
    /// Empty tokens and tokens equal to the current one are ignored. The lifetime is capped
    /// to [`MAX_EXTERNAL_TOKEN_TTL`]. Returns whether the token was accepted.
    pub fn set_id_token(&mut self, token: &str, ttl_secs: u64, now: i64) -> bool {
        if token.is_empty() || token == self.credential.token() {
            return false;
        }
        let ttl = ttl_secs.min(MAX_EXTERNAL_TOKEN_TTL) as i64;
        self.credential = Credential::new(token.to_owned(), TokenType::IdToken, now, ttl);
        self.external = true;
        true
    }

    pub(crate) fn rebase(&mut self, delta: i64) {
        if !self.credential.is_none() {
            self.credential.rebase(delta);
        }
    }
}

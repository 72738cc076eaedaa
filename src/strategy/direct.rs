use std::fmt;

use http::Response;

use super::{Acquisition, TokenStrategy};
use crate::AuthError;
use crate::token::{Credential, TokenType};

/// Lifetime given to credentials that are not obtained through an exchange.
pub const DIRECT_TOKEN_LIFETIME: i64 = 365 * 24 * 60 * 60;

/// Modes whose credential is synthesized locally from the configuration.
pub enum DirectStrategy<'a> {
    Anonymous,
    CustomToken(&'a str),
    LegacySecret(&'a str),
}

impl fmt::Debug for DirectStrategy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::CustomToken(_) => f.write_str("CustomToken(<hidden>)"),
            Self::LegacySecret(_) => f.write_str("LegacySecret(<hidden>)"),
        }
    }
}

impl TokenStrategy for DirectStrategy<'_> {
    fn acquire(&self, now: i64, _current: &Credential) -> Result<Acquisition, AuthError> {
        let (token, token_type) = match *self {
            Self::Anonymous => ("", TokenType::Anonymous),
            Self::CustomToken(token) => (non_empty(token, "custom token")?, TokenType::CustomToken),
            Self::LegacySecret(secret) => {
                (non_empty(secret, "database secret")?, TokenType::LegacySecret)
            }
        };
        Ok(Acquisition::Direct(Credential::new(
            token.to_owned(),
            token_type,
            now,
            DIRECT_TOKEN_LIFETIME,
        )))
    }

    fn parse_response(
        &self,
        _response: Response<Vec<u8>>,
        _issued_at: i64,
    ) -> Result<Credential, AuthError> {
        Err(AuthError::Config(format!(
            "{self:?} credentials are not exchanged"
        )))
    }
}

fn non_empty<'a>(value: &'a str, name: &str) -> Result<&'a str, AuthError> {
    if value.is_empty() {
        return Err(AuthError::Config(format!("empty {name}")));
    }
    Ok(value)
}

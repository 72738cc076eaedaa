pub mod account;
pub mod backoff;
pub mod clock;
pub mod config;
pub mod gate;
pub mod http;
pub mod http_client;
pub mod jwt;
pub mod parameters;
pub mod signer;
pub mod store;
pub mod strategy;
pub mod token;

use thiserror::Error;

/// Errors produced while acquiring or refreshing a credential.
///
/// They are recorded in the signer state and handed verbatim to dependent clients, so the
/// type is cheap to clone and comparable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or invalid secrets for the selected mode.
    #[error("invalid auth configuration: `{0}`")]
    Config(String),
    /// The identity endpoint could not be reached (timeouts, refused connections, ...).
    #[error("http transport error: `{0}`")]
    Transport(String),
    /// Non successful response from the identity endpoint.
    #[error("identity server error: Status code: `{status}`, Reason: `{message}`")]
    Protocol { status: u16, message: String },
    /// The identity endpoint answered with a body that could not be decoded.
    #[error("invalid identity server response: `{0}`")]
    InvalidResponse(String),
    /// The identity endpoint reported the credential as revoked or no longer valid.
    #[error("credential revoked: `{0}`")]
    Revoked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Transport,
    Protocol,
    Revoked,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Config(_) => ErrorKind::Config,
            AuthError::Transport(_) => ErrorKind::Transport,
            AuthError::Protocol { .. } | AuthError::InvalidResponse(_) => ErrorKind::Protocol,
            AuthError::Revoked(_) => ErrorKind::Revoked,
        }
    }

    /// Transient errors are worth retrying without any change in the configuration.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

impl From<http_client::HttpClientError> for AuthError {
    fn from(err: http_client::HttpClientError) -> Self {
        AuthError::Transport(err.to_string())
    }
}

impl From<jwt::signer::JwtSignerError> for AuthError {
    fn from(err: jwt::signer::JwtSignerError) -> Self {
        AuthError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpClientError;
    use rstest::rstest;

    #[rstest]
    #[case(AuthError::Config("no api key".into()), ErrorKind::Config)]
    #[case(AuthError::Transport("timed out".into()), ErrorKind::Transport)]
    #[case(AuthError::Protocol { status: 400, message: "INVALID_PASSWORD".into() }, ErrorKind::Protocol)]
    #[case(AuthError::InvalidResponse("eof".into()), ErrorKind::Protocol)]
    #[case(AuthError::Revoked("USER_DISABLED".into()), ErrorKind::Revoked)]
    fn error_kinds(#[case] err: AuthError, #[case] expected: ErrorKind) {
        assert_eq!(err.kind(), expected);
        assert_eq!(err.is_transient(), expected == ErrorKind::Transport);
    }

    #[test]
    fn transport_errors_are_transient() {
        let err = AuthError::from(HttpClientError::Timeout("5s elapsed".into()));
        assert!(err.is_transient());
        assert!(err.to_string().contains("5s elapsed"));
    }
}

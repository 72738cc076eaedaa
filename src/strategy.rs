//! One token acquisition strategy per [`AuthMode`] variant.
pub mod direct;
pub mod service_account;
pub mod user;

use http::header::CONTENT_TYPE;
use http::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::AuthError;
use crate::config::{AuthConfig, AuthMode, SignerSettings};
use crate::jwt::signer::JwtSignerImpl;
use crate::token::{Credential, TokenType};
use direct::DirectStrategy;
use service_account::ServiceAccountStrategy;
use user::UserStrategy;

/// Provider error codes meaning the credential can no longer be used.
const REVOCATION_REASONS: [&str; 7] = [
    "TOKEN_EXPIRED",
    "USER_DISABLED",
    "USER_NOT_FOUND",
    "INVALID_REFRESH_TOKEN",
    "INVALID_ID_TOKEN",
    "CREDENTIAL_TOO_OLD_LOGIN_AGAIN",
    "invalid_grant",
];

/// Outcome of preparing an acquisition.
#[derive(Debug)]
pub enum Acquisition {
    /// The request to send to the identity endpoint.
    Exchange(Request<Vec<u8>>),
    /// No network round-trip is needed.
    Direct(Credential),
}

pub trait TokenStrategy {
    /// Prepares the next acquisition. `current` is the credential held so far, which may
    /// carry a refresh token.
    fn acquire(&self, now: i64, current: &Credential) -> Result<Acquisition, AuthError>;

    /// Decodes the identity endpoint answer into a credential issued at `issued_at`.
    fn parse_response(
        &self,
        response: Response<Vec<u8>>,
        issued_at: i64,
    ) -> Result<Credential, AuthError>;

    /// Whether the exchange is meaningless until the device clock is synchronised.
    fn requires_synced_clock(&self) -> bool {
        false
    }
}

/// Enumerates all strategies for static dispatching reasons.
#[derive(Debug)]
pub enum StrategyImpl<'a> {
    Direct(DirectStrategy<'a>),
    User(UserStrategy<'a>),
    ServiceAccount(ServiceAccountStrategy<'a, JwtSignerImpl>),
}

impl<'a> StrategyImpl<'a> {
    /// Selects the strategy matching the configured mode.
    ///
    /// An anonymous configuration holding an ID token with a refresh token (an account
    /// created through sign up) keeps that account alive instead of falling back to
    /// unauthenticated access.
    pub fn for_config(
        config: &'a AuthConfig,
        settings: &'a SignerSettings,
        current: &Credential,
    ) -> Result<Self, AuthError> {
        let strategy = match &config.mode {
            AuthMode::Anonymous if has_refreshable_account(config, current) => Self::User(
                UserStrategy::new(required_api_key(config)?, "", "", &settings.endpoints),
            ),
            AuthMode::Anonymous => Self::Direct(DirectStrategy::Anonymous),
            AuthMode::CustomToken { token } => Self::Direct(DirectStrategy::CustomToken(token)),
            AuthMode::LegacySecret { secret } => {
                Self::Direct(DirectStrategy::LegacySecret(secret))
            }
            AuthMode::User { email, password } => Self::User(UserStrategy::new(
                required_api_key(config)?,
                email,
                password,
                &settings.endpoints,
            )),
            AuthMode::ServiceAccount(key) => Self::ServiceAccount(
                ServiceAccountStrategy::from_key(key, &settings.endpoints, &settings.scopes)?,
            ),
        };
        Ok(strategy)
    }
}

impl TokenStrategy for StrategyImpl<'_> {
    fn acquire(&self, now: i64, current: &Credential) -> Result<Acquisition, AuthError> {
        match self {
            Self::Direct(strategy) => strategy.acquire(now, current),
            Self::User(strategy) => strategy.acquire(now, current),
            Self::ServiceAccount(strategy) => strategy.acquire(now, current),
        }
    }

    fn parse_response(
        &self,
        response: Response<Vec<u8>>,
        issued_at: i64,
    ) -> Result<Credential, AuthError> {
        match self {
            Self::Direct(strategy) => strategy.parse_response(response, issued_at),
            Self::User(strategy) => strategy.parse_response(response, issued_at),
            Self::ServiceAccount(strategy) => strategy.parse_response(response, issued_at),
        }
    }

    fn requires_synced_clock(&self) -> bool {
        match self {
            Self::Direct(strategy) => strategy.requires_synced_clock(),
            Self::User(strategy) => strategy.requires_synced_clock(),
            Self::ServiceAccount(strategy) => strategy.requires_synced_clock(),
        }
    }
}

fn has_refreshable_account(config: &AuthConfig, current: &Credential) -> bool {
    config.api_key.as_deref().is_some_and(|key| !key.is_empty())
        && current.token_type() == TokenType::IdToken
        && current.refresh_token().is_some()
}

pub(crate) fn required_api_key(config: &AuthConfig) -> Result<&str, AuthError> {
    config
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| AuthError::Config("missing API key".into()))
}

/// Builds a JSON POST request.
pub(crate) fn json_request<T: Serialize>(uri: &str, body: &T) -> Result<Request<Vec<u8>>, AuthError> {
    let body = serde_json::to_vec(body)
        .map_err(|e| AuthError::Config(format!("encoding request: {e}")))?;

    Request::builder()
        .uri(uri)
        .method("POST")
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .map_err(|e| AuthError::Config(format!("building request: {e}")))
}

/// Decodes a successful response body, or maps the provider error for unsuccessful ones.
pub(crate) fn decode_response<T: DeserializeOwned>(
    response: &Response<Vec<u8>>,
) -> Result<T, AuthError> {
    let body = response.body();
    if !response.status().is_success() {
        return Err(error_from_response(response.status(), body));
    }
    serde_json::from_slice(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    /// `{"error": {"code": 400, "message": "INVALID_PASSWORD"}}`
    Identity { error: IdentityError },
    /// `{"error": "invalid_grant", "error_description": "..."}`
    OAuth2 {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    },
}

#[derive(Deserialize)]
struct IdentityError {
    message: String,
}

pub(crate) fn error_from_response(status: StatusCode, body: &[u8]) -> AuthError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody::Identity { error }) => error.message,
        Ok(ErrorBody::OAuth2 {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(ErrorBody::OAuth2 { error, .. }) => error,
        Err(_) => String::from_utf8_lossy(body).to_string(),
    };

    if is_revocation(&message) {
        AuthError::Revoked(message)
    } else {
        AuthError::Protocol {
            status: status.as_u16(),
            message,
        }
    }
}

fn is_revocation(message: &str) -> bool {
    let reason = message.split([' ', ':']).next().unwrap_or_default();
    REVOCATION_REASONS.contains(&reason)
}

/// Lifetimes come as JSON numbers from OAuth2 and as decimal strings from Identity Toolkit.
pub(crate) fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(i64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(secs) => Ok(secs),
        Seconds::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

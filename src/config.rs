//! Authentication configuration supplied by the application.
pub mod precision;

use std::fmt;
use std::path::Path;

use http::Uri;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::Backoff;
use precision::Precision;

pub const DEFAULT_MAX_RETRIES: u32 = 5;

const IDENTITY_TOOLKIT_URI: &str = "https://identitytoolkit.googleapis.com";
const SECURE_TOKEN_URI: &str = "https://securetoken.googleapis.com";
const OAUTH2_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested for service account access tokens.
pub const DEFAULT_SCOPES: [&str; 6] = [
    "https://www.googleapis.com/auth/devstorage.full_control",
    "https://www.googleapis.com/auth/datastore",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/firebase.messaging",
    "https://www.googleapis.com/auth/cloud-platform",
];

/// Which credential the signer acquires and the secrets needed for it.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Web API key of the project. Required by the user modes.
    pub api_key: Option<String>,
    pub mode: AuthMode,
}

impl AuthConfig {
    pub fn new(mode: AuthMode) -> Self {
        Self {
            api_key: None,
            mode,
        }
    }

    pub fn with_api_key(self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<hidden>"))
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Requests are sent without credentials.
    Anonymous,
    /// A token minted elsewhere, used as is.
    CustomToken { token: String },
    /// Realtime Database secret.
    LegacySecret { secret: String },
    /// Email and password sign in, producing an ID token and a refresh token.
    User { email: String, password: String },
    /// OAuth2 access token obtained with a JWT signed by the service account key.
    ServiceAccount(ServiceAccountKey),
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Anonymous => f.write_str("Anonymous"),
            AuthMode::CustomToken { .. } => f
                .debug_struct("CustomToken")
                .field("token", &"<hidden>")
                .finish(),
            AuthMode::LegacySecret { .. } => f
                .debug_struct("LegacySecret")
                .field("secret", &"<hidden>")
                .finish(),
            AuthMode::User { email, .. } => f
                .debug_struct("User")
                .field("email", email)
                .field("password", &"<hidden>")
                .finish(),
            AuthMode::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceAccountKeyError {
    #[error("reading service account key file: `{0}`")]
    Io(#[from] std::io::Error),
    #[error("decoding service account key: `{0}`")]
    Decode(#[from] serde_json::Error),
}

/// Fields of a Google service account key file the signer needs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    /// RSA private key in PEM format.
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    pub fn new(client_email: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            client_email: client_email.into(),
            private_key: private_key.into(),
            private_key_id: None,
            project_id: None,
        }
    }

    pub fn from_json(json: &[u8]) -> Result<Self, ServiceAccountKeyError> {
        Ok(serde_json::from_slice(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ServiceAccountKeyError> {
        let contents = std::fs::read(path)?;
        Self::from_json(&contents)
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<hidden>")
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Base addresses of the identity services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    #[serde(with = "uri")]
    pub identity_toolkit: Uri,
    #[serde(with = "uri")]
    pub secure_token: Uri,
    #[serde(with = "uri")]
    pub oauth2_token: Uri,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            identity_toolkit: Uri::from_static(IDENTITY_TOOLKIT_URI),
            secure_token: Uri::from_static(SECURE_TOKEN_URI),
            oauth2_token: Uri::from_static(OAUTH2_TOKEN_URI),
        }
    }
}

impl Endpoints {
    /// Points every service to the same base url, used against local emulators and mocks.
    pub fn with_base(base: &str) -> Result<Self, http::uri::InvalidUri> {
        let base = base.trim_end_matches('/');
        Ok(Self {
            identity_toolkit: base.parse()?,
            secure_token: base.parse()?,
            oauth2_token: format!("{base}/token").parse()?,
        })
    }

    /// Identity Toolkit `accounts:<action>` url for the given api key.
    pub(crate) fn accounts(&self, action: &str, api_key: &str) -> String {
        format!(
            "{}/v1/accounts:{action}?key={api_key}",
            self.identity_toolkit.to_string().trim_end_matches('/')
        )
    }

    pub(crate) fn refresh(&self, api_key: &str) -> String {
        format!(
            "{}/v1/token?key={api_key}",
            self.secure_token.to_string().trim_end_matches('/')
        )
    }
}

/// Tunables of the signer, loadable from a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerSettings {
    /// Consecutive failed attempts after which automatic retries stop.
    pub max_retries: u32,
    pub backoff: Backoff,
    pub endpoints: Endpoints,
    pub scopes: Vec<String>,
    pub precision: Precision,
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            endpoints: Endpoints::default(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            precision: Precision::default(),
        }
    }
}

impl SignerSettings {
    pub fn from_json(json: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(json)
    }

    pub fn with_endpoints(self, endpoints: Endpoints) -> Self {
        Self { endpoints, ..self }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn with_backoff(self, backoff: Backoff) -> Self {
        Self { backoff, ..self }
    }
}

mod uri {
    use http::Uri;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Uri, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uri, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}

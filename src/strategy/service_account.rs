use std::fmt;

use http::{Response, Uri};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Acquisition, TokenStrategy, decode_response, json_request, seconds};
use crate::AuthError;
use crate::config::{Endpoints, ServiceAccountKey};
use crate::jwt::claims::Claims;
use crate::jwt::signer::local::LocalPrivateKeySigner;
use crate::jwt::signer::{JwtSigner, JwtSignerImpl};
use crate::token::{Credential, TokenType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "urn:ietf:params:oauth:grant-type:jwt-bearer")]
    JwtBearer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    pub grant_type: GrantType,
    pub assertion: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    /// The lifetime in seconds of the access token.
    #[serde(deserialize_with = "seconds")]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Exchanges a JWT signed with the service account key for an OAuth2 access token.
pub struct ServiceAccountStrategy<'a, J> {
    client_email: &'a str,
    jwt_signer: J,
    token_uri: &'a Uri,
    scopes: &'a [String],
}

impl<J> fmt::Debug for ServiceAccountStrategy<'_, J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountStrategy")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("jwt_signer", &"impl JwtSigner")
            .finish()
    }
}

impl<'a> ServiceAccountStrategy<'a, JwtSignerImpl> {
    /// Loads the private key. It lives only as long as this strategy.
    pub fn from_key(
        key: &'a ServiceAccountKey,
        endpoints: &'a Endpoints,
        scopes: &'a [String],
    ) -> Result<Self, AuthError> {
        let signer = LocalPrivateKeySigner::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AuthError::Config(e.to_string()))?
            .with_key_id(key.private_key_id.clone());
        Ok(Self::new(
            &key.client_email,
            JwtSignerImpl::Local(signer),
            &endpoints.oauth2_token,
            scopes,
        ))
    }
}

impl<'a, J: JwtSigner> ServiceAccountStrategy<'a, J> {
    pub fn new(
        client_email: &'a str,
        jwt_signer: J,
        token_uri: &'a Uri,
        scopes: &'a [String],
    ) -> Self {
        Self {
            client_email,
            jwt_signer,
            token_uri,
            scopes,
        }
    }
}

impl<J: JwtSigner> TokenStrategy for ServiceAccountStrategy<'_, J> {
    fn acquire(&self, now: i64, _current: &Credential) -> Result<Acquisition, AuthError> {
        if self.client_email.is_empty() {
            return Err(AuthError::Config("missing service account email".into()));
        }
        let audience = self.token_uri.to_string();
        let claims = Claims::new(self.client_email, audience.clone(), self.scopes, now);

        debug!(exp = claims.exp(), "signing service account assertion");
        let signed_jwt = self.jwt_signer.sign(claims)?;

        let request = json_request(
            &audience,
            &AccessTokenRequest {
                grant_type: GrantType::JwtBearer,
                assertion: signed_jwt.value().into(),
            },
        )?;
        Ok(Acquisition::Exchange(request))
    }

    fn parse_response(
        &self,
        response: Response<Vec<u8>>,
        issued_at: i64,
    ) -> Result<Credential, AuthError> {
        let decoded: AccessTokenResponse = decode_response(&response)?;
        if decoded.access_token.is_empty() {
            return Err(AuthError::InvalidResponse("empty access token".into()));
        }
        if let Some(token_type) = decoded.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(AuthError::InvalidResponse(format!(
                    "unsupported token type: {token_type}"
                )));
            }
        }
        Ok(Credential::new(
            decoded.access_token,
            TokenType::OAuth2AccessToken,
            issued_at,
            decoded.expires_in,
        ))
    }

    fn requires_synced_clock(&self) -> bool {
        // iat and exp are validated by the token endpoint
        true
    }
}

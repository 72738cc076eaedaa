//! Readiness gate used by the clients depending on the credential.
use http::header::{AUTHORIZATION, HeaderValue};
use http::uri::PathAndQuery;
use http::{Request, Response, StatusCode, Uri};
use thiserror::Error;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::AuthError;
use crate::clock::Clock;
use crate::http_client::{HttpClient, HttpClientError};
use crate::signer::Signer;
use crate::token::TokenType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The credential is being acquired, the caller should try again later.
    #[error("credential not ready")]
    NotReady,
    /// Acquisition stopped retrying, carries the last failure.
    #[error("{0}")]
    Auth(AuthError),
    #[error("unable to attach the credential: `{0}`")]
    InvalidRequest(String),
    #[error("{0}")]
    Transport(String),
}

impl From<HttpClientError> for GateError {
    fn from(err: HttpClientError) -> Self {
        GateError::Transport(err.to_string())
    }
}

/// Read side of the credential lifecycle as seen by dependent clients.
pub trait TokenProvider {
    fn token_ready(&self) -> bool;

    fn is_expired(&self) -> bool;

    /// The credential to present, if it can be used right now.
    fn bearer(&self) -> Result<BearerToken, GateError>;

    /// The credential was rejected by the service it was presented to.
    fn report_rejected(&self);
}

impl<C: HttpClient, K: Clock> TokenProvider for Signer<'_, C, K> {
    fn token_ready(&self) -> bool {
        Signer::token_ready(self)
    }

    fn is_expired(&self) -> bool {
        Signer::is_expired(self)
    }

    fn bearer(&self) -> Result<BearerToken, GateError> {
        if !Signer::token_ready(self) {
            return match self.last_error() {
                Some(err) if self.retries_exhausted() => Err(GateError::Auth(err)),
                _ => Err(GateError::NotReady),
            };
        }
        let credential = self.credential();
        Ok(BearerToken {
            token: credential.token().to_owned(),
            token_type: credential.token_type(),
            expires_at: credential.expires_at(),
        })
    }

    fn report_rejected(&self) {
        Signer::report_rejected(self)
    }
}

impl<T: TokenProvider + ?Sized> TokenProvider for &T {
    fn token_ready(&self) -> bool {
        (**self).token_ready()
    }

    fn is_expired(&self) -> bool {
        (**self).is_expired()
    }

    fn bearer(&self) -> Result<BearerToken, GateError> {
        (**self).bearer()
    }

    fn report_rejected(&self) {
        (**self).report_rejected()
    }
}

/// Owned snapshot of a usable credential.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    token: String,
    token_type: TokenType,
    expires_at: i64,
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl BearerToken {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Attaches the credential to `request`.
    ///
    /// Access tokens go in the `Authorization` header. ID tokens, custom tokens and database
    /// secrets go in the `auth` query parameter. Anonymous access attaches nothing.
    pub fn authorize(&self, request: &mut Request<Vec<u8>>) -> Result<(), GateError> {
        match self.token_type {
            TokenType::OAuth2AccessToken => {
                let value = HeaderValue::try_from(format!("Bearer {}", self.token))
                    .map_err(|e| GateError::InvalidRequest(e.to_string()))?;
                request.headers_mut().insert(AUTHORIZATION, value);
            }
            TokenType::IdToken | TokenType::CustomToken | TokenType::LegacySecret => {
                *request.uri_mut() = with_auth_param(request.uri(), &self.token)?;
            }
            TokenType::Anonymous | TokenType::None => {}
        }
        Ok(())
    }
}

fn with_auth_param(uri: &Uri, token: &str) -> Result<Uri, GateError> {
    let path = uri.path();
    let token = form_urlencoded::byte_serialize(token.as_bytes()).collect::<String>();
    let path_and_query = match uri.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}&auth={token}"),
        _ => format!("{path}?auth={token}"),
    };
    let path_and_query = PathAndQuery::try_from(path_and_query)
        .map_err(|e| GateError::InvalidRequest(e.to_string()))?;

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).map_err(|e| GateError::InvalidRequest(e.to_string()))
}

/// Transport for dependent clients that only sends requests once the credential is ready.
#[derive(Debug)]
pub struct AuthorizedClient<P, C> {
    provider: P,
    http_client: C,
}

impl<P, C> AuthorizedClient<P, C>
where
    P: TokenProvider,
    C: HttpClient,
{
    pub fn new(provider: P, http_client: C) -> Self {
        Self {
            provider,
            http_client,
        }
    }

    /// Authorizes and sends `request`. A `401 Unauthorized` answer is reported back to the
    /// provider and still returned to the caller.
    pub fn send(&self, mut request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, GateError> {
        let bearer = self.provider.bearer()?;
        bearer.authorize(&mut request)?;

        debug!(path = request.uri().path(), "sending authorized request");
        let response = self.http_client.send(request)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("request rejected with the current credential");
            self.provider.report_rejected();
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::tests::manual_clock;
    use crate::config::{AuthConfig, AuthMode, SignerSettings};
    use crate::http_client::tests::{MockHttpClient, response};
    use assert_matches::assert_matches;
    use mockall::mock;
    use rstest::rstest;

    const NOW: i64 = 1_700_000_000;

    mock! {
        pub TokenProvider {}
        impl TokenProvider for TokenProvider {
            fn token_ready(&self) -> bool;
            fn is_expired(&self) -> bool;
            fn bearer(&self) -> Result<BearerToken, GateError>;
            fn report_rejected(&self);
        }
    }

    fn bearer(token: &str, token_type: TokenType) -> BearerToken {
        BearerToken {
            token: token.into(),
            token_type,
            expires_at: NOW + 3600,
        }
    }

    fn get(uri: &str) -> Request<Vec<u8>> {
        Request::builder().uri(uri).body(Vec::new()).unwrap()
    }

    #[rstest]
    #[case::id_token(TokenType::IdToken, "T1", "https://db.example.com/users.json", "https://db.example.com/users.json?auth=T1")]
    #[case::existing_query(TokenType::CustomToken, "T1", "https://db.example.com/users.json?print=pretty", "https://db.example.com/users.json?print=pretty&auth=T1")]
    #[case::legacy_secret(TokenType::LegacySecret, "T1", "https://db.example.com/", "https://db.example.com/?auth=T1")]
    #[case::reserved_characters(TokenType::LegacySecret, "s3cr+t&shallow=true", "https://db.example.com/x.json", "https://db.example.com/x.json?auth=s3cr%2Bt%26shallow%3Dtrue")]
    #[case::anonymous(TokenType::Anonymous, "T1", "https://db.example.com/users.json", "https://db.example.com/users.json")]
    fn query_credentials(
        #[case] token_type: TokenType,
        #[case] token: &str,
        #[case] uri: &str,
        #[case] expected: &str,
    ) {
        let mut request = get(uri);
        bearer(token, token_type).authorize(&mut request).unwrap();

        assert_eq!(request.uri().to_string(), expected);
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn access_token_header() {
        let mut request = get("https://firestore.googleapis.com/v1/projects/demo");
        bearer("ya29.A", TokenType::OAuth2AccessToken)
            .authorize(&mut request)
            .unwrap();

        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer ya29.A"
        );
        assert_eq!(request.uri().query(), None);
    }

    #[test]
    fn signer_gate() {
        let mut http_client = MockHttpClient::new();
        http_client
            .expect_send()
            .times(2)
            .returning(|_| Ok(response(400, r#"{"error":{"code":400,"message":"INVALID_PASSWORD"}}"#)));
        let (now, clock) = manual_clock(NOW);
        let config = AuthConfig::new(AuthMode::User {
            email: "a@b.com".into(),
            password: "wrong".into(),
        })
        .with_api_key("KEY");
        let signer = Signer::new(
            http_client,
            clock,
            SignerSettings::default().with_max_retries(2),
        );

        assert_matches!(signer.bearer(), Err(GateError::NotReady));
        signer.begin(&config);
        signer.handle_token();
        // one failure, retries left
        assert_matches!(signer.bearer(), Err(GateError::NotReady));

        now.set(NOW + 60);
        signer.handle_token();
        assert_matches!(
            signer.bearer(),
            Err(GateError::Auth(AuthError::Protocol { status: 400, message })) if message == "INVALID_PASSWORD"
        );
    }

    #[test]
    fn signer_bearer_when_ready() {
        let (_, clock) = manual_clock(NOW);
        let config = AuthConfig::new(AuthMode::CustomToken {
            token: "custom".into(),
        });
        let signer = Signer::new(MockHttpClient::new(), clock, SignerSettings::default());
        signer.begin(&config);
        assert!(signer.handle_token());

        let provider: &dyn TokenProvider = &signer;
        assert!(provider.token_ready());
        assert!(!provider.is_expired());
        let bearer = provider.bearer().unwrap();
        assert_eq!(bearer.token(), "custom");
        assert_eq!(bearer.token_type(), TokenType::CustomToken);
    }

    #[test]
    fn authorized_client_reports_rejections() {
        let mut provider = MockTokenProvider::new();
        provider
            .expect_bearer()
            .returning(|| Ok(bearer("T1", TokenType::IdToken)));
        provider.expect_report_rejected().once().return_const(());

        let mut http_client = MockHttpClient::new();
        http_client
            .expect_send()
            .once()
            .withf(|req| req.uri().query() == Some("auth=T1"))
            .returning(|_| Ok(response(401, "Permission denied")));

        let client = AuthorizedClient::new(provider, http_client);
        let res = client.send(get("https://db.example.com/users.json")).unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn authorized_client_waits_for_credential() {
        let mut provider = MockTokenProvider::new();
        provider
            .expect_bearer()
            .returning(|| Err(GateError::NotReady));
        provider.expect_report_rejected().never();

        let mut http_client = MockHttpClient::new();
        http_client.expect_send().never();

        let client = AuthorizedClient::new(provider, http_client);
        assert_matches!(
            client.send(get("https://db.example.com/users.json")),
            Err(GateError::NotReady)
        );
    }

    #[test]
    fn authorized_client_with_shared_signer() {
        let (_, clock) = manual_clock(NOW);
        let config = AuthConfig::new(AuthMode::LegacySecret {
            secret: "db-secret".into(),
        });
        let signer = Signer::new(MockHttpClient::new(), clock, SignerSettings::default());
        signer.begin(&config);
        signer.handle_token();

        let mut http_client = MockHttpClient::new();
        http_client
            .expect_send()
            .once()
            .withf(|req| req.uri().query() == Some("auth=db-secret"))
            .returning(|_| Ok(response(200, "{}")));

        let client = AuthorizedClient::new(&signer, http_client);
        let res = client.send(get("https://db.example.com/users.json")).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(signer.token_ready());
    }
}

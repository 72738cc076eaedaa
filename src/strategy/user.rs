use std::fmt;

use http::{Request, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Acquisition, TokenStrategy, decode_response, json_request, seconds};
use crate::AuthError;
use crate::config::Endpoints;
use crate::token::{Credential, TokenType};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum GrantType {
    RefreshToken,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: GrantType,
    refresh_token: &'a str,
}

/// Sign in and sign up answer `idToken`/`refreshToken`/`expiresIn`, the secure token
/// endpoint answers the same fields in snake case.
#[derive(Deserialize)]
struct IdTokenResponse {
    #[serde(rename = "idToken", alias = "id_token")]
    id_token: String,
    #[serde(rename = "refreshToken", alias = "refresh_token", default)]
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn", alias = "expires_in", deserialize_with = "seconds")]
    expires_in: i64,
}

/// Email and password user, authenticated with an ID token kept alive by its refresh token.
pub struct UserStrategy<'a> {
    api_key: &'a str,
    email: &'a str,
    password: &'a str,
    endpoints: &'a Endpoints,
}

impl fmt::Debug for UserStrategy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserStrategy")
            .field("email", &self.email)
            .field("password", &"<hidden>")
            .finish()
    }
}

impl<'a> UserStrategy<'a> {
    pub fn new(
        api_key: &'a str,
        email: &'a str,
        password: &'a str,
        endpoints: &'a Endpoints,
    ) -> Self {
        Self {
            api_key,
            email,
            password,
            endpoints,
        }
    }

    /// Request creating a new account. Empty email and password create an anonymous account.
    pub fn sign_up_request(&self) -> Result<Request<Vec<u8>>, AuthError> {
        json_request(
            &self.endpoints.accounts("signUp", self.api_key),
            &PasswordRequest {
                email: self.email,
                password: self.password,
                return_secure_token: true,
            },
        )
    }

    fn sign_in_request(&self) -> Result<Request<Vec<u8>>, AuthError> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(AuthError::Config("missing user email or password".into()));
        }
        json_request(
            &self.endpoints.accounts("signInWithPassword", self.api_key),
            &PasswordRequest {
                email: self.email,
                password: self.password,
                return_secure_token: true,
            },
        )
    }

    fn refresh_request(&self, refresh_token: &str) -> Result<Request<Vec<u8>>, AuthError> {
        json_request(
            &self.endpoints.refresh(self.api_key),
            &RefreshRequest {
                grant_type: GrantType::RefreshToken,
                refresh_token,
            },
        )
    }
}

impl TokenStrategy for UserStrategy<'_> {
    fn acquire(&self, _now: i64, current: &Credential) -> Result<Acquisition, AuthError> {
        let request = match current.refresh_token() {
            Some(refresh_token) if current.token_type() == TokenType::IdToken => {
                debug!("refreshing ID token");
                self.refresh_request(refresh_token)?
            }
            _ => {
                debug!("signing in with email and password");
                self.sign_in_request()?
            }
        };
        Ok(Acquisition::Exchange(request))
    }

    fn parse_response(
        &self,
        response: Response<Vec<u8>>,
        issued_at: i64,
    ) -> Result<Credential, AuthError> {
        let decoded: IdTokenResponse = decode_response(&response)?;
        if decoded.id_token.is_empty() {
            return Err(AuthError::InvalidResponse("empty ID token".into()));
        }
        Ok(
            Credential::new(decoded.id_token, TokenType::IdToken, issued_at, decoded.expires_in)
                .with_refresh_token(decoded.refresh_token),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::tests::response;
    use assert_matches::assert_matches;
    use http::header::CONTENT_TYPE;
    use serde_json::{Value, json};

    const NOW: i64 = 1_700_000_000;

    fn body(request: &Request<Vec<u8>>) -> Value {
        serde_json::from_slice(request.body()).unwrap()
    }

    fn exchange(acquisition: Acquisition) -> Request<Vec<u8>> {
        match acquisition {
            Acquisition::Exchange(request) => request,
            Acquisition::Direct(_) => panic!("expected an exchange"),
        }
    }

    #[test]
    fn sign_in_request() {
        let endpoints = Endpoints::default();
        let strategy = UserStrategy::new("KEY", "a@b.com", "pw123456", &endpoints);

        let request = exchange(strategy.acquire(NOW, &Credential::none()).unwrap());

        assert_eq!(request.method(), http::Method::POST);
        assert_eq!(
            request.uri().to_string(),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword?key=KEY"
        );
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body(&request),
            json!({"email": "a@b.com", "password": "pw123456", "returnSecureToken": true})
        );
    }

    #[test]
    fn refresh_request_does_not_resend_the_password() {
        let endpoints = Endpoints::default();
        let strategy = UserStrategy::new("KEY", "a@b.com", "pw123456", &endpoints);
        let current = Credential::new("T1".into(), TokenType::IdToken, NOW, 3600)
            .with_refresh_token(Some("R1".into()));

        let request = exchange(strategy.acquire(NOW + 3600, &current).unwrap());

        assert_eq!(
            request.uri().to_string(),
            "https://securetoken.googleapis.com/v1/token?key=KEY"
        );
        assert_eq!(
            body(&request),
            json!({"grant_type": "refresh_token", "refresh_token": "R1"})
        );
    }

    #[test]
    fn sign_up_request_allows_anonymous_accounts() {
        let endpoints = Endpoints::default();
        let strategy = UserStrategy::new("KEY", "", "", &endpoints);

        let request = strategy.sign_up_request().unwrap();

        assert_eq!(
            request.uri().to_string(),
            "https://identitytoolkit.googleapis.com/v1/accounts:signUp?key=KEY"
        );
        assert_eq!(
            body(&request),
            json!({"email": "", "password": "", "returnSecureToken": true})
        );
    }

    #[test]
    fn missing_password() {
        let endpoints = Endpoints::default();
        let strategy = UserStrategy::new("KEY", "a@b.com", "", &endpoints);
        assert_matches!(
            strategy.acquire(NOW, &Credential::none()),
            Err(AuthError::Config(_))
        );
    }

    #[test]
    fn parse_sign_in_response() {
        let endpoints = Endpoints::default();
        let strategy = UserStrategy::new("KEY", "a@b.com", "pw123456", &endpoints);

        let credential = strategy
            .parse_response(
                response(
                    200,
                    r#"{"kind":"identitytoolkit#VerifyPasswordResponse","localId":"uid","email":"a@b.com","idToken":"T1","registered":true,"refreshToken":"R1","expiresIn":"3600"}"#,
                ),
                NOW,
            )
            .unwrap();

        assert_eq!(credential.token(), "T1");
        assert_eq!(credential.token_type(), TokenType::IdToken);
        assert_eq!(credential.refresh_token(), Some("R1"));
        assert_eq!(credential.expires_at(), NOW + 3600);
    }

    #[test]
    fn parse_refresh_response() {
        let endpoints = Endpoints::default();
        let strategy = UserStrategy::new("KEY", "a@b.com", "pw123456", &endpoints);

        let credential = strategy
            .parse_response(
                response(
                    200,
                    r#"{"access_token":"T2","expires_in":"3600","token_type":"Bearer","refresh_token":"R2","id_token":"T2","user_id":"uid","project_id":"123"}"#,
                ),
                NOW,
            )
            .unwrap();

        assert_eq!(credential.token(), "T2");
        assert_eq!(credential.refresh_token(), Some("R2"));
    }

    #[test]
    fn parse_response_missing_fields() {
        let endpoints = Endpoints::default();
        let strategy = UserStrategy::new("KEY", "a@b.com", "pw123456", &endpoints);

        assert_matches!(
            strategy.parse_response(response(200, r#"{"idToken":"T1"}"#), NOW),
            Err(AuthError::InvalidResponse(_))
        );
        assert_matches!(
            strategy.parse_response(response(200, "not json"), NOW),
            Err(AuthError::InvalidResponse(_))
        );
        assert_matches!(
            strategy.parse_response(response(200, r#"{"idToken":"","expiresIn":"3600"}"#), NOW),
            Err(AuthError::InvalidResponse(_))
        );
    }

    #[test]
    fn parse_provider_error() {
        let endpoints = Endpoints::default();
        let strategy = UserStrategy::new("KEY", "a@b.com", "pw123456", &endpoints);

        assert_matches!(
            strategy.parse_response(
                response(400, r#"{"error":{"code":400,"message":"INVALID_PASSWORD"}}"#),
                NOW
            ),
            Err(AuthError::Protocol { status: 400, message }) if message == "INVALID_PASSWORD"
        );
    }
}

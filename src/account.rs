//! Account maintenance requests against the Identity Toolkit.
use serde::Serialize;
use serde::de::IgnoredAny;
use tracing::{debug, info};

use crate::AuthError;
use crate::config::Endpoints;
use crate::http_client::HttpClient;
use crate::strategy::{decode_response, json_request};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OobRequestType {
    VerifyEmail,
    PasswordReset,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: OobRequestType,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    id_token: &'a str,
}

/// Sends account maintenance requests on behalf of a user.
#[derive(Debug)]
pub struct AccountManager<'a, C> {
    http_client: C,
    api_key: &'a str,
    endpoints: &'a Endpoints,
}

impl<'a, C: HttpClient> AccountManager<'a, C> {
    pub fn new(http_client: C, api_key: &'a str, endpoints: &'a Endpoints) -> Self {
        Self {
            http_client,
            api_key,
            endpoints,
        }
    }

    /// Asks the identity service to e-mail a verification link to the owner of `id_token`.
    pub fn send_email_verification(&self, id_token: &str) -> Result<(), AuthError> {
        require(id_token, "ID token")?;
        info!("requesting e-mail verification");
        self.post(
            "sendOobCode",
            &OobCodeRequest {
                request_type: OobRequestType::VerifyEmail,
                id_token: Some(id_token),
                email: None,
            },
        )
    }

    pub fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        require(email, "e-mail")?;
        info!("requesting password reset");
        self.post(
            "sendOobCode",
            &OobCodeRequest {
                request_type: OobRequestType::PasswordReset,
                id_token: None,
                email: Some(email),
            },
        )
    }

    /// Deletes the account owning `id_token`. The token can no longer be refreshed afterwards.
    ///
    /// A [`crate::signer::Signer`] holding that token keeps presenting it, use
    /// [`crate::signer::Signer::delete_user`] to delete the account it signed in.
    pub fn delete_user(&self, id_token: &str) -> Result<(), AuthError> {
        require(id_token, "ID token")?;
        info!("deleting user account");
        self.post("delete", &DeleteRequest { id_token })
    }

    fn post<T: Serialize>(&self, action: &str, body: &T) -> Result<(), AuthError> {
        if self.api_key.is_empty() {
            return Err(AuthError::Config("missing API key".into()));
        }
        let request = json_request(&self.endpoints.accounts(action, self.api_key), body)?;
        debug!(action, "sending account request");
        let response = self.http_client.send(request)?;
        decode_response::<IgnoredAny>(&response)?;
        Ok(())
    }
}

fn require(value: &str, name: &str) -> Result<(), AuthError> {
    if value.is_empty() {
        return Err(AuthError::Config(format!("missing {name}")));
    }
    Ok(())
}

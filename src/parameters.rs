//! Command line parameters of `fb-auth-cli`.
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::error::{Error as ClapError, ErrorKind};
use clap::{Args, ValueEnum};

use crate::config::{AuthConfig, AuthMode, Endpoints, ServiceAccountKey, SignerSettings};
use crate::http::config::{HttpConfig, ProxyUrl};

/// Interval between two ticks of the signer.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;

#[derive(Args, Debug, Default)]
pub struct AuthInputArgs {
    /// E-mail of the user to sign in. Requires --password and --api-key
    #[arg(long, requires = "password")]
    pub email: Option<String>,

    /// Password of the user to sign in
    #[arg(long, requires = "email")]
    pub password: Option<String>,

    /// Path to the service account JSON key file
    #[arg(long, conflicts_with_all = ["email", "custom_token", "legacy_secret"])]
    pub service_account_file: Option<PathBuf>,

    /// Token minted by a trusted backend, used as is
    #[arg(long, conflicts_with_all = ["email", "legacy_secret"])]
    pub custom_token: Option<String>,

    /// Realtime Database secret
    #[arg(long, conflicts_with = "email")]
    pub legacy_secret: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct TransportArgs {
    /// Proxy url, `HTTPS_PROXY` or `HTTP_PROXY` are used when missing
    #[arg(long, value_parser = parse_proxy)]
    pub proxy: Option<ProxyUrl>,

    /// Extra root certificate (PEM) trusted by the transport
    #[arg(long)]
    pub ca_cert_file: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutPutTokenFormat {
    /// Returns only the token
    #[value(name = "Plain")]
    Plain,
    /// Returns the full credential in json format
    #[value(name = "Json")]
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn parse_proxy(s: &str) -> Result<ProxyUrl, ClapError> {
    Ok(ProxyUrl::try_from(s)?)
}

/// Selects the auth mode from the provided arguments. No argument means anonymous access.
pub fn build_auth_config(
    api_key: Option<String>,
    auth_args: &AuthInputArgs,
) -> Result<AuthConfig, Box<dyn Error>> {
    let mode = match auth_args {
        AuthInputArgs {
            email: Some(email),
            password: Some(password),
            ..
        } => {
            if api_key.is_none() {
                return Err(<ClapError>::raw(
                    ErrorKind::MissingRequiredArgument,
                    "--api-key is required to sign in a user",
                )
                .into());
            }
            AuthMode::User {
                email: email.to_owned(),
                password: password.to_owned(),
            }
        }
        AuthInputArgs {
            service_account_file: Some(path),
            ..
        } => AuthMode::ServiceAccount(
            ServiceAccountKey::from_json_file(path)
                .map_err(|e| format!("error reading service account key: {e}"))?,
        ),
        AuthInputArgs {
            custom_token: Some(token),
            ..
        } => AuthMode::CustomToken {
            token: token.to_owned(),
        },
        AuthInputArgs {
            legacy_secret: Some(secret),
            ..
        } => AuthMode::LegacySecret {
            secret: secret.to_owned(),
        },
        _ => AuthMode::Anonymous,
    };

    let config = AuthConfig::new(mode);
    Ok(match api_key {
        Some(api_key) => config.with_api_key(api_key),
        None => config,
    })
}

/// Loads the signer settings, pointing every endpoint to `endpoint_base` when provided.
pub fn load_settings(
    settings_file: Option<&Path>,
    endpoint_base: Option<&str>,
) -> Result<SignerSettings, Box<dyn Error>> {
    let settings = match settings_file {
        Some(path) => {
            let content = fs::read(path)
                .map_err(|e| format!("error reading settings file {}: {e}", path.display()))?;
            SignerSettings::from_json(&content)
                .map_err(|e| format!("error parsing settings file {}: {e}", path.display()))?
        }
        None => SignerSettings::default(),
    };

    Ok(match endpoint_base {
        Some(base) => settings.with_endpoints(
            Endpoints::with_base(base).map_err(|e| format!("invalid endpoint base url: {e}"))?,
        ),
        None => settings,
    })
}

pub fn build_http_config(transport_args: TransportArgs) -> Result<HttpConfig, Box<dyn Error>> {
    let mut config = HttpConfig::default();
    if let Some(proxy) = transport_args.proxy {
        config = config.with_proxy(proxy);
    }
    if let Some(path) = transport_args.ca_cert_file {
        config = config.with_ca_cert_file(path);
    }
    Ok(config.try_with_proxy_from_env()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::signer::local::test::RS256_PRIVATE_KEY;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn anonymous_without_arguments() {
        let config = build_auth_config(None, &AuthInputArgs::default()).unwrap();
        assert_eq!(config.mode, AuthMode::Anonymous);
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn user_requires_api_key() {
        let args = AuthInputArgs {
            email: Some("a@b.com".into()),
            password: Some("pw123456".into()),
            ..Default::default()
        };
        assert!(build_auth_config(None, &args).is_err());

        let config = build_auth_config(Some("KEY".into()), &args).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("KEY"));
        assert_matches!(config.mode, AuthMode::User { email, .. } if email == "a@b.com");
    }

    #[test]
    fn service_account_from_file() {
        let mut key_file = NamedTempFile::new().unwrap();
        let key = json!({
            "type": "service_account",
            "client_email": "sa@demo.iam.gserviceaccount.com",
            "private_key": RS256_PRIVATE_KEY,
        });
        key_file.write_all(key.to_string().as_bytes()).unwrap();

        let args = AuthInputArgs {
            service_account_file: Some(key_file.path().to_path_buf()),
            ..Default::default()
        };
        let config = build_auth_config(None, &args).unwrap();
        assert_matches!(config.mode, AuthMode::ServiceAccount(key) => {
            assert_eq!(key.client_email, "sa@demo.iam.gserviceaccount.com");
        });

        let missing = AuthInputArgs {
            service_account_file: Some("/non/existent/key.json".into()),
            ..Default::default()
        };
        assert!(build_auth_config(None, &missing).is_err());
    }

    #[test]
    fn settings_with_endpoint_base() {
        let mut settings_file = NamedTempFile::new().unwrap();
        settings_file
            .write_all(br#"{"max_retries": 2}"#)
            .unwrap();

        let settings =
            load_settings(Some(settings_file.path()), Some("http://localhost:9099")).unwrap();

        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.endpoints.identity_toolkit.host(), Some("localhost"));
        assert_eq!(settings.endpoints.secure_token.port_u16(), Some(9099));

        assert!(load_settings(Some(Path::new("/non/existent.json")), None).is_err());
    }

    #[test]
    fn invalid_proxy_argument() {
        assert!(parse_proxy("http://").is_err());
        assert!(parse_proxy("http://proxy.local:3128").is_ok());
    }
}

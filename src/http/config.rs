use clap::{error::Error as ClapError, error::ErrorKind};
use http::Uri;
use std::env;
use std::env::VarError;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONN_TIMEOUT: Duration = Duration::from_secs(5);

const HTTP_PROXY_ENV_NAME: &str = "HTTP_PROXY";
const HTTPS_PROXY_ENV_NAME: &str = "HTTPS_PROXY";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub(crate) timeout: Duration,
    pub(crate) conn_timeout: Duration,
    pub(crate) proxy: ProxyUrl,
    /// Extra root certificate (PEM) trusted besides the native roots.
    pub(crate) ca_cert_file: Option<PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            conn_timeout: DEFAULT_CONN_TIMEOUT,
            proxy: ProxyUrl::default(),
            ca_cert_file: None,
        }
    }
}

impl HttpConfig {
    pub fn new(timeout: Duration, conn_timeout: Duration) -> Self {
        Self {
            timeout,
            conn_timeout,
            ..Default::default()
        }
    }

    pub fn with_proxy(self, proxy: ProxyUrl) -> Self {
        Self { proxy, ..self }
    }

    pub fn with_ca_cert_file(self, path: PathBuf) -> Self {
        Self {
            ca_cert_file: Some(path),
            ..self
        }
    }

    pub fn ca_cert_file(&self) -> Option<&Path> {
        self.ca_cert_file.as_deref()
    }

    /// Returns a new instance whose proxy is taken from the standard environment variables
    /// when none was configured explicitly.
    pub fn try_with_proxy_from_env(self) -> Result<Self, ProxyError> {
        self.with_env_aware_proxy(env::var)
    }

    fn with_env_aware_proxy<F>(self, env_var: F) -> Result<Self, ProxyError>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        if !self.proxy.is_empty() {
            return Ok(self);
        }
        let proxy = env_var(HTTPS_PROXY_ENV_NAME)
            .or_else(|_| env_var(HTTP_PROXY_ENV_NAME))
            .unwrap_or_default()
            .as_str()
            .try_into()?;
        Ok(Self { proxy, ..self })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("invalid proxy url `{0}`: `{1}`")]
    InvalidUrl(String, String),
}

/// Proxy url in the `<protocol>://<user>:<password>@<host>:<port>` form. Empty means no proxy.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct ProxyUrl(Option<Uri>);

impl TryFrom<&str> for ProxyUrl {
    type Error = ProxyError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Ok(Self(None));
        }
        let uri = s
            .parse::<Uri>()
            .map_err(|err| ProxyError::InvalidUrl(s.to_string(), err.to_string()))?;
        if uri.host().is_none() {
            return Err(ProxyError::InvalidUrl(s.to_string(), "missing host".into()));
        }
        Ok(Self(Some(uri)))
    }
}

impl Display for ProxyUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(url) => write!(f, "{url}"),
            None => write!(f, ""),
        }
    }
}

impl ProxyUrl {
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl From<ProxyError> for ClapError {
    fn from(err: ProxyError) -> ClapError {
        ClapError::raw(ErrorKind::InvalidValue, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use std::collections::HashMap;

    fn config_with_proxy(url: &str) -> HttpConfig {
        HttpConfig::default().with_proxy(url.try_into().unwrap())
    }

    #[rstest]
    #[case::nothing_configured(&[("SOME_OTHER", "env-variable")], HttpConfig::default(), "")]
    #[case::explicit_proxy(&[], config_with_proxy("http://localhost:8888"), "http://localhost:8888")]
    #[case::explicit_proxy_wins(&[("HTTPS_PROXY", "http://other.proxy:9999")], config_with_proxy("http://localhost:8888"), "http://localhost:8888")]
    #[case::https_proxy_env(&[("HTTPS_PROXY", "http://other.proxy:9999")], HttpConfig::default(), "http://other.proxy:9999")]
    #[case::http_proxy_env(&[("HTTP_PROXY", "http://other.proxy:9999")], HttpConfig::default(), "http://other.proxy:9999")]
    #[case::https_has_priority(&[("HTTPS_PROXY", "http://one.proxy:9999"), ("HTTP_PROXY", "http://other.proxy:9999")], HttpConfig::default(), "http://one.proxy:9999")]
    fn proxy_from_environment(
        #[case] env_values: &[(&'static str, &'static str)],
        #[case] config: HttpConfig,
        #[case] expected: &str,
    ) {
        let env_values: HashMap<_, _> = env_values.iter().copied().collect();
        let config = config
            .with_env_aware_proxy(|k| {
                env_values
                    .get(k)
                    .map(|v| v.to_string())
                    .ok_or(VarError::NotPresent)
            })
            .unwrap();
        assert_eq!(config.proxy, ProxyUrl::try_from(expected).unwrap());
    }

    #[test]
    fn invalid_system_proxy() {
        let result = HttpConfig::default().with_env_aware_proxy(|_| Ok("http://".to_string()));
        assert_matches!(result.unwrap_err(), ProxyError::InvalidUrl(s, _) => {
            assert_eq!(s, "http://".to_string())
        });
    }
}

use crate::http::config::HttpConfig;
use crate::http_client::{HttpClient as TransportClient, HttpClientError};
use http::{Request, Response};
use reqwest::blocking::{Client, Response as BlockingResponse};
use reqwest::{Certificate, Proxy};
use tracing::debug;

/// Blocking transport based on `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, HttpBuildError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_native_certs(true)
            .timeout(config.timeout)
            .connect_timeout(config.conn_timeout);

        if !config.proxy.is_empty() {
            let proxy = Proxy::all(config.proxy.to_string())
                .map_err(|err| HttpBuildError::Proxy(err.to_string()))?;
            builder = builder.proxy(proxy);
        }

        if let Some(path) = config.ca_cert_file() {
            let pem = std::fs::read(path).map_err(|err| {
                HttpBuildError::Certificate(format!("reading {}: {err}", path.display()))
            })?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|err| HttpBuildError::Certificate(err.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|err| HttpBuildError::ClientBuilder(err.to_string()))?;

        Ok(Self { client })
    }
}

impl TransportClient for HttpClient {
    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError> {
        debug!(method = %request.method(), host = ?request.uri().host(), "sending request");

        let (parts, body) = request.into_parts();
        let res = self
            .client
            .request(parts.method, parts.uri.to_string().as_str())
            .headers(parts.headers)
            .body(body)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    HttpClientError::Timeout(err.to_string())
                } else {
                    HttpClientError::TransportError(err.to_string())
                }
            })?;

        try_build_response(res)
    }
}

fn try_build_response(res: BlockingResponse) -> Result<Response<Vec<u8>>, HttpClientError> {
    let status = res.status();
    let version = res.version();
    let headers = res.headers().clone();

    let body: Vec<u8> = res
        .bytes()
        .map_err(|err| HttpClientError::InvalidResponse(err.to_string()))?
        .into();

    let mut response = Response::builder()
        .status(status)
        .version(version)
        .body(body)
        .map_err(|err| HttpClientError::InvalidResponse(err.to_string()))?;
    *response.headers_mut() = headers;

    Ok(response)
}

#[derive(thiserror::Error, Debug)]
pub enum HttpBuildError {
    #[error("could not build the http client: {0}")]
    ClientBuilder(String),
    #[error("invalid proxy configuration: {0}")]
    Proxy(String),
    #[error("invalid root certificate: {0}")]
    Certificate(String),
}

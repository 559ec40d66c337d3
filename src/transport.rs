//! Network collaborator: one GET through the anonymizing SOCKS proxy.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Proxy};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::net::TcpStream;
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }
}

#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("proxy failure: {0}")]
    Proxy(String),
    #[error("too many redirects: {0}")]
    Redirect(String),
    #[error("failed reading body: {0}")]
    Body(String),
    #[error("failed decoding body: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    Request(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Stable short name used in `failed_with_error_<kind>` tags.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout => "timeout",
            TransportError::Connect(_) => "connect",
            TransportError::Proxy(_) => "proxy",
            TransportError::Redirect(_) => "redirect",
            TransportError::Body(_) => "body",
            TransportError::Decode(_) => "decode",
            TransportError::Request(_) => "request",
            TransportError::Other(_) => "other",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = e.to_string();
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            if message.to_ascii_lowercase().contains("socks") {
                TransportError::Proxy(message)
            } else {
                TransportError::Connect(message)
            }
        } else if e.is_redirect() {
            TransportError::Redirect(message)
        } else if e.is_body() {
            TransportError::Body(message)
        } else if e.is_decode() {
            TransportError::Decode(message)
        } else if e.is_builder() || e.is_request() {
            TransportError::Request(message)
        } else {
            TransportError::Other(message)
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<FetchResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a client that tunnels every request through `proxy` (use a
    /// `socks5h://` URL so hidden-service names resolve inside the proxy).
    /// `None` connects directly, which is only useful against local servers.
    pub fn new(proxy: Option<&str>, headers: &BTreeMap<String, String>) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("header {}: {}", name, e)))?;
            default_headers.insert(name, value);
        }

        let mut builder = Client::builder().default_headers(default_headers);
        if let Some(proxy) = proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(Self { client: builder.build()? })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, url: &str, timeout: Duration) -> std::result::Result<FetchResponse, TransportError> {
        let res = self.client.get(url).timeout(timeout).send().await?;
        let status = res.status().as_u16();
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let mut response = FetchResponse {
            status,
            content_type,
            body: String::new(),
        };

        // Anything but an HTML 200 is discarded by the caller; leave it unread.
        if status == 200 && response.is_html() {
            response.body = res.text().await?;
        }
        log::debug!("{} -> {} ({} bytes)", url, status, response.body.len());

        Ok(response)
    }
}

/// Startup probe: confirms something is listening on the proxy's address.
pub async fn check_proxy(proxy: &str, timeout: Duration) -> Result<()> {
    let parsed = Url::parse(proxy).map_err(|e| Error::Config(format!("proxy {}: {}", proxy, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Config(format!("proxy {} has no host", proxy)))?;
    let port = parsed.port_or_known_default().unwrap_or(9050);

    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => Err(Error::Internal(format!("proxy {}:{} did not answer within {:?}", host, port, timeout))),
    }
}

//! HTTP transport boundary.
//!
//! The pipeline only needs `submit(request, timeout) -> response`; the
//! [`Transport`] trait is that seam. The default implementation is a
//! process-wide hyper client over rustls whose root store is the system
//! bundle plus the bundled transactor trust anchor.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure modes, mapped to anomaly categories by the
/// response classifier.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("request throttled")]
    Throttled,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("name resolution failed: {0}")]
    ResolveFailed(String),

    #[error("transport fault: {0}")]
    Other(String),
}

/// An HTTP POST ready for submission.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn uri(&self) -> String {
        format!("https://{}:{}{}", self.host, self.port, self.path)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response, reduced to what classification needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// The submit seam. One live implementation plus test doubles.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

const TRANSACTOR_TRUST_PEM: &[u8] = include_bytes!("../certs/transactor-trust.pem");
const TRUST_ANCHOR_NAME: &str = "datomic-client";

/// hyper-backed transport over rustls.
pub struct HyperTransport {
    client: Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> HyperTransport {
        let tls = rustls::ClientConfig::builder()
            .with_root_certificates(root_store())
            .with_no_client_auth();
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_only()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);
        HyperTransport { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// System CA bundle plus the bundled transactor trust anchor.
fn root_store() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let mut reader: &[u8] = TRANSACTOR_TRUST_PEM;
    for cert in rustls_pemfile::certs(&mut reader) {
        match cert {
            Ok(der) => {
                if let Err(e) = roots.add(der) {
                    tracing::warn!(anchor = TRUST_ANCHOR_NAME, "skipping trust anchor: {e}");
                }
            }
            Err(e) => {
                tracing::warn!(anchor = TRUST_ANCHOR_NAME, "cannot read bundled certificate: {e}");
            }
        }
    }
    roots
}

/// The process-wide transport, created lazily on first use.
pub fn shared() -> Arc<dyn Transport> {
    static SHARED: OnceLock<Arc<HyperTransport>> = OnceLock::new();
    SHARED.get_or_init(|| Arc::new(HyperTransport::new())).clone()
}

#[async_trait]
impl Transport for HyperTransport {
    async fn submit(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri(request.uri());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let req = builder
            .body(Full::new(request.body))
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let exchange = async {
            let response = self.client.request(req).await.map_err(classify_error)?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(hyper::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?
                .to_bytes();
            Ok(HttpResponse {
                status,
                content_type,
                body,
            })
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

fn classify_error(err: hyper_util::client::legacy::Error) -> TransportError {
    let rendered = render_chain(&err);
    if err.is_connect() {
        let lowered = rendered.to_lowercase();
        if lowered.contains("dns") || lowered.contains("lookup") {
            TransportError::ResolveFailed(rendered)
        } else {
            TransportError::ConnectFailed(rendered)
        }
    } else {
        TransportError::Other(rendered)
    }
}

fn render_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

//! The single network seam of the mirror.
//!
//! Everything that talks HTTP goes through [`Transport::get`], which
//! either returns a fully-read response (any status) or a
//! [`TransportError`] for failures below HTTP.  Classifying statuses is
//! left to the callers.  [`ReqwestTransport`] is the production
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

/// Default timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A GET request, rebuilt into a transport-level request per attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Value of a query parameter, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A response whose body has been read in full.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Failures below the HTTP layer (connect, DNS, TLS, timeout, reset).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Connection error: {0}")]
    Connection(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError>;
}

/// [`Transport`] backed by a pooled [`reqwest::Client`].
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .headers(request.headers.clone())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        Ok(FetchResponse::new(status, body.to_vec()))
    }
}

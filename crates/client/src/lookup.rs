//! Read-through lookup of model metadata.
//!
//! [`ModelMetadataManager::fetch`] serves from the on-disk
//! [`MetadataCache`] when it can and otherwise makes a single,
//! non-retried request to the metadata endpoint.  A failed lookup is
//! logged and degrades to an empty document: missing attribution must
//! never stall or abort the mirror.  A corrupt cache entry is fetched
//! again.  Only local cache I/O failures are surfaced.

use std::sync::Arc;

use galsync_core::cache::MetadataCache;
use galsync_core::error::CacheError;
use galsync_core::schema::Document;
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde_json::Value;

use crate::gallery::{SITE_ORIGIN, SITE_REFERER};
use crate::headers::sanitize_headers;
use crate::transport::{FetchRequest, Transport};

/// Metadata endpoint; the model id is appended as the last path segment.
pub const DEFAULT_METADATA_ENDPOINT: &str =
    "https://easel-fgiw.onrender.com/v1/models/metadata-items";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub struct ModelMetadataManager {
    cache: MetadataCache,
    transport: Arc<dyn Transport>,
    endpoint: String,
    headers: HeaderMap,
}

impl ModelMetadataManager {
    pub fn new(cache: MetadataCache, transport: Arc<dyn Transport>) -> Self {
        let headers = sanitize_headers([("Origin", SITE_ORIGIN), ("Referer", SITE_REFERER)]).headers;
        Self {
            cache,
            transport,
            endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            headers,
        }
    }

    /// Point lookups at a different endpoint base.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Metadata for `model_id`; empty when it could not be resolved.
    pub async fn fetch(&self, model_id: &str) -> Result<Document, LookupError> {
        match self.cache.get(model_id) {
            Ok(Some(document)) => return Ok(document),
            Ok(None) => {}
            Err(CacheError::InvalidKey(key)) => {
                tracing::error!(model_id = %key, "Model id is not a valid cache key, skipping lookup");
                return Ok(Document::new());
            }
            Err(CacheError::Corrupt { path, source }) => {
                tracing::warn!(
                    model_id,
                    path = %path.display(),
                    error = %source,
                    "Corrupt cache entry, fetching again",
                );
            }
            Err(e) => return Err(e.into()),
        }

        let Some(url) = self.url_for(model_id) else {
            tracing::error!(model_id, endpoint = %self.endpoint, "Metadata endpoint is not a valid base URL");
            return Ok(Document::new());
        };
        let request = FetchRequest::get(url).headers(self.headers.clone());
        tracing::debug!(model_id, url = %request.url, "Fetching model metadata");

        let response = match self.transport.get(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(model_id, error = %e, "Failed to fetch model metadata");
                return Ok(Document::new());
            }
        };

        if !response.is_success() {
            tracing::error!(
                model_id,
                status = response.status.as_u16(),
                "Failed to fetch model metadata",
            );
            return Ok(Document::new());
        }

        let document = match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Object(document)) => document,
            Ok(_) => {
                tracing::error!(model_id, "Model metadata is not a JSON object");
                return Ok(Document::new());
            }
            Err(e) => {
                tracing::error!(model_id, error = %e, "Model metadata is not valid JSON");
                return Ok(Document::new());
            }
        };

        self.cache.set(model_id, &document)?;
        tracing::info!(model_id, "Cached model metadata");
        Ok(document)
    }

    /// Endpoint with `model_id` appended as one percent-encoded segment.
    fn url_for(&self, model_id: &str) -> Option<String> {
        let mut url = Url::parse(&self.endpoint).ok()?;
        url.path_segments_mut().ok()?.pop_if_empty().push(model_id);
        Some(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::ScriptedTransport;
    use crate::transport::{FetchResponse, TransportError};
    use reqwest::header::{AUTHORIZATION, ORIGIN};
    use reqwest::StatusCode;

    fn manager(dir: &std::path::Path, transport: Arc<ScriptedTransport>) -> ModelMetadataManager {
        ModelMetadataManager::new(MetadataCache::open(dir), transport)
            .with_endpoint("https://meta.test/v1/models/metadata-items/")
    }

    #[tokio::test]
    async fn miss_fetches_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([Ok(FetchResponse::new(
            StatusCode::OK,
            r#"{"id":"m1","name":"Model One"}"#,
        ))]));
        let lookup = manager(dir.path(), transport.clone());

        let doc = lookup.fetch("m1").await.unwrap();

        assert_eq!(doc["name"], "Model One");
        assert!(dir.path().join("m1.json").exists());
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://meta.test/v1/models/metadata-items/m1");
        assert_eq!(requests[0].headers[ORIGIN], SITE_ORIGIN);
        assert!(requests[0].headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn hit_makes_no_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m2.json"), br#"{"id":"m2"}"#).unwrap();
        let transport = Arc::new(ScriptedTransport::new([]));
        let lookup = manager(dir.path(), transport.clone());

        let doc = lookup.fetch("m2").await.unwrap();

        assert_eq!(doc["id"], "m2");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([Ok(FetchResponse::new(
            StatusCode::OK,
            r#"{"id":"m3"}"#,
        ))]));
        let lookup = manager(dir.path(), transport.clone());

        lookup.fetch("m3").await.unwrap();
        lookup.fetch("m3").await.unwrap();

        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn http_error_degrades_to_empty_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([Ok(FetchResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "",
        ))]));
        let lookup = manager(dir.path(), transport.clone());

        let doc = lookup.fetch("m4").await.unwrap();

        assert!(doc.is_empty());
        assert_eq!(transport.requests().len(), 1);
        assert!(!dir.path().join("m4.json").exists());
    }

    #[tokio::test]
    async fn transport_error_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([Err(TransportError::Connection(
            "dns".into(),
        ))]));
        let lookup = manager(dir.path(), transport);

        assert!(lookup.fetch("m5").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_object_body_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([Ok(FetchResponse::new(
            StatusCode::OK,
            "[1,2,3]",
        ))]));
        let lookup = manager(dir.path(), transport);

        assert!(lookup.fetch("m6").await.unwrap().is_empty());
        assert!(!dir.path().join("m6.json").exists());
    }

    #[tokio::test]
    async fn corrupt_entry_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m7.json"), b"{truncated").unwrap();
        let transport = Arc::new(ScriptedTransport::new([Ok(FetchResponse::new(
            StatusCode::OK,
            r#"{"id":"m7"}"#,
        ))]));
        let lookup = manager(dir.path(), transport.clone());

        assert_eq!(lookup.fetch("m7").await.unwrap()["id"], "m7");
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(
            lookup.cache().get("m7").unwrap().unwrap()["id"],
            "m7"
        );
    }

    #[tokio::test]
    async fn model_id_is_percent_encoded_as_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([Ok(FetchResponse::new(
            StatusCode::OK,
            r#"{"id":"odd"}"#,
        ))]));
        let lookup = manager(dir.path(), transport.clone());

        lookup.fetch("a b?c#d").await.unwrap();

        assert_eq!(
            transport.requests()[0].url,
            "https://meta.test/v1/models/metadata-items/a%20b%3Fc%23d"
        );
    }

    #[tokio::test]
    async fn invalid_endpoint_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([]));
        let lookup = ModelMetadataManager::new(MetadataCache::open(dir.path()), transport.clone())
            .with_endpoint("not a url");

        assert!(lookup.fetch("m8").await.unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn unsafe_model_id_is_never_requested() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new([]));
        let lookup = manager(dir.path(), transport.clone());

        assert!(lookup.fetch("../../etc").await.unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }
}

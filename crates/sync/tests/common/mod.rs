#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use galsync_client::gallery::GalleryCursor;
use galsync_client::lookup::ModelMetadataManager;
use galsync_client::transport::{FetchRequest, FetchResponse, Transport, TransportError};
use galsync_core::backoff::BackoffConfig;
use galsync_core::cache::MetadataCache;
use galsync_sync::{Downloader, SyncOptions};
use reqwest::StatusCode;
use serde_json::{json, Value};

pub const GALLERY_URL: &str = "https://api.test/v1/gallery";
pub const METADATA_URL: &str = "https://meta.test/v1/models/metadata-items";
pub const IMAGE_HOST: &str = "https://cdn.test/images";
pub const PAGE_SIZE: u32 = 30;

/// `createdAt` used for every test image, and its Unix time.
pub const CREATED_AT: &str = "2024-04-04T23:29:15.431843Z";
pub const CREATED_AT_UNIX: u64 = 1_712_273_355;

type Outcome = Result<FetchResponse, TransportError>;

/// In-memory HTTP endpoint keyed by route.
///
/// Gallery requests are routed by their `current_page` query parameter,
/// everything else by URL.  Each route replays its queued outcomes in
/// order and then keeps repeating the last one.  Unknown routes answer
/// 404.
#[derive(Default)]
pub struct FakeServer {
    routes: Mutex<HashMap<String, VecDeque<Outcome>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, key: impl Into<String>, outcome: Outcome) {
        self.routes
            .lock()
            .unwrap()
            .entry(key.into())
            .or_default()
            .push_back(outcome);
    }

    pub fn page(&self, index: u64, body: Value) {
        self.route(page_key(index), Ok(ok(body.to_string())));
    }

    pub fn raw_page(&self, index: u64, body: impl Into<Vec<u8>>) {
        self.route(page_key(index), Ok(ok(body)));
    }

    pub fn image(&self, id: &str) {
        self.route(image_url(id), Ok(ok(image_bytes(id))));
    }

    pub fn model(&self, id: &str, body: Value) {
        self.route(model_url(id), Ok(ok(body.to_string())));
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn key_for(request: &FetchRequest) -> String {
        if request.url == GALLERY_URL {
            let page = request.query_value("current_page").unwrap_or("?");
            format!("{GALLERY_URL}#page={page}")
        } else {
            request.url.clone()
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(&Self::key_for(request)) else {
            return Ok(FetchResponse::new(StatusCode::NOT_FOUND, ""));
        };
        if queue.len() > 1 {
            return queue.pop_front().unwrap();
        }
        match queue.front() {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(e)) => Err(TransportError::Connection(e.to_string())),
            None => Ok(FetchResponse::new(StatusCode::NOT_FOUND, "")),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

pub fn ok(body: impl Into<Vec<u8>>) -> FetchResponse {
    FetchResponse::new(StatusCode::OK, body)
}

pub fn page_key(index: u64) -> String {
    format!("{GALLERY_URL}#page={index}")
}

pub fn image_url(id: &str) -> String {
    format!("{IMAGE_HOST}/{id}.png")
}

pub fn model_url(id: &str) -> String {
    format!("{METADATA_URL}/{id}")
}

pub fn image_bytes(id: &str) -> Vec<u8> {
    format!("\u{89}PNG fake payload for {id}").into_bytes()
}

pub fn image(id: &str) -> Value {
    json!({
        "id": id,
        "url": image_url(id),
        "createdAt": CREATED_AT,
        "width": 1024,
    })
}

pub fn generation(inference_id: &str, model_id: &str, loras: &[&str], images: &[&str]) -> Value {
    json!({
        "inferenceId": inference_id,
        "inferenceType": "TEXT_TO_IMAGE",
        "inferencePayload": {
            "prompt": "a lighthouse at dusk",
            "modelId": model_id,
            "lora": loras.iter().map(|id| json!({ "id": id, "weight": 0.8 })).collect::<Vec<_>>(),
        },
        "createdAt": "2024-04-01T00:00:00.000000Z",
        "images": images.iter().map(|id| image(id)).collect::<Vec<_>>(),
    })
}

pub fn upscale(inference_id: &str, images: &[&str]) -> Value {
    json!({
        "inferenceId": inference_id,
        "inferenceType": "UPSCALING",
        "inferencePayload": { "modelId": "should-not-be-looked-up" },
        "images": images.iter().map(|id| image(id)).collect::<Vec<_>>(),
    })
}

pub fn page(items: Vec<Value>, has_next_page: bool) -> Value {
    json!({
        "items": items,
        "paginationMetadata": {
            "hasNextPage": has_next_page,
            "totalItems": 9999,
        },
    })
}

pub fn model(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "activeVersionId": format!("{id}-v2"),
        "author": "someone",
        "externalId": 42,
        "modelProvider": "CIVITAI",
        "description": "not projected",
    })
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_secs: 0.005,
        min_secs: 0.001,
        max_secs: 0.02,
    }
}

pub fn downloader(server: &Arc<FakeServer>, cache_dir: &Path, resave_metadata: bool) -> Downloader {
    let transport: Arc<dyn Transport> = server.clone();
    let lookup = ModelMetadataManager::new(MetadataCache::open(cache_dir), transport.clone())
        .with_endpoint(METADATA_URL);
    Downloader::new(
        lookup,
        transport,
        fast_backoff(),
        SyncOptions { resave_metadata },
    )
}

pub fn cursor() -> GalleryCursor {
    GalleryCursor::new(GALLERY_URL, "test-token", PAGE_SIZE)
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

//! Paginated walk over the gallery endpoint.
//!
//! [`GalleryCursor`] remembers which page comes next.  Each
//! [`fetch_next_page`](GalleryCursor::fetch_next_page) call requests
//! exactly one page through the retry loop and advances the cursor.
//! Pages are zero-based; a cursor may start at any page to resume an
//! interrupted run.

use galsync_core::backoff::Backoff;
use galsync_core::error::SchemaError;
use galsync_core::schema::GalleryPage;
use reqwest::header::HeaderMap;

use crate::headers::{sanitize_headers, DroppedHeader};
use crate::retry::fetch_with_retry;
use crate::transport::{FetchRequest, FetchResponse, Transport};

/// `Origin` sent with every request, as the web client does.
pub const SITE_ORIGIN: &str = "https://www.happyaccidents.ai";

/// `Referer` sent with every request.
pub const SITE_REFERER: &str = "https://www.happyaccidents.ai/";

/// Page size the gallery uses when none is requested.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

pub struct GalleryCursor {
    base_url: String,
    headers: HeaderMap,
    dropped_headers: Vec<DroppedHeader>,
    page_size: u32,
    start_page: u64,
    next_page: u64,
}

impl GalleryCursor {
    /// Cursor positioned at page 0.
    ///
    /// Headers are sanitized once here; anything unsendable (see
    /// [`sanitize_headers`]) is dropped with a warning.
    pub fn new(base_url: impl Into<String>, auth_token: &str, page_size: u32) -> Self {
        let bearer = format!("Bearer {auth_token}");
        let sanitized = sanitize_headers([
            ("Authorization", bearer.as_str()),
            ("Origin", SITE_ORIGIN),
            ("Referer", SITE_REFERER),
        ]);

        Self {
            base_url: base_url.into(),
            headers: sanitized.headers,
            dropped_headers: sanitized.dropped,
            page_size,
            start_page: 0,
            next_page: 0,
        }
    }

    /// Resume from `start_page` instead of page 0.
    pub fn starting_at(mut self, start_page: u64) -> Self {
        self.start_page = start_page;
        self.next_page = start_page;
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn start_page(&self) -> u64 {
        self.start_page
    }

    /// Absolute index of the most recently fetched page.
    pub fn current_page(&self) -> Option<u64> {
        (self.next_page > self.start_page).then(|| self.next_page - 1)
    }

    /// Pages fetched since `start_page`.
    pub fn pages_fetched(&self) -> u64 {
        self.next_page - self.start_page
    }

    /// Headers removed during sanitization.
    pub fn dropped_headers(&self) -> &[DroppedHeader] {
        &self.dropped_headers
    }

    /// The request for absolute page `page`.
    pub fn request_for(&self, page: u64) -> FetchRequest {
        FetchRequest::get(self.base_url.clone())
            .query("current_page", page)
            .query("page_size", self.page_size)
            .query("has_images", true)
            .headers(self.headers.clone())
    }

    /// Fetch the next page (retrying until it succeeds) and advance.
    pub async fn fetch_next_page(
        &mut self,
        transport: &dyn Transport,
        backoff: &mut Backoff,
    ) -> FetchResponse {
        let page = self.next_page;
        let request = self.request_for(page);
        tracing::info!(page, url = %self.base_url, "Fetching gallery page");

        let what = format!("gallery page {page}");
        let fetched = fetch_with_retry(backoff, &what, || transport.get(&request)).await;

        self.next_page += 1;
        fetched.response
    }
}

/// Parse a page response body.
pub fn parse_page(response: &FetchResponse) -> Result<GalleryPage, SchemaError> {
    GalleryPage::from_slice(&response.body)
}

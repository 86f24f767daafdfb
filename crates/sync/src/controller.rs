//! The sync loop.
//!
//! [`Downloader::sync`] walks a [`GalleryCursor`] page by page until the
//! server reports no further pages.  Every image is mirrored at most
//! once: an image whose binary is already on disk is skipped (and its
//! sidecars optionally backfilled), anything else is downloaded through
//! the retry loop and stamped with its upstream timestamps.
//!
//! Pages and images are paced by two independent [`Backoff`] instances,
//! so a slow image host never slows down page fetches and vice versa.
//! Everything runs sequentially; there is at most one request in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use galsync_client::gallery::{parse_page, GalleryCursor};
use galsync_client::lookup::{LookupError, ModelMetadataManager};
use galsync_client::retry::fetch_with_retry;
use galsync_client::transport::{FetchRequest, Transport};
use galsync_core::asset::AssetRecord;
use galsync_core::backoff::{Backoff, BackoffConfig};
use galsync_core::error::{AssetError, SchemaError};
use galsync_core::schema::{Document, InferenceGroup};

use crate::report::SyncReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Write missing sidecars (and re-stamp times) for images that are
    /// already downloaded.
    pub resave_metadata: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Malformed gallery page {page}: {source}")]
    Page {
        page: u64,
        #[source]
        source: SchemaError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Failed to create destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct Downloader {
    lookup: ModelMetadataManager,
    transport: Arc<dyn Transport>,
    page_backoff: Backoff,
    image_backoff: Backoff,
    options: SyncOptions,
}

impl Downloader {
    pub fn new(
        lookup: ModelMetadataManager,
        transport: Arc<dyn Transport>,
        backoff: BackoffConfig,
        options: SyncOptions,
    ) -> Self {
        Self {
            lookup,
            transport,
            page_backoff: Backoff::new(backoff),
            image_backoff: Backoff::new(backoff),
            options,
        }
    }

    /// Mirror every page from the cursor's position to the end of the
    /// gallery into `dest`.
    pub async fn sync(
        &mut self,
        cursor: &mut GalleryCursor,
        dest: &Path,
    ) -> Result<SyncReport, SyncError> {
        std::fs::create_dir_all(dest).map_err(|source| SyncError::Destination {
            path: dest.to_path_buf(),
            source,
        })?;

        self.page_backoff.reset();
        let mut report = SyncReport::new(cursor.page_size(), cursor.start_page());

        tracing::info!(
            start_page = cursor.start_page(),
            page_size = cursor.page_size(),
            dest = %dest.display(),
            resave_metadata = self.options.resave_metadata,
            "Starting gallery sync",
        );

        loop {
            let page_index = cursor.start_page() + cursor.pages_fetched();
            let response = cursor
                .fetch_next_page(self.transport.as_ref(), &mut self.page_backoff)
                .await;
            report.pages_fetched = cursor.pages_fetched();

            if response.body.is_empty() {
                tracing::error!(page = page_index, "Gallery page returned no data, stopping");
                return Ok(report);
            }

            let page = parse_page(&response).map_err(|source| SyncError::Page {
                page: page_index,
                source,
            })?;
            let image_count = page.image_count();
            tracing::info!(
                page = page_index,
                groups = page.items.len(),
                images = image_count,
                "Processing gallery page",
            );

            for group in &page.items {
                self.sync_group(group, dest, &mut report).await?;
            }

            report.last_page_index = Some(page_index);
            report.last_page_items = image_count;
            if page.pagination.total_items.is_some() {
                report.reported_total_items = page.pagination.total_items;
            }

            if !page.pagination.has_next_page {
                report.completed = true;
                tracing::info!(
                    total_pages = page_index + 1,
                    expected_items = report.expected_total_items(),
                    reported_items = report.reported_total_items,
                    "Reached the end of the gallery",
                );
                return Ok(report);
            }
        }
    }

    async fn sync_group(
        &mut self,
        group: &InferenceGroup,
        dest: &Path,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        for image in &group.images {
            report.images_seen += 1;
            // Resolved per image; failed lookups are not cached.
            let model = self.resolve_model(group).await?;
            let record = AssetRecord::new(image, group, model.as_ref(), dest)?;

            if record.binary_exists() {
                report.skipped_existing += 1;
                tracing::debug!(
                    image_id = %image.id,
                    path = %record.binary_path().display(),
                    "Image already downloaded",
                );
                if self.options.resave_metadata {
                    let writes = record.persist_metadata()?;
                    if writes.inference || writes.image {
                        report.metadata_backfilled += 1;
                        tracing::info!(image_id = %image.id, "Backfilled metadata sidecars");
                    }
                }
                continue;
            }

            let request = FetchRequest::get(image.url.clone());
            let what = format!("image {}", image.id);
            let transport = self.transport.as_ref();
            let fetched =
                fetch_with_retry(&mut self.image_backoff, &what, || transport.get(&request)).await;

            record.write_binary(&fetched.response.body)?;
            record.persist_metadata()?;
            report.downloaded += 1;

            tracing::info!(
                image_id = %image.id,
                path = %record.binary_path().display(),
                attempts = fetched.attempts,
                bytes = fetched.response.body.len(),
                "Image downloaded",
            );
        }

        Ok(())
    }

    /// Look up every model the group references and return the primary
    /// model's metadata.  Style lookups only warm the cache.
    async fn resolve_model(&self, group: &InferenceGroup) -> Result<Option<Document>, SyncError> {
        let Some(refs) = group.model_refs()? else {
            tracing::debug!(inference_id = %group.id, "Upscaling job, skipping model lookup");
            return Ok(None);
        };

        for style in refs.styles {
            self.lookup.fetch(style).await?;
        }

        let primary = self.lookup.fetch(refs.primary).await?;
        if primary.is_empty() {
            tracing::warn!(
                inference_id = %group.id,
                model_id = refs.primary,
                "Model metadata unavailable, sidecars will carry no attribution",
            );
            return Ok(None);
        }
        Ok(Some(primary))
    }
}

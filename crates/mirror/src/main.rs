//! `galsync-mirror` -- incremental local mirror of a paginated gallery.
//!
//! Walks the gallery page by page, downloads every image not already on
//! disk and writes JSON sidecars carrying the inference and model
//! metadata.  Safe to re-run: existing images are skipped.
//!
//! Configuration comes from environment variables (a `.env` file is
//! honoured); see [`MirrorConfig::from_env`] for the full list.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use galsync_client::gallery::GalleryCursor;
use galsync_client::lookup::ModelMetadataManager;
use galsync_client::transport::{ReqwestTransport, Transport, DEFAULT_REQUEST_TIMEOUT};
use galsync_core::cache::MetadataCache;
use galsync_mirror::config::MirrorConfig;
use galsync_mirror::{logging, token};
use galsync_sync::Downloader;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match MirrorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = prepare(&config) {
        eprintln!("Startup failed: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Mirror run failed");
            ExitCode::FAILURE
        }
    }
}

/// Create the output directories and install logging.
fn prepare(config: &MirrorConfig) -> anyhow::Result<()> {
    for dir in [
        &config.download_dest,
        &config.model_metadata_dest,
        &config.log_dest,
    ] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }

    let log_file = logging::init(&config.log_dest, config.log_level)
        .with_context(|| format!("failed to create log file in {}", config.log_dest.display()))?;
    tracing::info!(log_file = %log_file.display(), "Logging initialised");
    Ok(())
}

async fn run(config: MirrorConfig) -> anyhow::Result<()> {
    let (auth_token, source) = token::resolve_token(
        config.auth_token.as_deref(),
        &config.auth_token_file,
        &mut std::io::stdin().lock(),
        &mut std::io::stdout(),
    )
    .context("failed to obtain an authorization token")?;
    tracing::info!(source = ?source, "Authorization token resolved");

    let transport: Arc<dyn Transport> = Arc::new(
        ReqwestTransport::new(DEFAULT_REQUEST_TIMEOUT).context("failed to build HTTP client")?,
    );

    let lookup = ModelMetadataManager::new(
        MetadataCache::open(&config.model_metadata_dest),
        transport.clone(),
    )
    .with_endpoint(&config.model_metadata_url);

    let mut cursor = GalleryCursor::new(&config.gallery_url, &auth_token, config.page_size)
        .starting_at(config.start_page);

    tracing::info!(
        gallery_url = %config.gallery_url,
        page_size = config.page_size,
        start_page = config.start_page,
        download_dest = %config.download_dest.display(),
        model_metadata_dest = %config.model_metadata_dest.display(),
        min_backoff = config.min_backoff,
        max_backoff = config.max_backoff,
        "Starting galsync-mirror",
    );

    let mut downloader = Downloader::new(
        lookup,
        transport,
        config.backoff(),
        config.sync_options(),
    );
    let report = downloader
        .sync(&mut cursor, &config.download_dest)
        .await
        .context("gallery sync failed")?;

    tracing::info!(
        completed = report.completed,
        pages_fetched = report.pages_fetched,
        total_pages = report.total_pages(),
        images_seen = report.images_seen,
        downloaded = report.downloaded,
        skipped_existing = report.skipped_existing,
        metadata_backfilled = report.metadata_backfilled,
        expected_items = report.expected_total_items(),
        reported_items = report.reported_total_items,
        "Mirror run finished",
    );
    Ok(())
}

//! Sync pipeline: fetch listing pages, then resolve a preview and a full
//! image for every fetched photo with bounded concurrency, then replay the
//! requests that failed for network reasons.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::gallery::{FetchError, PagingFetcher};
use crate::resolver::{ImageResolver, RetrySummary};
use crate::state::PhotoRecord;
use crate::types::{CacheTier, SizeVariant};

/// Size requested for the preview tier.
pub const PREVIEW_SIZE: SizeVariant = SizeVariant::Medium;
/// Size requested for the full tier.
pub const FULL_SIZE: SizeVariant = SizeVariant::ReservedLarge;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub pages: u32,
    pub page_size: u32,
    pub with_images: bool,
    pub max_retries: u32,
    pub concurrency: usize,
    pub no_progress_bar: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub restored: usize,
    pub pages_fetched: u32,
    pub photos_fetched: usize,
    pub images_resolved: usize,
    pub images_failed: usize,
    pub retried: RetrySummary,
    pub interrupted: bool,
}

/// Create a progress bar with a consistent template.
///
/// Hidden when `--no-progress-bar` was passed or stdout is not a TTY.
pub fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    match ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => tracing::debug!("Progress bar template rejected: {}", e),
    }
    pb
}

pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Run one sync. Page or store failures abort; image failures are counted.
///
/// Cancelling `shutdown` stops new page fetches and new image resolutions.
/// Work already started runs to completion.
pub async fn run_sync(
    fetcher: &PagingFetcher,
    resolver: &ImageResolver,
    options: &SyncOptions,
    shutdown: CancellationToken,
) -> Result<SyncSummary, FetchError> {
    let started = Instant::now();
    let mut summary = SyncSummary {
        restored: fetcher.restore_from_local().await?.len(),
        ..SyncSummary::default()
    };
    tracing::info!(photos = summary.restored, "Restored local snapshot");

    let mut fetched: Vec<PhotoRecord> = Vec::new();
    for _ in 0..options.pages {
        if shutdown.is_cancelled() {
            summary.interrupted = true;
            tracing::info!("Shutdown requested, stopping page fetches");
            break;
        }
        let records = fetcher.fetch_next_page(options.page_size).await?;
        summary.pages_fetched += 1;
        if records.is_empty() {
            tracing::info!("Reached an empty page, stopping");
            break;
        }
        fetched.extend(records);
    }
    summary.photos_fetched = fetched.len();

    if options.with_images && !fetched.is_empty() {
        let (resolved, failed, interrupted) =
            resolve_images(resolver, fetched, options, shutdown.clone()).await;
        summary.images_resolved = resolved;
        summary.images_failed = failed;
        summary.interrupted |= interrupted;

        if resolver.pending_count() > 0 && !shutdown.is_cancelled() {
            tracing::info!(
                "── Cleanup pass: retrying {} image requests that failed on the network ──",
                resolver.pending_count()
            );
            summary.retried = resolver.retry_all_pending().await;
            summary.images_resolved += summary.retried.succeeded;
            summary.images_failed -= summary.retried.succeeded.min(summary.images_failed);
        }
    }

    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} pages, {} photos, {} images resolved, {} failed",
        summary.pages_fetched,
        summary.photos_fetched,
        summary.images_resolved,
        summary.images_failed
    );
    tracing::info!("  elapsed: {}", format_duration(started.elapsed()));
    Ok(summary)
}

/// Resolve preview then full for each record. Returns (resolved, failed,
/// interrupted).
async fn resolve_images(
    resolver: &ImageResolver,
    records: Vec<PhotoRecord>,
    options: &SyncOptions,
    shutdown: CancellationToken,
) -> (usize, usize, bool) {
    let pb = create_progress_bar(options.no_progress_bar, records.len() as u64);
    let total = records.len();
    let max_retries = options.max_retries;
    let shutdown_ref = &shutdown;

    let results: Vec<(usize, usize)> = stream::iter(records)
        .take_while(|_| std::future::ready(!shutdown_ref.is_cancelled()))
        .map(|record| async move {
            let mut ok = 0;
            let mut failed = 0;
            for (size, tier) in [(PREVIEW_SIZE, CacheTier::Preview), (FULL_SIZE, CacheTier::Full)] {
                match resolver.resolve(&record, size, tier, max_retries).await {
                    Ok(_) => ok += 1,
                    Err(_) => failed += 1,
                }
            }
            (ok, failed)
        })
        .buffer_unordered(options.concurrency.max(1))
        .inspect(|_| pb.inc(1))
        .collect()
        .await;

    pb.finish_and_clear();
    let interrupted = results.len() < total;
    if interrupted {
        tracing::info!("Shutdown requested, stopped after {} of {} photos", results.len(), total);
    }
    let (resolved, failed) = results
        .into_iter()
        .fold((0, 0), |(a, b), (ok, bad)| (a + ok, b + bad));
    (resolved, failed, interrupted)
}

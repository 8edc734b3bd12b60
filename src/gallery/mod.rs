//! Page-by-page acquisition of recent photos into the local store.

pub mod error;

pub use error::FetchError;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::cache::BinaryCache;
use crate::flickr::FlickrClient;
use crate::resolver::ImageResolver;
use crate::state::{PhotoFilter, PhotoRecord, PhotoRepository, SortKey};

/// First page number the photo API accepts.
pub const FIRST_PAGE: u32 = 1;

/// Default listing page size.
pub const DEFAULT_PAGE_SIZE: u32 = 30;

pub struct PagingFetcher {
    client: Arc<FlickrClient>,
    repo: Arc<dyn PhotoRepository>,
    cache: Arc<BinaryCache>,
    resolver: Arc<ImageResolver>,
    /// Next page to fetch. Held for the whole of a fetch, so page fetches
    /// on one fetcher never overlap.
    cursor: Mutex<u32>,
}

impl std::fmt::Debug for PagingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagingFetcher").finish_non_exhaustive()
    }
}

impl PagingFetcher {
    pub fn new(
        client: Arc<FlickrClient>,
        repo: Arc<dyn PhotoRepository>,
        cache: Arc<BinaryCache>,
        resolver: Arc<ImageResolver>,
    ) -> Self {
        Self {
            client,
            repo,
            cache,
            resolver,
            cursor: Mutex::new(FIRST_PAGE),
        }
    }

    /// Page that the next [`fetch_next_page`](Self::fetch_next_page) will request.
    pub async fn next_page(&self) -> u32 {
        *self.cursor.lock().await
    }

    /// Fetch one page, store any new photos, and return the stored records
    /// for exactly the photos on that page, oldest first.
    ///
    /// The cursor moves past `page` only when the fetch succeeds.
    pub async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Vec<PhotoRecord>, FetchError> {
        let mut cursor = self.cursor.lock().await;
        let records = self.fetch_page_locked(page, page_size).await?;
        *cursor = (*cursor).max(page.saturating_add(1));
        Ok(records)
    }

    /// Fetch the page under the cursor.
    pub async fn fetch_next_page(&self, page_size: u32) -> Result<Vec<PhotoRecord>, FetchError> {
        let mut cursor = self.cursor.lock().await;
        let page = *cursor;
        let records = self.fetch_page_locked(page, page_size).await?;
        *cursor = page.saturating_add(1);
        Ok(records)
    }

    async fn fetch_page_locked(&self, page: u32, page_size: u32) -> Result<Vec<PhotoRecord>, FetchError> {
        let raw_photos = self.client.fetch_recent_page(page, page_size).await?;

        let mut local_ids = HashSet::with_capacity(raw_photos.len());
        for raw in &raw_photos {
            let record = self.repo.find_or_create(raw).await?;
            local_ids.insert(record.local_id);
        }
        self.repo.persist_pending().await?;

        let records = self
            .repo
            .query_all(
                Some(&PhotoFilter::LocalIds(local_ids)),
                &[SortKey::created(true)],
            )
            .await?;
        info!(page, photos = records.len(), "Fetched page");
        Ok(records)
    }

    /// Everything already stored, newest first. No network access.
    pub async fn restore_from_local(&self) -> Result<Vec<PhotoRecord>, FetchError> {
        Ok(self.repo.query_all(None, &[SortKey::created(false)]).await?)
    }

    /// Clear the image cache, the store and the resolver's retry queue,
    /// rewind to the first page, and fetch it again.
    pub async fn reset_and_refetch(&self, page_size: u32) -> Result<Vec<PhotoRecord>, FetchError> {
        let mut cursor = self.cursor.lock().await;
        self.cache.reset_all().await?;
        self.repo.reset_all().await?;
        let dropped = self.resolver.clear_pending();
        *cursor = FIRST_PAGE;
        info!(dropped_retries = dropped, "Reset local state");

        let records = self.fetch_page_locked(FIRST_PAGE, page_size).await?;
        *cursor = FIRST_PAGE + 1;
        Ok(records)
    }
}

//! Image resolution: cache check, network fetch, size fallback.
//!
//! A request for `(photo, tier)` is answered from the binary cache when
//! possible. On a miss the image is fetched at the requested size; a 404 or
//! 410 falls back to the source-default size while the retry budget lasts.
//! Successful fetches are decoded once to reject non-image bodies, then
//! written to the cache under the tier (not the size), so later requests for
//! the same tier never hit the network regardless of size.

pub mod error;
mod pending;

pub use error::ImageError;
pub use pending::PendingRequest;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::cache::BinaryCache;
use crate::flickr::{ApiError, FlickrClient, DEFAULT_CONCURRENCY};
use crate::state::PhotoRecord;
use crate::types::{CacheTier, SizeVariant};
use pending::PendingQueue;

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Outcome of one [`ImageResolver::retry_all_pending`] round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct ImageResolver {
    client: Arc<FlickrClient>,
    cache: Arc<BinaryCache>,
    in_flight: Mutex<HashMap<(String, CacheTier), KeyLock>>,
    pending: Mutex<PendingQueue>,
    concurrency: usize,
}

impl std::fmt::Debug for ImageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResolver")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl ImageResolver {
    pub fn new(client: Arc<FlickrClient>, cache: Arc<BinaryCache>) -> Self {
        Self {
            client,
            cache,
            in_flight: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingQueue::default()),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Concurrency used when draining the pending queue.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Resolve the image bytes for `record` at `tier`.
    ///
    /// Concurrent calls for the same `(external id, tier)` are serialized,
    /// so only the first reaches the network and the rest see its cached
    /// result. Connection-level failures are remembered for
    /// [`retry_all_pending`](Self::retry_all_pending).
    pub async fn resolve(
        &self,
        record: &PhotoRecord,
        size: SizeVariant,
        tier: CacheTier,
        max_retries: u32,
    ) -> Result<Bytes, ImageError> {
        let key = (record.external_id.clone(), tier);
        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_uncoalesced(record, size, tier, max_retries).await
        };
        self.release_key_lock(&key, lock);

        match &result {
            Ok(_) => self.with_pending(|q| q.remove(&record.external_id, tier)),
            Err(e) if e.is_network() => {
                warn!(photo_id = %record.external_id, %tier, "Queued for retry: {}", e);
                self.with_pending(|q| {
                    q.insert(PendingRequest {
                        record: record.clone(),
                        size,
                        tier,
                        max_retries,
                    })
                });
            }
            Err(e) => {
                tracing::error!(photo_id = %record.external_id, %tier, "Failed to resolve image: {}", e);
            }
        }
        result
    }

    async fn resolve_uncoalesced(
        &self,
        record: &PhotoRecord,
        size: SizeVariant,
        tier: CacheTier,
        max_retries: u32,
    ) -> Result<Bytes, ImageError> {
        if let Some(bytes) = self.cache.get(&record.external_id, tier).await? {
            return Ok(bytes);
        }

        let mut size = size;
        let mut remaining = max_retries;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let url = record.image_url(size);
            debug!(photo_id = %record.external_id, ?size, %tier, attempt = attempts, "Fetching image");

            match self.client.fetch_image_bytes(&url).await {
                Ok(bytes) => {
                    check_decodable(bytes.clone()).await?;
                    self.cache.put(&record.external_id, tier, bytes.clone()).await?;
                    return Ok(bytes);
                }
                Err(ApiError::HttpStatus {
                    status: status @ (404 | 410),
                    ..
                }) => {
                    if remaining == 0 {
                        return Err(ImageError::NotFoundAfterRetries {
                            photo_id: record.external_id.clone(),
                            attempts,
                        });
                    }
                    remaining -= 1;
                    warn!(
                        photo_id = %record.external_id,
                        status,
                        ?size,
                        "Image size unavailable, falling back to default size"
                    );
                    size = SizeVariant::SourceDefault;
                }
                Err(e) => return Err(ImageError::Transport(e)),
            }
        }
    }

    /// Replay every request that failed for network reasons.
    ///
    /// The current queue is taken as a snapshot; failures during the round
    /// land in a fresh queue for the next call.
    pub async fn retry_all_pending(&self) -> RetrySummary {
        let round = self.with_pending(PendingQueue::take_round);
        if round.is_empty() {
            return RetrySummary::default();
        }
        tracing::info!(count = round.len(), "Retrying pending image requests");

        let attempted = round.len();
        let succeeded = stream::iter(round)
            .map(|req| async move {
                self.resolve(&req.record, req.size, req.tier, req.max_retries)
                    .await
                    .is_ok()
            })
            .buffer_unordered(self.concurrency)
            .filter(|ok| std::future::ready(*ok))
            .count()
            .await;

        RetrySummary {
            attempted,
            succeeded,
            failed: attempted - succeeded,
        }
    }

    /// Number of requests waiting for the next retry round.
    pub fn pending_count(&self) -> usize {
        self.with_pending(|q| q.len())
    }

    /// Drop every queued retry without running it. Returns how many were dropped.
    pub fn clear_pending(&self) -> usize {
        let dropped = self.with_pending(PendingQueue::take_round).len();
        if dropped > 0 {
            debug!(dropped, "Cleared pending image requests");
        }
        dropped
    }

    fn with_pending<T>(&self, f: impl FnOnce(&mut PendingQueue) -> T) -> T {
        let mut queue = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut queue)
    }

    fn key_lock(&self, key: &(String, CacheTier)) -> KeyLock {
        let mut map = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(map.entry(key.clone()).or_default())
    }

    /// Drop the map entry once no other caller holds or waits on it.
    fn release_key_lock(&self, key: &(String, CacheTier), lock: KeyLock) {
        drop(lock);
        let mut map = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if map.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(key);
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}

/// Reject bodies that don't decode as an image.
async fn check_decodable(bytes: Bytes) -> Result<(), ImageError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes).map(|_| ()))
        .await
        .map_err(|e| ImageError::Decode(format!("decode task failed: {e}")))?
        .map_err(|e| ImageError::Decode(e.to_string()))
}

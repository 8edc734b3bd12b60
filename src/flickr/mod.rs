//! Photo API client. Issues recent-photo listings and image downloads
//! against the Flickr REST endpoint and CDN on a bounded worker pool.

pub mod error;
pub mod session;
pub mod types;
pub mod urls;

pub use error::ApiError;
pub use session::{HttpResponse, HttpTransport};
pub use types::RawPhoto;

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::retry::{self, RetryAction, RetryConfig};

/// Default number of concurrent network operations.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Client for the photo API.
///
/// Every request runs as its own task gated by a semaphore, so callers
/// never block on the network from their own task and at most
/// `concurrency` requests are in flight at once.
pub struct FlickrClient {
    transport: Arc<dyn HttpTransport>,
    api_key: String,
    base_url: String,
    workers: Arc<Semaphore>,
    retry: RetryConfig,
}

impl std::fmt::Debug for FlickrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlickrClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FlickrClient {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: impl Into<String>, concurrency: usize) -> Self {
        Self {
            transport,
            api_key: api_key.into(),
            base_url: urls::API_BASE_URL.to_string(),
            workers: Arc::new(Semaphore::new(concurrency.max(1))),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch one page of recent photos.
    ///
    /// Status 100 (or the equivalent `stat: "fail"` envelope) maps to
    /// `InvalidCredentials`. Malformed entries are dropped, not fatal.
    /// Transient failures are retried per the client's `RetryConfig`.
    pub async fn fetch_recent_page(&self, page: u32, per_page: u32) -> Result<Vec<RawPhoto>, ApiError> {
        let query = vec![
            ("method", urls::RECENT_PHOTOS_METHOD.to_string()),
            ("api_key", self.api_key.clone()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
            ("format", "json".to_string()),
            ("nojsoncallback", "1".to_string()),
            ("extras", urls::recent_extras()),
        ];

        let label = format!("Recent photos page {page}");
        retry::retry_with_backoff(
            &self.retry,
            &label,
            |e: &ApiError| {
                if e.is_transient() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            || async {
                let resp = self.dispatch(self.base_url.clone(), query.clone()).await?;
                match resp.status {
                    100 => Err(ApiError::InvalidCredentials),
                    200..=299 => types::parse_recent_photos(&resp.body),
                    status => Err(ApiError::HttpStatus {
                        status,
                        url: self.base_url.clone(),
                    }),
                }
            },
        )
        .await
    }

    /// Download the raw bytes behind an already-resolved image URL.
    pub async fn fetch_image_bytes(&self, url: &str) -> Result<Bytes, ApiError> {
        let resp = self.dispatch(url.to_string(), Vec::new()).await?;
        if (200..300).contains(&resp.status) {
            Ok(resp.body)
        } else {
            Err(ApiError::HttpStatus {
                status: resp.status,
                url: url.to_string(),
            })
        }
    }

    /// Run one GET on the worker pool.
    async fn dispatch(
        &self,
        url: String,
        query: Vec<(&'static str, String)>,
    ) -> Result<HttpResponse, ApiError> {
        let transport = Arc::clone(&self.transport);
        let workers = Arc::clone(&self.workers);
        let task_url = url.clone();
        let handle = tokio::spawn(async move {
            let _permit = workers.acquire_owned().await.map_err(|e| ApiError::Transport {
                url: task_url.clone(),
                message: e.to_string(),
            })?;
            debug!(url = %task_url, "GET");
            transport.get(&task_url, &query).await
        });
        handle.await.map_err(|e| ApiError::Transport {
            url,
            message: format!("worker task failed: {e}"),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::session::testing::ScriptedTransport;
    use super::*;
    use serde_json::json;

    const BASE: &str = "http://api.test/rest";

    fn client(transport: &Arc<ScriptedTransport>) -> FlickrClient {
        FlickrClient::new(transport.clone(), "KEY", 2)
            .with_base_url(BASE)
            .with_retry(RetryConfig::none())
    }

    fn page_body() -> String {
        json!({"photos": {"photo": [
            {"id": "1", "server": "s", "secret": "x", "farm": 3, "title": "one"},
        ]}, "stat": "ok"})
        .to_string()
    }

    #[tokio::test]
    async fn test_recent_page_query_parameters() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(BASE, 200, page_body());
        let photos = client(&transport).fetch_recent_page(3, 25).await.unwrap();
        assert_eq!(photos.len(), 1);

        let query = transport.last_query().unwrap();
        let get = |k: &str| {
            query
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("method"), "flickr.photos.getRecent");
        assert_eq!(get("api_key"), "KEY");
        assert_eq!(get("per_page"), "25");
        assert_eq!(get("page"), "3");
        assert_eq!(get("format"), "json");
        assert_eq!(get("nojsoncallback"), "1");
        assert_eq!(get("extras"), "url_o,media");
    }

    #[tokio::test]
    async fn test_status_100_is_invalid_credentials() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(BASE, 100, "");
        let err = client(&transport).fetch_recent_page(1, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_other_status_is_http_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(BASE, 403, "");
        let err = client(&transport).fetch_recent_page(1, 10).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_transient_page_failure_is_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(BASE, 503, "");
        transport.respond(BASE, 200, page_body());
        let client = client(&transport).with_retry(RetryConfig {
            max_retries: 2,
            base_delay: std::time::Duration::ZERO,
            max_delay: std::time::Duration::ZERO,
        });
        let photos = client.fetch_recent_page(1, 10).await.unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(transport.calls_to(BASE), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(BASE, 200, "not json");
        let client = client(&transport).with_retry(RetryConfig {
            max_retries: 3,
            base_delay: std::time::Duration::ZERO,
            max_delay: std::time::Duration::ZERO,
        });
        let err = client.fetch_recent_page(1, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
        assert_eq!(transport.calls_to(BASE), 1);
    }

    #[tokio::test]
    async fn test_fetch_image_bytes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("http://cdn.test/ok.jpg", 200, &b"jpegdata"[..]);
        let client = client(&transport);
        let bytes = client.fetch_image_bytes("http://cdn.test/ok.jpg").await.unwrap();
        assert_eq!(&bytes[..], b"jpegdata");

        let err = client
            .fetch_image_bytes("http://cdn.test/missing.jpg")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail("http://cdn.test/down.jpg", "connection reset");
        let err = client(&transport)
            .fetch_image_bytes("http://cdn.test/down.jpg")
            .await
            .unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn test_debug_redacts_key() {
        let transport = Arc::new(ScriptedTransport::new());
        let rendered = format!("{:?}", client(&transport));
        assert!(!rendered.contains("KEY"));
    }
}

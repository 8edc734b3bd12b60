use thiserror::Error;

use crate::cache::CacheError;
use crate::flickr::ApiError;

/// Terminal outcomes of resolving one image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Transport(ApiError),

    /// The server answered 2xx but the body is not an image.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Image {photo_id} not found after {attempts} attempt(s)")]
    NotFoundAfterRetries { photo_id: String, attempts: u32 },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ImageError {
    /// Whether the failure happened below HTTP and may succeed once the
    /// network is back.
    pub fn is_network(&self) -> bool {
        matches!(self, ImageError::Transport(e) if e.is_network())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_failures_are_network() {
        let network = ImageError::Transport(ApiError::Transport {
            url: "u".into(),
            message: "reset".into(),
        });
        assert!(network.is_network());

        let status = ImageError::Transport(ApiError::HttpStatus {
            status: 500,
            url: "u".into(),
        });
        assert!(!status.is_network());
        assert!(!ImageError::Decode("bad".into()).is_network());
    }

    #[test]
    fn test_not_found_message() {
        let e = ImageError::NotFoundAfterRetries {
            photo_id: "42".into(),
            attempts: 2,
        };
        assert_eq!(e.to_string(), "Image 42 not found after 2 attempt(s)");
    }
}

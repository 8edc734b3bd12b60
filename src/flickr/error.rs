use thiserror::Error;

/// Errors surfaced by the photo API client.
///
/// `Transport` covers failures where no HTTP status was received at all;
/// those are the ones worth retrying once the network comes back.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Invalid API key")]
    InvalidCredentials,

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a page listing hitting this error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ApiError::InvalidCredentials | ApiError::Parse(_) | ApiError::Api { .. } => false,
        }
    }

    /// Whether the failure happened below HTTP (no response received).
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> ApiError {
        ApiError::HttpStatus {
            status,
            url: "x".into(),
        }
    }

    #[test]
    fn test_404_not_transient() {
        assert!(!status(404).is_transient());
        assert_eq!(status(404).status(), Some(404));
    }

    #[test]
    fn test_429_and_5xx_transient() {
        assert!(status(429).is_transient());
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
    }

    #[test]
    fn test_transport_is_network_and_transient() {
        let e = ApiError::Transport {
            url: "x".into(),
            message: "connection refused".into(),
        };
        assert!(e.is_transient());
        assert!(e.is_network());
        assert_eq!(e.status(), None);
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(!ApiError::InvalidCredentials.is_transient());
        assert!(!ApiError::Parse("bad".into()).is_transient());
        assert!(!ApiError::Api {
            code: 105,
            message: "Service currently unavailable".into()
        }
        .is_network());
    }
}

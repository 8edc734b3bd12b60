use serde_json::Value;
use tracing::warn;

use super::error::ApiError;

/// Upstream code meaning the API key was rejected.
const INVALID_API_KEY_CODE: i64 = 100;

/// One photo entry from a `photos.photo` listing, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPhoto {
    pub id: String,
    pub server: String,
    pub secret: String,
    pub farm: i64,
    pub title: String,
    /// Original-size URL, present only when the listing carried `url_o`.
    pub url_o: Option<String>,
}

impl RawPhoto {
    /// Validate one listing entry. Returns `None` when any of `id`,
    /// `server`, `secret`, `farm`, `title` is missing or mistyped, or when
    /// the id could not serve as a file name.
    pub fn from_json(entry: &Value) -> Option<Self> {
        let id = entry["id"].as_str().filter(|id| is_usable_id(id))?;
        Some(Self {
            id: id.to_string(),
            server: entry["server"].as_str()?.to_string(),
            secret: entry["secret"].as_str()?.to_string(),
            farm: entry["farm"].as_i64()?,
            title: entry["title"].as_str()?.to_string(),
            url_o: entry["url_o"].as_str().map(str::to_string),
        })
    }
}

fn is_usable_id(id: &str) -> bool {
    !matches!(id, "" | "." | "..") && !id.contains(['/', '\\'])
}

/// Parse a recent-photos response body into validated records.
///
/// Malformed entries are dropped individually; only an unreadable body, a
/// `stat: "fail"` envelope, or a missing `photos.photo` array fails the page.
pub fn parse_recent_photos(body: &[u8]) -> Result<Vec<RawPhoto>, ApiError> {
    let json: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::Parse(format!("JSON deserialization failed: {e}")))?;

    if json["stat"].as_str() == Some("fail") {
        let code = json["code"].as_i64().unwrap_or(0);
        if code == INVALID_API_KEY_CODE {
            return Err(ApiError::InvalidCredentials);
        }
        return Err(ApiError::Api {
            code,
            message: json["message"].as_str().unwrap_or("").to_string(),
        });
    }

    let entries = json["photos"]["photo"]
        .as_array()
        .ok_or_else(|| ApiError::Parse("missing photos.photo array".to_string()))?;

    let photos: Vec<RawPhoto> = entries
        .iter()
        .filter_map(|entry| {
            let parsed = RawPhoto::from_json(entry);
            if parsed.is_none() {
                warn!(id = %entry["id"], "Dropping malformed photo entry");
            }
            parsed
        })
        .collect();

    Ok(photos)
}

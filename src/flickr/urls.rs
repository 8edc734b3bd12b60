//! Pure URL formatting for photo API resources.

use crate::types::SizeVariant;

pub const API_BASE_URL: &str = "https://api.flickr.com/services/rest";
pub const CDN_HOST: &str = "staticflickr.com";
pub const RECENT_PHOTOS_METHOD: &str = "flickr.photos.getRecent";

/// Build the CDN URL for one size of a photo.
///
/// `https://farm{farm}.{cdn}/{server}/{id}_{secret}{suffix}.jpg`
pub fn image_url(
    external_id: &str,
    server_id: &str,
    farm_id: i64,
    secret: &str,
    size: SizeVariant,
) -> String {
    format!(
        "https://farm{farm_id}.{CDN_HOST}/{server_id}/{external_id}_{secret}{}.jpg",
        size.url_suffix()
    )
}

/// Comma-joined `extras` request value: the original-size URL plus media type.
pub fn recent_extras() -> String {
    [SizeVariant::Original.extras_field().unwrap_or("url_o"), "media"].join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_url_medium() {
        assert_eq!(
            image_url("5123", "65535", 66, "abcdef", SizeVariant::Medium),
            "https://farm66.staticflickr.com/65535/5123_abcdef_m.jpg"
        );
    }

    #[test]
    fn test_image_url_source_default_has_no_suffix() {
        assert_eq!(
            image_url("5123", "65535", 66, "abcdef", SizeVariant::SourceDefault),
            "https://farm66.staticflickr.com/65535/5123_abcdef.jpg"
        );
    }

    #[test]
    fn test_extras() {
        assert_eq!(recent_extras(), "url_o,media");
    }
}

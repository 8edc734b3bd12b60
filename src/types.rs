/// Upstream image resolution class.
///
/// Each variant maps to a URL suffix token on the CDN and to the field name
/// the photo API uses when the URL is requested through `extras`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SizeVariant {
    Original,
    Medium,
    Small,
    #[value(name = "large")]
    ReservedLarge,
    #[value(name = "default")]
    SourceDefault,
}

impl SizeVariant {
    /// Suffix appended after `{id}_{secret}` in a derived image URL.
    pub fn url_suffix(&self) -> &'static str {
        match self {
            Self::Original => "_o",
            Self::Medium => "_m",
            Self::Small => "_s",
            Self::ReservedLarge => "_b",
            Self::SourceDefault => "",
        }
    }

    /// Field carrying this size's URL in a photo API response, when any.
    pub fn extras_field(&self) -> Option<&'static str> {
        match self {
            Self::Original => Some("url_o"),
            Self::Medium => Some("url_m"),
            Self::Small => Some("url_s"),
            Self::ReservedLarge => Some("url_b"),
            Self::SourceDefault => None,
        }
    }
}

/// Binary cache namespace for one photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum CacheTier {
    Preview,
    Full,
}

impl CacheTier {
    /// Durable file-name prefix for this tier.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Preview => "preview_",
            Self::Full => "",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Full => "full",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffixes_are_distinct() {
        let all = [
            SizeVariant::Original,
            SizeVariant::Medium,
            SizeVariant::Small,
            SizeVariant::ReservedLarge,
            SizeVariant::SourceDefault,
        ];
        let suffixes: std::collections::HashSet<_> = all.iter().map(|s| s.url_suffix()).collect();
        assert_eq!(suffixes.len(), all.len());
    }

    #[test]
    fn test_source_default_has_no_extras_field() {
        assert_eq!(SizeVariant::SourceDefault.extras_field(), None);
        assert_eq!(SizeVariant::Original.extras_field(), Some("url_o"));
    }

    #[test]
    fn test_tier_prefix() {
        assert_eq!(CacheTier::Preview.prefix(), "preview_");
        assert_eq!(CacheTier::Full.prefix(), "");
    }
}

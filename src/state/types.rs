//! Record and query types for the metadata store.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::flickr::{urls, RawPhoto};
use crate::types::SizeVariant;

/// One remote photo as stored locally. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoRecord {
    /// Local identity, assigned on first insert.
    pub local_id: i64,
    /// Upstream photo id; the dedup key.
    pub external_id: String,
    pub title: String,
    pub server_id: String,
    pub secret: String,
    /// Canonical image URL: the feed's `url_o` when supplied, else derived.
    pub source_url: String,
    pub farm_id: i64,
    /// Local insert time, used for ordering.
    pub created_at: DateTime<Utc>,
}

impl PhotoRecord {
    pub(crate) fn from_raw(raw: &RawPhoto, local_id: i64, created_at: DateTime<Utc>) -> Self {
        let source_url = raw.url_o.clone().unwrap_or_else(|| {
            urls::image_url(
                &raw.id,
                &raw.server,
                raw.farm,
                &raw.secret,
                SizeVariant::SourceDefault,
            )
        });
        Self {
            local_id,
            external_id: raw.id.clone(),
            title: raw.title.clone(),
            server_id: raw.server.clone(),
            secret: raw.secret.clone(),
            source_url,
            farm_id: raw.farm,
            created_at,
        }
    }

    /// URL of this photo at the given size. The source-default size uses
    /// the stored canonical URL.
    pub fn image_url(&self, size: SizeVariant) -> String {
        match size {
            SizeVariant::SourceDefault => self.source_url.clone(),
            other => urls::image_url(
                &self.external_id,
                &self.server_id,
                self.farm_id,
                &self.secret,
                other,
            ),
        }
    }
}

/// Predicate over stored records.
#[derive(Debug, Clone)]
pub enum PhotoFilter {
    LocalIds(HashSet<i64>),
    ExternalIds(HashSet<String>),
    CreatedAfter(DateTime<Utc>),
}

impl PhotoFilter {
    pub fn matches(&self, record: &PhotoRecord) -> bool {
        match self {
            Self::LocalIds(ids) => ids.contains(&record.local_id),
            Self::ExternalIds(ids) => ids.contains(&record.external_id),
            Self::CreatedAfter(at) => record.created_at > *at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Title,
    ExternalId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub ascending: bool,
}

impl SortKey {
    pub fn created(ascending: bool) -> Self {
        Self {
            field: SortField::CreatedAt,
            ascending,
        }
    }

    fn compare(&self, a: &PhotoRecord, b: &PhotoRecord) -> Ordering {
        let ord = match self.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Title => a.title.cmp(&b.title),
            SortField::ExternalId => a.external_id.cmp(&b.external_id),
        };
        if self.ascending {
            ord
        } else {
            ord.reverse()
        }
    }
}

/// Sort records by `keys` in order. Ties fall back to insertion order,
/// in the direction of the first key.
pub(crate) fn sort_records(records: &mut [PhotoRecord], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    let ascending = keys[0].ascending;
    records.sort_by(|a, b| {
        keys.iter()
            .map(|k| k.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| {
                let ord = a.local_id.cmp(&b.local_id);
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(id: &str, url_o: Option<&str>) -> RawPhoto {
        RawPhoto {
            id: id.to_string(),
            server: "65535".to_string(),
            secret: "abc".to_string(),
            farm: 66,
            title: format!("title {id}"),
            url_o: url_o.map(str::to_string),
        }
    }

    fn record(local_id: i64, title: &str, millis: i64) -> PhotoRecord {
        let mut r = PhotoRecord::from_raw(&raw(title, None), local_id, Utc::now());
        r.created_at = Utc.timestamp_millis_opt(millis).unwrap();
        r.title = title.to_string();
        r
    }

    #[test]
    fn test_source_url_derived_when_absent() {
        let r = PhotoRecord::from_raw(&raw("42", None), 1, Utc::now());
        assert_eq!(r.source_url, "https://farm66.staticflickr.com/65535/42_abc.jpg");
    }

    #[test]
    fn test_source_url_from_feed() {
        let r = PhotoRecord::from_raw(&raw("42", Some("https://live/orig.jpg")), 1, Utc::now());
        assert_eq!(r.source_url, "https://live/orig.jpg");
        assert_eq!(r.image_url(SizeVariant::SourceDefault), "https://live/orig.jpg");
        assert_eq!(
            r.image_url(SizeVariant::ReservedLarge),
            "https://farm66.staticflickr.com/65535/42_abc_b.jpg"
        );
    }

    #[test]
    fn test_sort_created_with_insertion_tiebreak() {
        let mut records = vec![record(3, "c", 10), record(1, "a", 10), record(2, "b", 5)];
        sort_records(&mut records, &[SortKey::created(true)]);
        let ids: Vec<_> = records.iter().map(|r| r.local_id).collect();
        assert_eq!(ids, [2, 1, 3]);

        sort_records(&mut records, &[SortKey::created(false)]);
        let ids: Vec<_> = records.iter().map(|r| r.local_id).collect();
        assert_eq!(ids, [3, 1, 2]);
    }

    #[test]
    fn test_sort_secondary_key() {
        let mut records = vec![record(1, "b", 10), record(2, "a", 10)];
        sort_records(
            &mut records,
            &[
                SortKey::created(true),
                SortKey {
                    field: SortField::Title,
                    ascending: true,
                },
            ],
        );
        assert_eq!(records[0].title, "a");
    }

    #[test]
    fn test_serializes_for_listing() {
        let r = record(7, "x", 0);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["external_id"], "x");
        assert_eq!(json["local_id"], 7);
        assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_filters() {
        let r = record(7, "x", 100);
        assert!(PhotoFilter::LocalIds([7].into()).matches(&r));
        assert!(!PhotoFilter::LocalIds([8].into()).matches(&r));
        assert!(PhotoFilter::ExternalIds(["x".to_string()].into()).matches(&r));
        assert!(PhotoFilter::CreatedAfter(Utc.timestamp_millis_opt(99).unwrap()).matches(&r));
        assert!(!PhotoFilter::CreatedAfter(Utc.timestamp_millis_opt(100).unwrap()).matches(&r));
    }
}

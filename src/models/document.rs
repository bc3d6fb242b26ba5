//! Document descriptors, fetched documents, and persisted records.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier of a persisted document record.
///
/// Derived from the document's source URL, so the same document maps to the
/// same id on every pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derive the record id for a source URL.
    pub fn for_url(source_url: &str) -> Self {
        let digest = Sha256::digest(source_url.as_bytes());
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chat identity of a subscriber on the messaging gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One discoverable document as listed on the source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Short category key taken from the document URL path
    pub category_id: String,

    /// Human-readable category name (e.g. institute name)
    pub category_label: String,

    /// File name as shown on the listing page
    pub display_name: String,

    /// Absolute document URL, the natural key across passes
    pub source_url: String,
}

/// A descriptor whose document was retrieved successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedDocument {
    #[serde(flatten)]
    pub descriptor: DocumentDescriptor,

    /// "Last modified at origin" signal
    pub origin_freshness: DateTime<Utc>,

    /// Reference to the artifact produced by the renderer
    pub rendered_artifact_ref: String,
}

impl FetchedDocument {
    pub fn source_url(&self) -> &str {
        &self.descriptor.source_url
    }
}

/// A category of documents (one group on the listing page).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub label: String,
}

/// Persisted state of a tracked document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: RecordId,
    pub category_id: String,
    pub category_label: String,
    pub display_name: String,
    pub source_url: String,
    pub origin_freshness: DateTime<Utc>,
    pub last_refreshed_at: DateTime<Utc>,
    pub rendered_artifact_ref: String,
    #[serde(default)]
    pub subscribers: BTreeSet<SubscriberId>,
}

impl DocumentRecord {
    /// Build a fresh record for a document seen for the first time.
    pub fn from_fetched(fetched: &FetchedDocument, now: DateTime<Utc>) -> Self {
        let d = &fetched.descriptor;
        Self {
            id: RecordId::for_url(&d.source_url),
            category_id: d.category_id.clone(),
            category_label: d.category_label.clone(),
            display_name: d.display_name.clone(),
            source_url: d.source_url.clone(),
            origin_freshness: fetched.origin_freshness,
            last_refreshed_at: now,
            rendered_artifact_ref: fetched.rendered_artifact_ref.clone(),
            subscribers: BTreeSet::new(),
        }
    }

    /// Whether `last_refreshed_at + ttl <= now`. A deadline past the
    /// representable range never expires.
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.last_refreshed_at
            .checked_add_signed(ttl)
            .is_some_and(|deadline| deadline <= now)
    }

    pub fn category(&self) -> Category {
        Category {
            id: self.category_id.clone(),
            label: self.category_label.clone(),
        }
    }

    /// Format the record for display using a template.
    ///
    /// Supported placeholders:
    /// - `{category}`, `{name}`, `{link}`
    /// - `{origin_updated}`, `{refreshed}` (rendered in `offset`)
    ///
    /// Interpolated values are HTML-escaped.
    pub fn format(&self, template: &str, offset: FixedOffset) -> String {
        template
            .replace("{category}", &escape_html(&self.category_label))
            .replace("{name}", &escape_html(&self.display_name))
            .replace("{link}", &escape_html(&self.source_url))
            .replace(
                "{origin_updated}",
                &format_local(self.origin_freshness, offset),
            )
            .replace("{refreshed}", &format_local(self.last_refreshed_at, offset))
    }
}

fn format_local(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> DocumentRecord {
        DocumentRecord {
            id: RecordId::for_url("https://example.com/raspisanie/files/ii/1.pdf"),
            category_id: "ii".to_string(),
            category_label: "Institute of <IT>".to_string(),
            display_name: "Group 1 & 2".to_string(),
            source_url: "https://example.com/raspisanie/files/ii/1.pdf".to_string(),
            origin_freshness: Utc.timestamp_opt(0, 0).unwrap(),
            last_refreshed_at: Utc.timestamp_opt(3600, 0).unwrap(),
            rendered_artifact_ref: "artifacts/x.pdf".to_string(),
            subscribers: BTreeSet::new(),
        }
    }

    #[test]
    fn test_is_expired_boundary_and_overflow() {
        let record = sample_record();
        let ttl = chrono::Duration::seconds(100);
        assert!(!record.is_expired(ttl, Utc.timestamp_opt(3699, 0).unwrap()));
        assert!(record.is_expired(ttl, Utc.timestamp_opt(3700, 0).unwrap()));

        let huge = chrono::Duration::seconds(10_000_000_000_000);
        assert!(!record.is_expired(huge, Utc.timestamp_opt(i32::MAX as i64, 0).unwrap()));
        assert!(!record.is_expired(chrono::Duration::MAX, Utc::now()));
    }

    #[test]
    fn test_record_id_is_stable() {
        let a = RecordId::for_url("https://example.com/a.pdf");
        let b = RecordId::for_url("https://example.com/a.pdf");
        let c = RecordId::for_url("https://example.com/b.pdf");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_format_escapes_and_localizes() {
        let record = sample_record();
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let text = record.format("{category} | {name} | {origin_updated} | {refreshed}", offset);
        assert_eq!(
            text,
            "Institute of &lt;IT&gt; | Group 1 &amp; 2 | 1970-01-01 07:00:00 | 1970-01-01 08:00:00"
        );
    }

    #[test]
    fn test_subscribers_default_when_missing() {
        let json = serde_json::json!({
            "id": "abc",
            "category_id": "ii",
            "category_label": "IT",
            "display_name": "a",
            "source_url": "https://example.com/a.pdf",
            "origin_freshness": "2024-01-01T00:00:00Z",
            "last_refreshed_at": "2024-01-01T00:00:00Z",
            "rendered_artifact_ref": "a.pdf"
        });
        let record: DocumentRecord = serde_json::from_value(json).unwrap();
        assert!(record.subscribers.is_empty());
    }
}

//! Storage abstractions for document records.
//!
//! The store is the only state shared between sync passes. The
//! reconciliation engine and the expiry sweeper are its only pipeline
//! writers; subscription changes arrive from the front-end.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Configuration
//! ├── records.json          # Document records with subscribers
//! └── artifacts/            # Rendered documents, content-addressed
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Category, DocumentRecord, RecordId, SubscriberId};

// Re-export for convenience
pub use local::LocalStore;

/// New origin state for a record whose content changed.
#[derive(Debug, Clone)]
pub struct ContentUpdate {
    pub id: RecordId,
    pub origin_freshness: DateTime<Utc>,
    pub rendered_artifact_ref: String,
    pub refreshed_at: DateTime<Utc>,
}

/// Heartbeat for a record whose content did not change.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub id: RecordId,
    pub refreshed_at: DateTime<Utc>,
}

/// One bulk write, grouped by reconciliation branch.
#[derive(Debug, Clone)]
pub enum WriteBatch {
    /// Insert records keyed by `source_url`; existing URLs are skipped.
    Insert(Vec<DocumentRecord>),
    ContentUpdate(Vec<ContentUpdate>),
    Heartbeat(Vec<Heartbeat>),
}

impl WriteBatch {
    pub fn len(&self) -> usize {
        match self {
            WriteBatch::Insert(v) => v.len(),
            WriteBatch::ContentUpdate(v) => v.len(),
            WriteBatch::Heartbeat(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriteBatch::Insert(_) => "insert",
            WriteBatch::ContentUpdate(_) => "content-update",
            WriteBatch::Heartbeat(_) => "heartbeat",
        }
    }
}

/// Trait for document record storage backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find the live record for a source URL.
    async fn find_by_url(&self, source_url: &str) -> Result<Option<DocumentRecord>>;

    async fn find_by_id(&self, id: &RecordId) -> Result<Option<DocumentRecord>>;

    /// Apply one batch atomically. Returns the number of records written.
    async fn bulk_apply(&self, batch: WriteBatch) -> Result<usize>;

    /// Records with `last_refreshed_at + ttl <= now`.
    async fn find_expired(
        &self,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentRecord>>;

    /// Delete records by id. Returns the ids actually removed.
    async fn delete_many(&self, ids: &[RecordId]) -> Result<Vec<RecordId>>;

    /// Returns `true` if the subscriber was added.
    async fn add_subscriber(&self, id: &RecordId, subscriber: SubscriberId) -> Result<bool>;

    /// Returns `true` if the subscriber was removed.
    async fn remove_subscriber(&self, id: &RecordId, subscriber: SubscriberId) -> Result<bool>;

    async fn is_subscribed(&self, id: &RecordId, subscriber: SubscriberId) -> Result<bool>;

    /// Records of one category, sorted by display name.
    async fn list_by_category(&self, category_id: &str) -> Result<Vec<DocumentRecord>>;

    /// Distinct categories, sorted by label.
    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Records a subscriber follows, sorted by category then display name.
    async fn list_by_subscriber(&self, subscriber: SubscriberId) -> Result<Vec<DocumentRecord>>;
}

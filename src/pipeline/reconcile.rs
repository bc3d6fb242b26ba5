//! Reconciliation of a fetched set against the record store.
//!
//! Every fetched document falls into exactly one of four branches. The
//! mutations are grouped by branch and written with one bulk call per
//! non-empty group.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::models::{ChangedDocument, DocumentRecord, FetchedDocument, ReconciliationResult};
use crate::storage::{ContentUpdate, DocumentStore, Heartbeat, WriteBatch};

/// Decision for one fetched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    ContentChanged,
    HeartbeatRefresh,
    StaleUntouched,
}

/// Classify a fetched document against its existing record.
///
/// Freshness uses strict greater-than, so equal freshness is never a change.
pub fn classify(
    fetched: &FetchedDocument,
    existing: Option<&DocumentRecord>,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Classification {
    match existing {
        None => Classification::New,
        Some(record) if fetched.origin_freshness > record.origin_freshness => {
            Classification::ContentChanged
        }
        Some(record) if !record.is_expired(ttl, now) => Classification::HeartbeatRefresh,
        Some(_) => Classification::StaleUntouched,
    }
}

/// Applies a closed fetched set to the store.
pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(
        &self,
        fetched: Vec<FetchedDocument>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationResult> {
        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut heartbeats = Vec::new();
        let mut result = ReconciliationResult::default();

        for document in dedupe_by_url(fetched) {
            let existing = self.store.find_by_url(document.source_url()).await?;

            match classify(&document, existing.as_ref(), ttl, now) {
                Classification::New => {
                    log::debug!("New document {}", document.source_url());
                    inserts.push(DocumentRecord::from_fetched(&document, now));
                }
                Classification::ContentChanged => {
                    let Some(previous) = existing else { continue };
                    log::debug!(
                        "Changed document {} ({} -> {})",
                        document.source_url(),
                        previous.origin_freshness,
                        document.origin_freshness
                    );
                    updates.push(ContentUpdate {
                        id: previous.id.clone(),
                        origin_freshness: document.origin_freshness,
                        rendered_artifact_ref: document.rendered_artifact_ref.clone(),
                        refreshed_at: now,
                    });
                    result.changed.push(ChangedDocument {
                        previous,
                        current: document,
                    });
                }
                Classification::HeartbeatRefresh => {
                    if let Some(record) = existing {
                        heartbeats.push(Heartbeat {
                            id: record.id,
                            refreshed_at: now,
                        });
                    }
                }
                Classification::StaleUntouched => {
                    log::debug!("Leaving stale record {}", document.source_url());
                    result.untouched_count += 1;
                }
            }
        }

        result.inserted = self.apply(WriteBatch::Insert(inserts)).await?;
        self.apply(WriteBatch::ContentUpdate(updates)).await?;
        result.refreshed = self.apply(WriteBatch::Heartbeat(heartbeats)).await?;

        log::info!(
            "Reconciled: {} new, {} changed, {} refreshed, {} stale",
            result.inserted,
            result.changed.len(),
            result.refreshed,
            result.untouched_count
        );
        Ok(result)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let kind = batch.kind();
        let written = self.store.bulk_apply(batch).await?;
        log::debug!("Applied {} batch: {} record(s)", kind, written);
        Ok(written)
    }
}

/// Collapse duplicate URLs, keeping the newest freshness. Order of first
/// appearance is preserved.
fn dedupe_by_url(fetched: Vec<FetchedDocument>) -> Vec<FetchedDocument> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<FetchedDocument> = Vec::with_capacity(fetched.len());

    for document in fetched {
        match index.get(document.source_url()) {
            Some(&i) => {
                if document.origin_freshness > unique[i].origin_freshness {
                    unique[i] = document;
                }
            }
            None => {
                index.insert(document.source_url().to_string(), unique.len());
                unique.push(document);
            }
        }
    }
    unique
}

//! Expiry sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::models::DocumentRecord;
use crate::storage::DocumentStore;

/// Deletes records whose last refresh is at least one TTL old.
pub struct ExpirySweeper {
    store: Arc<dyn DocumentStore>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Delete every record with `last_refreshed_at + ttl <= now` and return
    /// the snapshots that were actually removed.
    pub async fn sweep(&self, ttl: Duration, now: DateTime<Utc>) -> Result<Vec<DocumentRecord>> {
        let expired = self.store.find_expired(ttl, now).await?;
        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<_> = expired.iter().map(|r| r.id.clone()).collect();
        let deleted: HashSet<_> = self.store.delete_many(&ids).await?.into_iter().collect();

        let removed: Vec<DocumentRecord> = expired
            .into_iter()
            .filter(|r| deleted.contains(&r.id))
            .collect();
        for record in &removed {
            log::info!(
                "Expired {} (last refreshed {})",
                record.source_url,
                record.last_refreshed_at
            );
        }
        Ok(removed)
    }
}

//! Local filesystem storage implementation.
//!
//! Keeps every record in memory and, when opened on a directory, mirrors the
//! full record set to `records.json` after each mutation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── records.json          # All live records
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Category, DocumentRecord, RecordId, SubscriberId};
use crate::storage::{DocumentStore, WriteBatch};

const RECORDS_FILE: &str = "records.json";

#[derive(Debug, Clone, Default)]
struct State {
    records: BTreeMap<RecordId, DocumentRecord>,
    by_url: HashMap<String, RecordId>,
}

impl State {
    fn from_records(records: Vec<DocumentRecord>) -> Result<Self> {
        let mut state = Self::default();
        for record in records {
            if state.by_url.contains_key(&record.source_url) {
                return Err(AppError::store(format!(
                    "duplicate source_url in {RECORDS_FILE}: {}",
                    record.source_url
                )));
            }
            state
                .by_url
                .insert(record.source_url.clone(), record.id.clone());
            state.records.insert(record.id.clone(), record);
        }
        Ok(state)
    }

    fn apply(&mut self, batch: WriteBatch) -> usize {
        let mut written = 0;
        match batch {
            WriteBatch::Insert(records) => {
                for record in records {
                    if self.by_url.contains_key(&record.source_url) {
                        log::warn!("Skipping duplicate insert for {}", record.source_url);
                        continue;
                    }
                    self.by_url
                        .insert(record.source_url.clone(), record.id.clone());
                    self.records.insert(record.id.clone(), record);
                    written += 1;
                }
            }
            WriteBatch::ContentUpdate(updates) => {
                for update in updates {
                    if let Some(record) = self.records.get_mut(&update.id) {
                        record.origin_freshness = update.origin_freshness;
                        record.rendered_artifact_ref = update.rendered_artifact_ref;
                        record.last_refreshed_at = record.last_refreshed_at.max(update.refreshed_at);
                        written += 1;
                    }
                }
            }
            WriteBatch::Heartbeat(beats) => {
                for beat in beats {
                    if let Some(record) = self.records.get_mut(&beat.id) {
                        record.last_refreshed_at = record.last_refreshed_at.max(beat.refreshed_at);
                        written += 1;
                    }
                }
            }
        }
        written
    }

    fn snapshot(&self) -> Vec<&DocumentRecord> {
        self.records.values().collect()
    }
}

/// Local record store, optionally persisted to a directory.
pub struct LocalStore {
    root_dir: Option<PathBuf>,
    state: Mutex<State>,
}

impl LocalStore {
    /// Create a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            root_dir: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Open (or create) a store persisted under `root_dir`.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        let path = root_dir.join(RECORDS_FILE);
        let records: Vec<DocumentRecord> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No {} at {}, starting empty", RECORDS_FILE, root_dir.display());
                Vec::new()
            }
            Err(e) => return Err(AppError::Io(e)),
        };
        log::debug!("Loaded {} record(s) from {}", records.len(), path.display());

        Ok(Self {
            root_dir: Some(root_dir),
            state: Mutex::new(State::from_records(records)?),
        })
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    /// Mirror the state to disk (write to temp, then rename).
    async fn persist(&self, state: &State) -> Result<()> {
        let Some(root) = &self.root_dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(root).await?;

        let bytes = serde_json::to_vec_pretty(&state.snapshot())?;
        let path = root.join(RECORDS_FILE);
        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Persist and map any failure into a store error.
    async fn commit(&self, state: &State) -> Result<()> {
        self.persist(state)
            .await
            .map_err(|e| AppError::store(format!("failed to persist records: {e}")))
    }

    /// Run `mutate` on a copy of the state and swap it in only after the copy
    /// is persisted. Nothing is written when `changed` reports no change.
    async fn transact<T: Send>(
        &self,
        mutate: impl FnOnce(&mut State) -> T + Send,
        changed: impl FnOnce(&T) -> bool + Send,
    ) -> Result<T> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        let out = mutate(&mut staged);
        if changed(&out) {
            self.commit(&staged).await?;
            *state = staged;
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn find_by_url(&self, source_url: &str) -> Result<Option<DocumentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .by_url
            .get(source_url)
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &RecordId) -> Result<Option<DocumentRecord>> {
        Ok(self.state.lock().await.records.get(id).cloned())
    }

    async fn bulk_apply(&self, batch: WriteBatch) -> Result<usize> {
        let kind = batch.kind();
        let written = self.transact(|state| state.apply(batch), |_| true).await?;
        log::debug!("Bulk {} wrote {} record(s)", kind, written);
        Ok(written)
    }

    async fn find_expired(
        &self,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<DocumentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.is_expired(ttl, now))
            .cloned()
            .collect())
    }

    async fn delete_many(&self, ids: &[RecordId]) -> Result<Vec<RecordId>> {
        self.transact(
            |state| {
                let mut deleted = Vec::new();
                for id in ids {
                    if let Some(record) = state.records.remove(id) {
                        state.by_url.remove(&record.source_url);
                        deleted.push(record.id);
                    }
                }
                deleted
            },
            |deleted| !deleted.is_empty(),
        )
        .await
    }

    async fn add_subscriber(&self, id: &RecordId, subscriber: SubscriberId) -> Result<bool> {
        self.transact(
            |state| {
                state
                    .records
                    .get_mut(id)
                    .is_some_and(|record| record.subscribers.insert(subscriber))
            },
            |added| *added,
        )
        .await
    }

    async fn remove_subscriber(&self, id: &RecordId, subscriber: SubscriberId) -> Result<bool> {
        self.transact(
            |state| {
                state
                    .records
                    .get_mut(id)
                    .is_some_and(|record| record.subscribers.remove(&subscriber))
            },
            |removed| *removed,
        )
        .await
    }

    async fn is_subscribed(&self, id: &RecordId, subscriber: SubscriberId) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .get(id)
            .is_some_and(|r| r.subscribers.contains(&subscriber)))
    }

    async fn list_by_category(&self, category_id: &str) -> Result<Vec<DocumentRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<DocumentRecord> = state
            .records
            .values()
            .filter(|r| r.category_id == category_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(records)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let state = self.state.lock().await;
        let categories: BTreeSet<(String, String)> = state
            .records
            .values()
            .map(|r| (r.category_label.clone(), r.category_id.clone()))
            .collect();
        Ok(categories
            .into_iter()
            .map(|(label, id)| Category { id, label })
            .collect())
    }

    async fn list_by_subscriber(&self, subscriber: SubscriberId) -> Result<Vec<DocumentRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<DocumentRecord> = state
            .records
            .values()
            .filter(|r| r.subscribers.contains(&subscriber))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (&a.category_label, &a.display_name).cmp(&(&b.category_label, &b.display_name))
        });
        Ok(records)
    }
}

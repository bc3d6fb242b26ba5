//! Results produced by the stages of a sync pass.

use chrono::{DateTime, Utc};

use super::{DocumentRecord, FetchedDocument};

/// A document dropped from a pass after its fetch attempts ran out.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub source_url: String,
    pub attempts: u32,
    pub error: String,
}

/// Settled result of the fetch stage. Every input descriptor ends up in
/// exactly one of the two lists.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub fetched: Vec<FetchedDocument>,
    pub failures: Vec<FetchFailure>,
}

/// A content change detected during reconciliation.
#[derive(Debug, Clone)]
pub struct ChangedDocument {
    /// Record as it was before the update, including its subscribers
    pub previous: DocumentRecord,
    /// The fetch that triggered the change
    pub current: FetchedDocument,
}

/// Outcome of reconciling one fetched set against the store.
#[derive(Debug, Default)]
pub struct ReconciliationResult {
    pub changed: Vec<ChangedDocument>,
    pub inserted: usize,
    pub refreshed: usize,
    /// Records left stale for the sweeper
    pub untouched_count: usize,
}

/// Per-batch delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Summary of a complete sync pass.
#[derive(Debug)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub listed: usize,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub inserted: usize,
    pub changed: usize,
    pub refreshed: usize,
    pub untouched: usize,
    pub expired: usize,
    pub deliveries: DeliveryReport,
}

impl SyncReport {
    /// Key/value pairs for summary logging.
    pub fn summary_items(&self) -> Vec<(&'static str, String)> {
        let elapsed = self.finished_at - self.started_at;
        vec![
            ("Listed", self.listed.to_string()),
            (
                "Fetched",
                format!("{} ({} dropped)", self.fetched, self.fetch_failures),
            ),
            ("New", self.inserted.to_string()),
            ("Changed", self.changed.to_string()),
            ("Refreshed", self.refreshed.to_string()),
            ("Stale", self.untouched.to_string()),
            ("Expired", self.expired.to_string()),
            (
                "Messages",
                format!(
                    "{} delivered, {} failed",
                    self.deliveries.delivered, self.deliveries.failed
                ),
            ),
            (
                "Duration",
                format!("{:.1}s", elapsed.num_milliseconds() as f64 / 1000.0),
            ),
        ]
    }
}

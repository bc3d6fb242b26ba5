// src/pipeline/sync.rs

//! One complete sync pass: list, fetch, reconcile, sweep, notify.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{Config, DeliveryReport, SyncReport};
use crate::pipeline::reconcile::Reconciler;
use crate::pipeline::scheduler::run_scheduled;
use crate::pipeline::sweep::ExpirySweeper;
use crate::services::{
    ArtifactWriter, DocumentLister, FetchWorkerPool, HttpDocumentFetcher, MessagingGateway,
    Notifier, SourceLister,
};
use crate::storage::DocumentStore;
use crate::utils::report;

const TOTAL_STEPS: usize = 5;

/// The wired-up pipeline.
pub struct SyncPipeline {
    lister: Arc<dyn DocumentLister>,
    pool: FetchWorkerPool,
    reconciler: Reconciler,
    sweeper: ExpirySweeper,
    notifier: Notifier,
    ttl: Duration,
}

impl SyncPipeline {
    pub fn new(
        lister: Arc<dyn DocumentLister>,
        pool: FetchWorkerPool,
        store: Arc<dyn DocumentStore>,
        notifier: Notifier,
        ttl: Duration,
    ) -> Self {
        Self {
            lister,
            pool,
            reconciler: Reconciler::new(Arc::clone(&store)),
            sweeper: ExpirySweeper::new(store),
            notifier,
            ttl,
        }
    }

    /// Build the HTTP-backed pipeline described by `config`.
    pub fn from_config(
        config: &Config,
        client: Client,
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn MessagingGateway>,
    ) -> Result<Self> {
        let lister = Arc::new(SourceLister::new(client.clone(), config.source.clone()));
        let renderer = Arc::new(ArtifactWriter::from_config(&config.renderer));
        let fetcher = Arc::new(HttpDocumentFetcher::new(client, renderer));
        let pool = FetchWorkerPool::from_config(fetcher, &config.fetcher);
        let notifier = Notifier::new(gateway, config.messages.clone())?;

        Ok(Self::new(lister, pool, store, notifier, config.sync.ttl()))
    }

    /// Run a pass anchored at the current time.
    pub async fn run_pass_now(&self) -> Result<SyncReport> {
        self.run_pass(Utc::now()).await
    }

    /// Run one pass. Reconciliation and the sweep share `now`.
    ///
    /// Scrape and store failures abort the pass; per-document fetch and
    /// per-subscriber delivery failures are only counted.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<SyncReport> {
        report::header(&format!("Sync pass at {}", now.format("%Y-%m-%d %H:%M:%S")));

        report::step(1, TOTAL_STEPS, "Listing documents");
        let descriptors = self.lister.list_documents().await?;
        let listed = descriptors.len();

        report::step(2, TOTAL_STEPS, &format!("Fetching {listed} document(s)"));
        let outcome = self.pool.fetch_all(descriptors).await;
        for failure in &outcome.failures {
            report::sub_item(&format!(
                "dropped {} after {} attempt(s)",
                failure.source_url, failure.attempts
            ));
        }
        let fetched = outcome.fetched.len();
        let fetch_failures = outcome.failures.len();

        report::step(3, TOTAL_STEPS, "Reconciling with stored records");
        let reconciled = self
            .reconciler
            .reconcile(outcome.fetched, self.ttl, now)
            .await?;

        report::step(4, TOTAL_STEPS, "Sweeping expired records");
        let expired = self.sweeper.sweep(self.ttl, now).await?;

        report::step(5, TOTAL_STEPS, "Notifying subscribers");
        let mut deliveries = DeliveryReport::default();
        deliveries.merge(self.notifier.notify_changed(&reconciled.changed).await);
        deliveries.merge(self.notifier.notify_expired(&expired).await);

        let sync_report = SyncReport {
            started_at: now,
            finished_at: Utc::now().max(now),
            listed,
            fetched,
            fetch_failures,
            inserted: reconciled.inserted,
            changed: reconciled.changed.len(),
            refreshed: reconciled.refreshed,
            untouched: reconciled.untouched_count,
            expired: expired.len(),
            deliveries,
        };
        report::summary("Sync pass", &sync_report.summary_items());
        Ok(sync_report)
    }

    /// Run a pass now and then every `period` until `shutdown` resolves.
    ///
    /// A failed pass is logged and the loop carries on with the next tick.
    pub async fn run_scheduled(&self, period: StdDuration, shutdown: impl Future<Output = ()>) {
        let pipeline = self;
        let passes = run_scheduled(
            period,
            move || async move {
                if let Err(e) = pipeline.run_pass_now().await {
                    log::log!(pass_error_level(&e), "Sync pass failed: {}", e);
                }
            },
            shutdown,
        )
        .await;
        log::info!("Scheduler stopped after {} pass(es)", passes);
    }
}

/// Aborting failures are errors; anything else only warns.
fn pass_error_level(error: &AppError) -> log::Level {
    if error.is_pass_fatal() {
        log::Level::Error
    } else {
        log::Level::Warn
    }
}

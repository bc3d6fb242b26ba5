//! End-to-end sync passes against in-process fakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use schedwatch::error::{AppError, Result};
use schedwatch::models::{
    BackoffKind, DocumentDescriptor, DocumentRecord, FetchedDocument, MessageTemplates,
    SubscriberId,
};
use schedwatch::pipeline::SyncPipeline;
use schedwatch::services::{
    Affordance, DocumentFetcher, DocumentLister, FetchWorkerPool, MessagingGateway, Notifier,
    RetryPolicy,
};
use schedwatch::storage::{DocumentStore, LocalStore, WriteBatch};

const TTL_SECS: i64 = 86_400;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn descriptor(url: &str) -> DocumentDescriptor {
    DocumentDescriptor {
        category_id: "ii".to_string(),
        category_label: "Institute of IT".to_string(),
        display_name: url.rsplit('/').next().unwrap_or(url).to_string(),
        source_url: url.to_string(),
    }
}

#[derive(Default)]
struct FakeLister {
    urls: Mutex<Vec<String>>,
    broken: Mutex<bool>,
}

#[async_trait]
impl DocumentLister for FakeLister {
    async fn list_documents(&self) -> Result<Vec<DocumentDescriptor>> {
        if *self.broken.lock().unwrap() {
            return Err(AppError::scrape("no '.institut_div' groups"));
        }
        Ok(self.urls.lock().unwrap().iter().map(|u| descriptor(u)).collect())
    }
}

/// Serves a freshness per URL; URLs without one fail every attempt.
#[derive(Default)]
struct FakeFetcher {
    freshness: Mutex<HashMap<String, i64>>,
}

#[async_trait]
impl DocumentFetcher for FakeFetcher {
    async fn fetch(&self, descriptor: &DocumentDescriptor) -> Result<FetchedDocument> {
        let freshness = self
            .freshness
            .lock()
            .unwrap()
            .get(&descriptor.source_url)
            .copied()
            .ok_or_else(|| AppError::fetch(&descriptor.source_url, "Last-Modified header missing"))?;
        Ok(FetchedDocument {
            descriptor: descriptor.clone(),
            origin_freshness: at(freshness),
            rendered_artifact_ref: format!("{}@{}.pdf", descriptor.display_name, freshness),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Delivery {
    Artifact(SubscriberId, String),
    Text(SubscriberId, bool),
}

#[derive(Default)]
struct FakeGateway {
    sent: Mutex<Vec<Delivery>>,
}

#[async_trait]
impl MessagingGateway for FakeGateway {
    async fn send_artifact(&self, subscriber: SubscriberId, artifact_ref: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Delivery::Artifact(subscriber, artifact_ref.to_string()));
        Ok(())
    }

    async fn send_text(
        &self,
        subscriber: SubscriberId,
        _text: &str,
        affordance: Option<&Affordance>,
    ) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Delivery::Text(subscriber, affordance.is_some()));
        Ok(())
    }
}

struct Harness {
    lister: Arc<FakeLister>,
    fetcher: Arc<FakeFetcher>,
    gateway: Arc<FakeGateway>,
    store: Arc<LocalStore>,
    pipeline: SyncPipeline,
}

impl Harness {
    fn new() -> Self {
        let lister = Arc::new(FakeLister::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let gateway = Arc::new(FakeGateway::default());
        let store = Arc::new(LocalStore::in_memory());

        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay: StdDuration::from_millis(1),
            max_delay: StdDuration::from_millis(2),
            backoff: BackoffKind::Linear,
        };
        let pool = FetchWorkerPool::new(fetcher.clone(), 4, retry, true);
        let notifier = Notifier::new(gateway.clone(), MessageTemplates::default()).unwrap();
        let pipeline = SyncPipeline::new(
            lister.clone(),
            pool,
            store.clone(),
            notifier,
            Duration::seconds(TTL_SECS),
        );

        Self {
            lister,
            fetcher,
            gateway,
            store,
            pipeline,
        }
    }

    /// Publish a document with the given origin freshness.
    fn publish(&self, url: &str, freshness: i64) {
        let mut urls = self.lister.urls.lock().unwrap();
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
        self.fetcher
            .freshness
            .lock()
            .unwrap()
            .insert(url.to_string(), freshness);
    }

    fn unpublish(&self, url: &str) {
        self.lister.urls.lock().unwrap().retain(|u| u != url);
    }

    async fn record(&self, url: &str) -> Option<DocumentRecord> {
        self.store.find_by_url(url).await.unwrap()
    }

    fn sent(&self) -> Vec<Delivery> {
        self.gateway.sent.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn new_document_is_inserted_without_subscribers() {
    let h = Harness::new();
    h.publish("https://example.edu/raspisanie/files/ii/a.pdf", 100);

    let report = h.pipeline.run_pass(at(1_000)).await.unwrap();

    assert_eq!(report.listed, 1);
    assert_eq!(report.inserted, 1);
    let record = h.record("https://example.edu/raspisanie/files/ii/a.pdf").await.unwrap();
    assert!(record.subscribers.is_empty());
    assert_eq!(record.origin_freshness, at(100));
    assert_eq!(record.last_refreshed_at, at(1_000));
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn equal_freshness_only_refreshes() {
    let h = Harness::new();
    let url = "https://example.edu/raspisanie/files/ii/a.pdf";
    h.publish(url, 100);
    h.pipeline.run_pass(at(1_000)).await.unwrap();
    let id = h.record(url).await.unwrap().id;
    h.store.add_subscriber(&id, SubscriberId(1)).await.unwrap();

    let report = h.pipeline.run_pass(at(2_000)).await.unwrap();

    assert_eq!(report.refreshed, 1);
    assert_eq!(report.changed, 0);
    let record = h.record(url).await.unwrap();
    assert_eq!(record.origin_freshness, at(100));
    assert_eq!(record.last_refreshed_at, at(2_000));
    assert_eq!(record.rendered_artifact_ref, "a.pdf@100.pdf");
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn newer_freshness_notifies_existing_subscribers() {
    let h = Harness::new();
    let url = "https://example.edu/raspisanie/files/ii/b.pdf";
    h.publish(url, 100);
    h.pipeline.run_pass(at(1_000)).await.unwrap();
    let id = h.record(url).await.unwrap().id;
    h.store.add_subscriber(&id, SubscriberId(1)).await.unwrap();
    h.store.add_subscriber(&id, SubscriberId(2)).await.unwrap();

    h.publish(url, 150);
    let report = h.pipeline.run_pass(at(2_000)).await.unwrap();

    assert_eq!(report.changed, 1);
    assert_eq!(report.deliveries.delivered, 2);
    let record = h.record(url).await.unwrap();
    assert_eq!(record.origin_freshness, at(150));
    assert_eq!(record.rendered_artifact_ref, "b.pdf@150.pdf");
    // A content change also counts as a refresh.
    assert_eq!(record.last_refreshed_at, at(2_000));

    assert_eq!(
        h.sent(),
        vec![
            Delivery::Artifact(SubscriberId(1), "b.pdf@150.pdf".to_string()),
            Delivery::Text(SubscriberId(1), true),
            Delivery::Artifact(SubscriberId(2), "b.pdf@150.pdf".to_string()),
            Delivery::Text(SubscriberId(2), true),
        ]
    );
}

#[tokio::test]
async fn document_gone_past_ttl_is_expired_and_announced() {
    let h = Harness::new();
    let url = "https://example.edu/raspisanie/files/ii/old.pdf";
    let now = at(200_000);
    h.publish(url, 100);
    h.pipeline.run_pass(now - Duration::seconds(90_000)).await.unwrap();
    let id = h.record(url).await.unwrap().id;
    h.store.add_subscriber(&id, SubscriberId(7)).await.unwrap();

    h.unpublish(url);
    h.publish("https://example.edu/raspisanie/files/ii/keep.pdf", 1);
    let report = h.pipeline.run_pass(now).await.unwrap();

    assert_eq!(report.expired, 1);
    assert!(h.record(url).await.is_none());
    assert_eq!(h.sent(), vec![Delivery::Text(SubscriberId(7), false)]);
}

#[tokio::test]
async fn record_within_ttl_survives_absence() {
    let h = Harness::new();
    let url = "https://example.edu/raspisanie/files/ii/a.pdf";
    h.publish(url, 100);
    h.pipeline.run_pass(at(0)).await.unwrap();

    h.unpublish(url);
    h.publish("https://example.edu/raspisanie/files/ii/other.pdf", 1);
    let report = h.pipeline.run_pass(at(TTL_SECS - 1)).await.unwrap();

    assert_eq!(report.expired, 0);
    assert!(h.record(url).await.is_some());
}

#[tokio::test]
async fn identical_second_pass_is_idempotent() {
    let h = Harness::new();
    h.publish("https://example.edu/raspisanie/files/ii/a.pdf", 100);
    h.publish("https://example.edu/raspisanie/files/ii/b.pdf", 200);

    let first = h.pipeline.run_pass(at(1_000)).await.unwrap();
    let second = h.pipeline.run_pass(at(1_500)).await.unwrap();

    assert_eq!(first.inserted, 2);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.changed, 0);
    assert_eq!(second.refreshed, 2);
}

#[tokio::test]
async fn one_fetch_failure_does_not_block_others() {
    let h = Harness::new();
    h.publish("https://example.edu/raspisanie/files/ii/a.pdf", 100);
    h.lister
        .urls
        .lock()
        .unwrap()
        .push("https://example.edu/raspisanie/files/ii/broken.pdf".to_string());

    let report = h.pipeline.run_pass(at(1_000)).await.unwrap();

    assert_eq!(report.listed, 2);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.inserted, 1);
    assert!(h.record("https://example.edu/raspisanie/files/ii/broken.pdf").await.is_none());
}

#[tokio::test]
async fn scrape_failure_aborts_pass_without_writes() {
    let h = Harness::new();
    h.publish("https://example.edu/raspisanie/files/ii/a.pdf", 100);
    *h.lister.broken.lock().unwrap() = true;

    let error = h.pipeline.run_pass(at(1_000)).await.unwrap_err();

    assert!(error.is_pass_fatal());
    assert!(h.record("https://example.edu/raspisanie/files/ii/a.pdf").await.is_none());
}

#[tokio::test]
async fn stale_but_listed_record_is_swept_in_the_same_pass() {
    let h = Harness::new();
    let url = "https://example.edu/raspisanie/files/ii/a.pdf";
    let stale = DocumentRecord::from_fetched(
        &FetchedDocument {
            descriptor: descriptor(url),
            origin_freshness: at(100),
            rendered_artifact_ref: "a.pdf@100.pdf".to_string(),
        },
        at(0),
    );
    h.store
        .bulk_apply(WriteBatch::Insert(vec![stale]))
        .await
        .unwrap();
    h.publish(url, 100);

    let report = h.pipeline.run_pass(at(TTL_SECS)).await.unwrap();

    assert_eq!(report.untouched, 1);
    assert_eq!(report.refreshed, 0);
    assert_eq!(report.expired, 1);
    assert!(h.record(url).await.is_none());
}

// src/services/fetcher.rs

//! Document fetch worker pool.
//!
//! Retrieves every listed document with a bounded number of requests in
//! flight, reads its `Last-Modified` header, and hands the body to the
//! renderer. Each document is retried on its own; one document running out
//! of attempts never cancels the others.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use reqwest::header::{HeaderMap, LAST_MODIFIED};
use tokio::sync::Semaphore;

use crate::error::{AppError, Result};
use crate::models::{
    DocumentDescriptor, FetchFailure, FetchOutcome, FetchedDocument, FetcherConfig,
};
use crate::services::renderer::Renderer;
use crate::services::retry::RetryPolicy;

/// Single attempt at retrieving one document.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, descriptor: &DocumentDescriptor) -> Result<FetchedDocument>;
}

/// Fetches documents over HTTP and renders their bodies.
pub struct HttpDocumentFetcher {
    client: Client,
    renderer: Arc<dyn Renderer>,
}

impl HttpDocumentFetcher {
    pub fn new(client: Client, renderer: Arc<dyn Renderer>) -> Self {
        Self { client, renderer }
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch(&self, descriptor: &DocumentDescriptor) -> Result<FetchedDocument> {
        let url = &descriptor.source_url;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::fetch(url, e))?;

        let origin_freshness = parse_last_modified(response.headers())
            .map_err(|message| AppError::fetch(url, message))?;

        let bytes = response.bytes().await.map_err(|e| AppError::fetch(url, e))?;
        let rendered_artifact_ref = self.renderer.render(url, &bytes).await?;

        Ok(FetchedDocument {
            descriptor: descriptor.clone(),
            origin_freshness,
            rendered_artifact_ref,
        })
    }
}

/// Read the origin freshness from a `Last-Modified` header.
pub fn parse_last_modified(headers: &HeaderMap) -> std::result::Result<DateTime<Utc>, String> {
    let value = headers
        .get(LAST_MODIFIED)
        .ok_or_else(|| "Last-Modified header missing".to_string())?
        .to_str()
        .map_err(|e| format!("Last-Modified header unreadable: {e}"))?;
    parse_http_date(value)
}

/// Parse an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn parse_http_date(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a, %d %b %Y %H:%M:%S GMT")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid Last-Modified '{value}': {e}"))
}

/// Bounded-concurrency fetcher with per-document retry.
///
/// At most `concurrency` fetch attempts run at once. When
/// `release_slot_on_backoff` is set, a document waiting out its backoff does
/// not occupy a slot; otherwise the slot is held until the document settles.
pub struct FetchWorkerPool {
    fetcher: Arc<dyn DocumentFetcher>,
    concurrency: usize,
    retry: RetryPolicy,
    release_slot_on_backoff: bool,
}

impl FetchWorkerPool {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        concurrency: usize,
        retry: RetryPolicy,
        release_slot_on_backoff: bool,
    ) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
            retry,
            release_slot_on_backoff,
        }
    }

    pub fn from_config(fetcher: Arc<dyn DocumentFetcher>, config: &FetcherConfig) -> Self {
        Self::new(
            fetcher,
            config.max_concurrent,
            RetryPolicy::from_config(config),
            config.release_slot_on_backoff,
        )
    }

    /// Fetch every descriptor. Returns only once all of them have settled.
    pub async fn fetch_all(&self, descriptors: Vec<DocumentDescriptor>) -> FetchOutcome {
        let semaphore = Semaphore::new(self.concurrency);
        let mut outcome = FetchOutcome::default();

        let mut tasks: FuturesUnordered<_> = descriptors
            .into_iter()
            .map(|descriptor| {
                let semaphore = &semaphore;
                async move {
                    let result = self.fetch_one(&descriptor, semaphore).await;
                    (descriptor, result)
                }
            })
            .collect();

        while let Some((descriptor, result)) = tasks.next().await {
            match result {
                Ok(document) => outcome.fetched.push(document),
                Err(error) => {
                    let attempts = match &error {
                        AppError::RetriesExhausted { attempts, .. } => *attempts,
                        _ => 1,
                    };
                    log::warn!(
                        "Dropping {} from this pass: {}",
                        descriptor.source_url,
                        error
                    );
                    outcome.failures.push(FetchFailure {
                        source_url: descriptor.source_url,
                        attempts,
                        error: error.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Fetched {} document(s), dropped {}",
            outcome.fetched.len(),
            outcome.failures.len()
        );
        outcome
    }

    async fn fetch_one(
        &self,
        descriptor: &DocumentDescriptor,
        semaphore: &Semaphore,
    ) -> Result<FetchedDocument> {
        let fetcher = self.fetcher.as_ref();
        let url = descriptor.source_url.as_str();

        if self.release_slot_on_backoff {
            self.retry
                .run(move |_| async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|e| AppError::fetch(url, e))?;
                    fetcher.fetch(descriptor).await
                })
                .await
        } else {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| AppError::fetch(url, e))?;
            self.retry
                .run(move |_| fetcher.fetch(descriptor))
                .await
        }
    }
}

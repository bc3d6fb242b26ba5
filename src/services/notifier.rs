// src/services/notifier.rs

//! Notification fan-out.
//!
//! Delivery is best-effort: records are processed one after another, and a
//! failure for one subscriber is logged and counted without stopping the
//! rest. Nothing is retried here.

use std::sync::Arc;

use chrono::FixedOffset;

use crate::error::Result;
use crate::models::{
    ChangedDocument, DeliveryReport, DocumentRecord, MessageTemplates, SubscriberId,
};
use crate::services::gateway::{Affordance, MessagingGateway};

/// Pushes change and removal notices to subscribers.
pub struct Notifier {
    gateway: Arc<dyn MessagingGateway>,
    templates: MessageTemplates,
    offset: FixedOffset,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn MessagingGateway>, templates: MessageTemplates) -> Result<Self> {
        let offset = templates.utc_offset()?;
        Ok(Self {
            gateway,
            templates,
            offset,
        })
    }

    /// Send the new artifact and an unsubscribe button to every subscriber
    /// of each changed document.
    pub async fn notify_changed(&self, changes: &[ChangedDocument]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for change in changes {
            let record = self.updated_view(change);
            if record.subscribers.is_empty() {
                continue;
            }

            let text = format!(
                "{}\n{}",
                self.templates.changed_header,
                record.format(&self.templates.document_details, self.offset)
            );
            let affordance = Affordance::Unsubscribe {
                record_id: record.id.clone(),
                label: self.templates.unsubscribe_label.clone(),
            };

            for &subscriber in &record.subscribers {
                let result = self
                    .deliver_change(subscriber, &record.rendered_artifact_ref, &text, &affordance)
                    .await;
                Self::tally(&mut report, subscriber, &record, result);
            }
        }
        report
    }

    /// Tell every subscriber of each expired record that it is gone.
    pub async fn notify_expired(&self, records: &[DocumentRecord]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for record in records {
            if record.subscribers.is_empty() {
                continue;
            }

            let text = format!(
                "{}\n{}",
                self.templates.removed_header,
                record.format(&self.templates.document_details, self.offset)
            );
            for &subscriber in &record.subscribers {
                let result = self.gateway.send_text(subscriber, &text, None).await;
                Self::tally(&mut report, subscriber, record, result);
            }
        }
        report
    }

    async fn deliver_change(
        &self,
        subscriber: SubscriberId,
        artifact_ref: &str,
        text: &str,
        affordance: &Affordance,
    ) -> Result<()> {
        self.gateway.send_artifact(subscriber, artifact_ref).await?;
        self.gateway
            .send_text(subscriber, text, Some(affordance))
            .await
    }

    /// Pre-update subscribers combined with the freshly fetched state.
    fn updated_view(&self, change: &ChangedDocument) -> DocumentRecord {
        DocumentRecord {
            origin_freshness: change.current.origin_freshness,
            rendered_artifact_ref: change.current.rendered_artifact_ref.clone(),
            ..change.previous.clone()
        }
    }

    fn tally(
        report: &mut DeliveryReport,
        subscriber: SubscriberId,
        record: &DocumentRecord,
        result: Result<()>,
    ) {
        match result {
            Ok(()) => report.delivered += 1,
            Err(error) => {
                report.failed += 1;
                log::warn!(
                    "Could not notify {} about {}: {}",
                    subscriber,
                    record.source_url,
                    error
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use crate::error::AppError;
    use crate::models::{DocumentDescriptor, FetchedDocument, RecordId};

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Artifact(i64, String),
        Text(i64, Option<String>),
    }

    /// Records deliveries and fails for configured subscribers.
    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<Sent>>,
        failing: Vec<i64>,
    }

    #[async_trait]
    impl MessagingGateway for RecordingGateway {
        async fn send_artifact(&self, subscriber: SubscriberId, artifact_ref: &str) -> Result<()> {
            if self.failing.contains(&subscriber.0) {
                return Err(AppError::delivery(subscriber, "bot was blocked"));
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Artifact(subscriber.0, artifact_ref.to_string()));
            Ok(())
        }

        async fn send_text(
            &self,
            subscriber: SubscriberId,
            _text: &str,
            affordance: Option<&Affordance>,
        ) -> Result<()> {
            if self.failing.contains(&subscriber.0) {
                return Err(AppError::delivery(subscriber, "bot was blocked"));
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Text(subscriber.0, affordance.map(|a| a.callback_data())));
            Ok(())
        }
    }

    fn record(url: &str, subscribers: &[i64]) -> DocumentRecord {
        DocumentRecord {
            id: RecordId::for_url(url),
            category_id: "ii".to_string(),
            category_label: "IT".to_string(),
            display_name: "Group 1".to_string(),
            source_url: url.to_string(),
            origin_freshness: Utc.timestamp_opt(100, 0).unwrap(),
            last_refreshed_at: Utc.timestamp_opt(100, 0).unwrap(),
            rendered_artifact_ref: "old.pdf".to_string(),
            subscribers: subscribers.iter().copied().map(SubscriberId).collect::<BTreeSet<_>>(),
        }
    }

    fn change(url: &str, subscribers: &[i64]) -> ChangedDocument {
        let previous = record(url, subscribers);
        ChangedDocument {
            current: FetchedDocument {
                descriptor: DocumentDescriptor {
                    category_id: previous.category_id.clone(),
                    category_label: previous.category_label.clone(),
                    display_name: previous.display_name.clone(),
                    source_url: url.to_string(),
                },
                origin_freshness: Utc.timestamp_opt(150, 0).unwrap(),
                rendered_artifact_ref: "new.pdf".to_string(),
            },
            previous,
        }
    }

    #[tokio::test]
    async fn test_changed_sends_new_artifact_with_unsubscribe() {
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = Notifier::new(gateway.clone(), MessageTemplates::default()).unwrap();
        let c = change("https://example.com/a.pdf", &[1]);
        let callback = format!("unsubscribe_{}", c.previous.id);

        let report = notifier.notify_changed(&[c]).await;

        assert_eq!(report, DeliveryReport { delivered: 1, failed: 0 });
        assert_eq!(
            *gateway.sent.lock().unwrap(),
            vec![
                Sent::Artifact(1, "new.pdf".to_string()),
                Sent::Text(1, Some(callback)),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_block_others() {
        let gateway = Arc::new(RecordingGateway {
            failing: vec![2],
            ..RecordingGateway::default()
        });
        let notifier = Notifier::new(gateway.clone(), MessageTemplates::default()).unwrap();

        let report = notifier
            .notify_changed(&[
                change("https://example.com/a.pdf", &[1, 2, 3]),
                change("https://example.com/b.pdf", &[2, 4]),
            ])
            .await;

        assert_eq!(report, DeliveryReport { delivered: 3, failed: 2 });
        let texts = gateway
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s, Sent::Text(..)))
            .count();
        assert_eq!(texts, 3);
    }

    #[tokio::test]
    async fn test_expired_sends_text_without_affordance() {
        let gateway = Arc::new(RecordingGateway::default());
        let notifier = Notifier::new(gateway.clone(), MessageTemplates::default()).unwrap();

        let report = notifier
            .notify_expired(&[
                record("https://example.com/a.pdf", &[5, 6]),
                record("https://example.com/b.pdf", &[]),
            ])
            .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(
            *gateway.sent.lock().unwrap(),
            vec![Sent::Text(5, None), Sent::Text(6, None)]
        );
    }
}

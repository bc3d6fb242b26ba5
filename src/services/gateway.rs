//! Messaging gateway seam.
//!
//! The fan-out only needs two primitives: push an artifact and push a text
//! with an optional action button. [`LogGateway`] is the dry-run backend;
//! [`TelegramGateway`] talks to the Telegram Bot API.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{RecordId, SubscriberId};

/// An action attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Affordance {
    /// Button that cancels the subscription to one record
    Unsubscribe { record_id: RecordId, label: String },
}

impl Affordance {
    pub fn label(&self) -> &str {
        match self {
            Affordance::Unsubscribe { label, .. } => label,
        }
    }

    /// Opaque payload the front-end receives when the button is pressed.
    pub fn callback_data(&self) -> String {
        match self {
            Affordance::Unsubscribe { record_id, .. } => format!("unsubscribe_{record_id}"),
        }
    }
}

/// Outbound message delivery.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_artifact(&self, subscriber: SubscriberId, artifact_ref: &str) -> Result<()>;

    async fn send_text(
        &self,
        subscriber: SubscriberId,
        text: &str,
        affordance: Option<&Affordance>,
    ) -> Result<()>;
}

/// Gateway that only logs what it would send.
#[derive(Debug, Default)]
pub struct LogGateway;

#[async_trait]
impl MessagingGateway for LogGateway {
    async fn send_artifact(&self, subscriber: SubscriberId, artifact_ref: &str) -> Result<()> {
        log::info!("[to {}] artifact {}", subscriber, artifact_ref);
        Ok(())
    }

    async fn send_text(
        &self,
        subscriber: SubscriberId,
        text: &str,
        affordance: Option<&Affordance>,
    ) -> Result<()> {
        match affordance {
            Some(a) => log::info!(
                "[to {}] {} [{} -> {}]",
                subscriber,
                text.replace('\n', " | "),
                a.label(),
                a.callback_data()
            ),
            None => log::info!("[to {}] {}", subscriber, text.replace('\n', " | ")),
        }
        Ok(())
    }
}

#[cfg(feature = "telegram")]
pub use telegram::TelegramGateway;

#[cfg(feature = "telegram")]
mod telegram {
    use super::*;

    use std::path::Path;

    use reqwest::Client;
    use reqwest::multipart::{Form, Part};
    use serde::Deserialize;
    use serde_json::json;

    use crate::error::AppError;

    /// Envelope of every Bot API response.
    #[derive(Debug, Deserialize)]
    struct ApiResponse {
        ok: bool,
        #[serde(default)]
        description: Option<String>,
    }

    /// Telegram Bot API backend.
    pub struct TelegramGateway {
        client: Client,
        endpoint: String,
    }

    impl TelegramGateway {
        pub fn new(client: Client, api_base: &str, token: &str) -> Self {
            Self {
                client,
                endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
            }
        }

        fn method_url(&self, method: &str) -> String {
            format!("{}/{}", self.endpoint, method)
        }

        async fn check(subscriber: SubscriberId, response: reqwest::Response) -> Result<()> {
            let status = response.status();
            let body: ApiResponse = response
                .json()
                .await
                .map_err(|e| AppError::delivery(subscriber, format!("HTTP {status}: {e}")))?;
            if body.ok {
                Ok(())
            } else {
                Err(AppError::delivery(
                    subscriber,
                    body.description.unwrap_or_else(|| format!("HTTP {status}")),
                ))
            }
        }
    }

    #[async_trait]
    impl MessagingGateway for TelegramGateway {
        async fn send_artifact(&self, subscriber: SubscriberId, artifact_ref: &str) -> Result<()> {
            let path = Path::new(artifact_ref);
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| AppError::delivery(subscriber, format!("{artifact_ref}: {e}")))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "schedule.pdf".to_string());

            let form = Form::new()
                .text("chat_id", subscriber.to_string())
                .part("document", Part::bytes(bytes).file_name(file_name));

            let response = self
                .client
                .post(self.method_url("sendDocument"))
                .multipart(form)
                .send()
                .await
                .map_err(|e| AppError::delivery(subscriber, e))?;
            Self::check(subscriber, response).await
        }

        async fn send_text(
            &self,
            subscriber: SubscriberId,
            text: &str,
            affordance: Option<&Affordance>,
        ) -> Result<()> {
            let mut payload = json!({
                "chat_id": subscriber.0,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            });
            if let Some(a) = affordance {
                payload["reply_markup"] = json!({
                    "inline_keyboard": [[{
                        "text": a.label(),
                        "callback_data": a.callback_data(),
                    }]]
                });
            }

            let response = self
                .client
                .post(self.method_url("sendMessage"))
                .json(&payload)
                .send()
                .await
                .map_err(|e| AppError::delivery(subscriber, e))?;
            Self::check(subscriber, response).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_method_url() {
            let gw = TelegramGateway::new(Client::new(), "https://api.telegram.org/", "1:abc");
            assert_eq!(
                gw.method_url("sendMessage"),
                "https://api.telegram.org/bot1:abc/sendMessage"
            );
        }
    }
}

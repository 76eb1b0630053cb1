//! Webhook notification sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::ports::{NotificationPayload, NotificationSink};

/// Delivers reminder notifications as JSON POSTs to a configured endpoint.
/// The endpoint receives `{user_id, reminder, task}`.
pub struct WebhookSink {
    client: Client,
    endpoint: String,
}

impl WebhookSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal(format!("http client: {e}")))?;
        Ok(Self { client, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, user_id: &str, payload: &NotificationPayload) -> CoreResult<()> {
        let body = serde_json::json!({
            "user_id": user_id,
            "reminder": payload.reminder,
            "task": payload.task,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Unavailable(format!("webhook send: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Unavailable(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Reminder, Task};
    use chrono::{Duration as ChronoDuration, Utc};

    fn payload() -> NotificationPayload {
        let task = Task::new("user-1", "Stretch");
        let reminder = Reminder::new(&task, Utc::now() + ChronoDuration::hours(1));
        NotificationPayload { reminder, task }
    }

    #[tokio::test]
    async fn posts_payload_to_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .match_header("content-type", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let sink =
            WebhookSink::new(format!("{}/notify", server.url()), Duration::from_secs(5)).unwrap();
        sink.deliver("user-1", &payload()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/notify")
            .with_status(500)
            .create_async()
            .await;

        let sink =
            WebhookSink::new(format!("{}/notify", server.url()), Duration::from_secs(5)).unwrap();
        let err = sink.deliver("user-1", &payload()).await.unwrap_err();
        assert!(err.is_transient());
    }
}

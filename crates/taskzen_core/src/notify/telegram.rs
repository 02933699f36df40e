use crate::error::AppError;
use crate::notify::{DispatchOutcome, NotificationChannel};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Posts reminders through the Telegram Bot API `sendMessage` method.
pub struct TelegramChannel {
    endpoint: String,
    chat_id: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(
        api_base: &str,
        bot_token: &str,
        chat_id: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            endpoint: format!(
                "{}/bot{}/sendMessage",
                api_base.trim_end_matches('/'),
                bot_token
            ),
            chat_id: chat_id.to_string(),
            client,
        })
    }

    fn payload(&self, message: &str) -> serde_json::Value {
        serde_json::json!({
            "chat_id": self.chat_id,
            "text": message,
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str) -> DispatchOutcome {
        let response = match self
            .client
            .post(&self.endpoint)
            .json(&self.payload(message))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                // reqwest errors carry the request URL, which embeds the bot token.
                let err = err.without_url();
                tracing::error!(error = %err, "telegram request failed");
                return DispatchOutcome::failed(format!("request failed: {err}"));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let reply = serde_json::from_str::<TelegramReply>(&body).ok();

        match reply {
            Some(reply) if status.is_success() && reply.ok => DispatchOutcome::delivered("sent"),
            Some(reply) => {
                let description = reply.description.unwrap_or_else(|| status.to_string());
                tracing::error!(%status, %description, "telegram rejected message");
                DispatchOutcome::failed(format!("telegram error: {description}"))
            }
            None => {
                tracing::error!(%status, %body, "unexpected telegram response");
                DispatchOutcome::failed(format!("telegram returned status {status}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TelegramChannel;
    use crate::notify::NotificationChannel;
    use std::time::Duration;

    fn channel(base: &str) -> TelegramChannel {
        TelegramChannel::new(base, "TOKEN", "42", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn payload_sends_plain_text_to_chat() {
        let payload = channel("https://api.telegram.org").payload("Read *notes_v2");

        assert_eq!(payload["chat_id"], "42");
        assert_eq!(payload["text"], "Read *notes_v2");
        assert!(payload.get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn transport_failure_does_not_leak_bot_token() {
        let channel =
            TelegramChannel::new("http://127.0.0.1:1", "SECRET123", "42", Duration::from_secs(2))
                .unwrap();

        let outcome = channel.send("hi").await;

        assert!(!outcome.delivered);
        assert!(outcome.detail.starts_with("request failed"));
        assert!(!outcome.detail.contains("SECRET123"));
    }

    #[tokio::test]
    async fn send_posts_to_bot_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "chat_id": "42",
                "text": "hello",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;

        let outcome = channel(&server.url()).send("hello").await;

        assert!(outcome.delivered);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_message_reports_description() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let outcome = channel(&server.url()).send("hello").await;

        assert!(!outcome.delivered);
        assert!(outcome.detail.contains("chat not found"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_json_error_reports_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let outcome = channel(&server.url()).send("hello").await;

        assert!(!outcome.delivered);
        assert!(outcome.detail.contains("502"));
        mock.assert_async().await;
    }
}

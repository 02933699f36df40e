use crate::config::Config;
use crate::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;

mod telegram;
pub use telegram::TelegramChannel;

const DISABLE_ENV_VAR: &str = "TASKZEN_DISABLE_NOTIFICATIONS";
const TEST_MESSAGE: &str =
    "✅ This is a test message from TaskZen. Your Telegram integration is working!";

/// Result of a single send. Channels report every failure through this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: bool,
    pub detail: String,
}

impl DispatchOutcome {
    pub fn delivered<M: Into<String>>(detail: M) -> Self {
        Self {
            delivered: true,
            detail: detail.into(),
        }
    }

    pub fn failed<M: Into<String>>(detail: M) -> Self {
        Self {
            delivered: false,
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &str) -> DispatchOutcome;
}

/// Accepts everything and delivers nothing.
pub struct NoopChannel;

#[async_trait]
impl NotificationChannel for NoopChannel {
    fn name(&self) -> &str {
        "noop"
    }

    async fn send(&self, _message: &str) -> DispatchOutcome {
        DispatchOutcome::delivered("notifications disabled")
    }
}

/// Stands in when credentials are missing so each dispatch fails softly.
pub struct UnconfiguredChannel {
    reason: String,
}

impl UnconfiguredChannel {
    pub fn new<M: Into<String>>(reason: M) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for UnconfiguredChannel {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn send(&self, _message: &str) -> DispatchOutcome {
        DispatchOutcome::failed(format!("not configured: {}", self.reason))
    }
}

pub fn channel_from_config(config: &Config) -> Result<Arc<dyn NotificationChannel>, AppError> {
    if disabled_by(std::env::var(DISABLE_ENV_VAR).ok().as_deref()) {
        return Ok(Arc::new(NoopChannel));
    }
    telegram_or_unconfigured(config)
}

fn disabled_by(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => false,
        Some(value) => !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no"),
    }
}

fn telegram_or_unconfigured(config: &Config) -> Result<Arc<dyn NotificationChannel>, AppError> {
    let telegram = &config.telegram;
    let token = telegram.bot_token.as_deref().map(str::trim).unwrap_or("");
    let chat_id = telegram.chat_id.as_deref().map(str::trim).unwrap_or("");

    if token.is_empty() || chat_id.is_empty() {
        tracing::warn!("Telegram bot token or chat id is not configured");
        return Ok(Arc::new(UnconfiguredChannel::new(
            "telegram bot token or chat id missing",
        )));
    }

    let channel = TelegramChannel::new(
        &telegram.api_base,
        token,
        chat_id,
        config.dispatch_timeout(),
    )?;
    Ok(Arc::new(channel))
}

/// Sends a fixed message so the operator can verify the channel end to end.
pub async fn send_test_message(channel: &dyn NotificationChannel) -> DispatchOutcome {
    let outcome = channel.send(TEST_MESSAGE).await;
    if outcome.delivered {
        tracing::info!(channel = channel.name(), "test message sent");
    } else {
        tracing::error!(channel = channel.name(), detail = %outcome.detail, "test message failed");
    }
    outcome
}

// src/notifications/telegram_notifier.rs
use crate::errors::NotifyError;
use crate::notifications::Notifier;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

#[derive(Debug)]
pub struct TelegramNotifier {
    client: Client,
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        let notifier = Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            bot_token: bot_token.filter(|t| !t.is_empty()),
            chat_id: chat_id.filter(|c| !c.is_empty()),
            api_base: "https://api.telegram.org".to_string(),
        };

        if notifier.is_enabled() {
            info!("📱 Telegram notifier initialized");
        } else {
            warn!("📱 Telegram notifier disabled - missing TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID");
        }
        notifier
    }

    pub fn from_env() -> Self {
        Self::new(env::var("TELEGRAM_BOT_TOKEN").ok(), env::var("TELEGRAM_CHAT_ID").ok())
    }

    pub fn is_enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let (Some(bot_token), Some(chat_id)) = (self.bot_token.as_ref(), self.chat_id.as_ref()) else {
            return Err(NotifyError::Disabled);
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, bot_token);
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        let body: TelegramResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                error!("📱 Unreadable Telegram response (status {}): {}", status, e);
                return Err(NotifyError::Api(format!("unreadable response with status {}", status)));
            }
        };

        if !body.ok {
            let description = body.description.unwrap_or_else(|| "Unknown error".to_string());
            error!("📱 Failed to send Telegram notification: {}", description);
            return Err(NotifyError::Api(description));
        }
        Ok(())
    }

    pub async fn send_test_message(&self) -> Result<(), NotifyError> {
        let message = "🤖 <b>Dot stage tracker test</b>\n\nTelegram notifications are working correctly!";
        self.send_message(message).await?;
        info!("📱 Telegram test message sent successfully");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        if !self.is_enabled() {
            debug!("📱 Telegram disabled, dropping message");
            return Ok(());
        }
        self.send_message(message).await?;
        info!("📱 Telegram notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_credentials() {
        assert!(!TelegramNotifier::new(None, Some("chat".to_string())).is_enabled());
        assert!(!TelegramNotifier::new(Some(String::new()), Some("chat".to_string())).is_enabled());
        assert!(TelegramNotifier::new(Some("token".to_string()), Some("chat".to_string())).is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_notifier_swallows_messages() {
        let notifier = TelegramNotifier::new(None, None);
        assert!(notifier.notify("hello").await.is_ok());
        assert!(matches!(notifier.send_test_message().await, Err(NotifyError::Disabled)));
    }
}

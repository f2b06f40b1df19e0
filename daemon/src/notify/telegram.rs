//! Telegram Bot API notifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};
use url::Url;

use crate::errors::DaemonError;
use crate::notify::Notifier;
use crate::storage::settings::Settings;

/// Per-request timeout of the Bot API call
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends each message to every admin chat through `sendMessage`
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: SecretString,
    admins: Vec<String>,
}

impl TelegramNotifier {
    pub fn new(
        api_base: &str,
        token: SecretString,
        admins: Vec<String>,
    ) -> Result<Self, DaemonError> {
        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            admins,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, DaemonError> {
        let token = settings
            .telebot_token
            .clone()
            .ok_or_else(|| DaemonError::ConfigError("telebot_token is not set".to_string()))?;
        Self::new(&settings.telegram_api_base, token, settings.admins.clone())
    }

    /// `sendMessage` URL for one chat, with the text query-encoded
    fn send_url(&self, chat_id: &str, text: &str) -> Result<Url, url::ParseError> {
        let base = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            self.token.expose_secret()
        );
        Url::parse_with_params(&base, &[("chat_id", chat_id), ("text", text)])
    }

    async fn send_to(&self, chat_id: &str, text: &str) -> Result<(), DaemonError> {
        let url = self
            .send_url(chat_id, text)
            .map_err(|e| DaemonError::ConfigError(format!("invalid Telegram API URL: {}", e)))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DaemonError::HttpError(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DaemonError::Internal(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) {
        for chat_id in &self.admins {
            match self.send_to(chat_id, text).await {
                Ok(()) => debug!("Notified admin {}", chat_id),
                Err(e) => error!("Failed to notify admin {}: {}", chat_id, e),
            }
        }
    }
}

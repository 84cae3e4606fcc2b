use crate::config::Settings;
use crate::domain::digest::AlertDigest;
use crate::notify::NotificationSink;
use anyhow::Context;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const PARSE_MODE: &str = "Markdown";

#[derive(Debug, Clone)]
struct Credentials {
    token: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Clone)]
pub struct TelegramSink {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl TelegramSink {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(
            &settings.telegram_base_url,
            settings.telegram_bot_token.clone(),
            settings.telegram_chat_id.clone(),
            Duration::from_secs(settings.telegram_timeout_secs),
        )
    }

    /// Missing credentials produce a sink that always reports failure.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        chat_id: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let token = token.filter(|s| !s.trim().is_empty());
        let chat_id = chat_id.filter(|s| !s.trim().is_empty());

        let credentials = match (token, chat_id) {
            (Some(token), Some(chat_id)) => Some(Credentials { token, chat_id }),
            (token, chat_id) => {
                tracing::warn!(
                    token_present = token.is_some(),
                    chat_id_present = chat_id.is_some(),
                    "TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not configured; alert dispatch disabled"
                );
                None
            }
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build telegram http client")?;

        let base_url = if base_url.trim().is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn send_message(&self, creds: &Credentials, text: &str) -> anyhow::Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, creds.token);
        let req = SendMessageRequest {
            chat_id: &creds.chat_id,
            text,
            parse_mode: PARSE_MODE,
        };

        // The URL embeds the bot token; keep it out of errors.
        let res = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("telegram request failed")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("telegram HTTP {status}: {body}");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationSink for TelegramSink {
    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn deliver(&self, digest: &AlertDigest) -> bool {
        let Some(creds) = self.credentials.as_ref() else {
            tracing::debug!("telegram credentials missing; skipping delivery");
            return false;
        };

        match self.send_message(creds, &digest.render()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "telegram delivery failed");
                false
            }
        }
    }
}

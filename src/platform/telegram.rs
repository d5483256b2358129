use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;

/// Telegram rejects messages longer than 4096 characters.
const MAX_CHUNK_LEN: usize = 4000;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Telegram API request failed: {0}")]
    Request(#[from] teloxide::RequestError),
    #[error("Telegram file download failed: {0}")]
    Download(#[from] teloxide::DownloadError),
    #[error("Telegram API unreachable: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for TelegramError {
    /// Request URLs embed the bot token; drop them before the error is displayed.
    fn from(e: reqwest::Error) -> Self {
        TelegramError::Http(e.without_url())
    }
}

/// Outbound calls the relay makes against the messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;

    /// Resolve a file reference to its download path (`getFile`).
    async fn file_path(&self, file_id: &str) -> Result<String, TelegramError>;

    async fn download(&self, path: &str) -> Result<Vec<u8>, TelegramError>;

    /// Register `url` as the callback target, returning Telegram's raw answer.
    async fn set_webhook(&self, url: &str) -> Result<serde_json::Value, TelegramError>;
}

pub struct TelegramClient {
    bot: Bot,
    http: reqwest::Client,
    api_url: reqwest::Url,
    token: String,
}

impl TelegramClient {
    /// Returns `Ok(None)` when no bot token is configured.
    pub fn new(config: &TelegramConfig) -> Result<Option<Self>> {
        let Some(token) = config.bot_token.clone() else {
            return Ok(None);
        };

        let mut api_url = config.api_url.clone();
        if !api_url.ends_with('/') {
            api_url.push('/');
        }
        let api_url = reqwest::Url::parse(&api_url)
            .with_context(|| format!("Invalid Telegram API URL: {}", config.api_url))?;

        let bot = Bot::new(token.clone()).set_api_url(api_url.clone());

        Ok(Some(Self {
            bot,
            http: reqwest::Client::new(),
            api_url,
            token,
        }))
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn file_path(&self, file_id: &str) -> Result<String, TelegramError> {
        let file = self.bot.get_file(FileId(file_id.to_string())).await?;
        Ok(file.path)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, TelegramError> {
        let mut buffer = Vec::new();
        self.bot.download_file(path, &mut buffer).await?;
        debug!("Downloaded {} bytes from {}", buffer.len(), path);
        Ok(buffer)
    }

    async fn set_webhook(&self, url: &str) -> Result<serde_json::Value, TelegramError> {
        let endpoint = format!("{}bot{}/setWebhook", self.api_url, self.token);
        info!("Registering webhook: {}", url);

        // Error answers are JSON too; hand them back untouched.
        let response = self
            .http
            .get(&endpoint)
            .query(&[("url", url)])
            .send()
            .await?;
        Ok(response.json().await?)
    }
}

/// Split long messages for Telegram's 4096 char limit
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Best-effort delivery: failures are logged, never retried or returned.
pub async fn send_reply(messenger: &dyn Messenger, chat_id: i64, text: &str) {
    if text.trim().is_empty() {
        debug!("Skipping empty reply to chat {}", chat_id);
        return;
    }

    for chunk in split_message(text, MAX_CHUNK_LEN) {
        if let Err(e) = messenger.send_message(chat_id, &chunk).await {
            warn!("Failed to send message to chat {}: {}", chat_id, e);
        }
    }
}

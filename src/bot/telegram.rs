//! Telegram send wrapper using teloxide.

use std::path::Path;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::InputFile;
use tokio::time::sleep;
use tracing::{info, warn};

/// Telegram caps text messages at 4096 chars.
const MAX_TEXT_LEN: usize = 4096;

/// Bot API rejects uploads over 50MB.
const MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Attempts for file sends; backoff doubles between them.
const SEND_ATTEMPTS: u32 = 3;

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), String> {
        let text: String = text.chars().take(MAX_TEXT_LEN).collect();
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to send message: {e}");
                warn!("{}", msg);
                msg
            })
    }

    /// Send an audio file as a document, retrying with exponential
    /// backoff on transient failures.
    pub async fn send_audio_file(&self, chat_id: i64, path: &Path) -> Result<(), String> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| format!("File not found {path:?}: {e}"))?;
        if meta.len() > MAX_FILE_BYTES {
            return Err(format!(
                "File too large: {} bytes (limit {})",
                meta.len(),
                MAX_FILE_BYTES
            ));
        }

        let caption = path
            .file_stem()
            .map(|s| format!("🎵 {}", s.to_string_lossy()))
            .unwrap_or_default();

        let mut last_err = String::new();
        for attempt in 0..SEND_ATTEMPTS {
            info!(
                "Sending {:?} to chat {} (attempt {})",
                path.file_name().unwrap_or_default(),
                chat_id,
                attempt + 1
            );
            let result = self
                .bot
                .send_document(ChatId(chat_id), InputFile::file(path))
                .caption(caption.as_str())
                .await;

            match result {
                Ok(_) => return Ok(()),
                Err(e) => {
                    last_err = format!("Send attempt {} failed: {e}", attempt + 1);
                    warn!("{}", last_err);
                    if attempt + 1 < SEND_ATTEMPTS {
                        sleep(Duration::from_secs(1 << attempt)).await;
                    }
                }
            }
        }
        Err(last_err)
    }
}

//! Telegram Bot channel — long polling + publishing via Bot API.

use async_trait::async_trait;
use postpilot_core::error::{PostPilotError, Result};
use postpilot_core::traits::Publisher;
use postpilot_core::types::IncomingMessage;
use serde::{Deserialize, Serialize};

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 {
    1
}

/// Telegram Bot API client. Cheap to clone; the polling loop owns its own
/// copy and publishes decoded updates over an mpsc channel.
#[derive(Clone)]
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// POST a Bot API method and unwrap the response envelope.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| PostPilotError::Channel(format!("{method} failed: {e}")))?;

        let envelope: TelegramApiResponse<T> = response
            .json()
            .await
            .map_err(|e| PostPilotError::Channel(format!("Invalid {method} response: {e}")))?;

        if !envelope.ok {
            return Err(PostPilotError::Channel(format!(
                "{method} error: {}",
                envelope.description.unwrap_or_default()
            )));
        }
        envelope
            .result
            .ok_or_else(|| PostPilotError::Channel(format!("{method}: empty result")))
    }

    /// Get bot info — used at startup as a token check.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| PostPilotError::Channel(format!("getMe failed: {e}")))?;
        let envelope: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| PostPilotError::Channel(format!("Invalid getMe response: {e}")))?;
        envelope
            .result
            .ok_or_else(|| PostPilotError::Channel("No bot info".into()))
    }

    /// Get updates using long polling.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "30".into()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .send()
            .await
            .map_err(|e| PostPilotError::Channel(format!("getUpdates failed: {e}")))?;

        let envelope: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| PostPilotError::Channel(format!("Invalid updates response: {e}")))?;

        if !envelope.ok {
            return Err(PostPilotError::Channel(format!(
                "getUpdates error: {}",
                envelope.description.unwrap_or_default()
            )));
        }
        Ok(envelope.result.unwrap_or_default())
    }

    /// Start the polling loop — returns a receiver of incoming messages.
    pub fn start_polling(self) -> tokio::sync::mpsc::UnboundedReceiver<IncomingMessage> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut last_update_id = 0i64;
            tracing::info!("Telegram polling loop started");

            loop {
                match self.get_updates(last_update_id + 1).await {
                    Ok(updates) => {
                        for update in updates {
                            last_update_id = last_update_id.max(update.update_id);
                            if let Some(msg) = update.to_incoming()
                                && tx.send(msg).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(
                    self.config.poll_interval,
                ))
                .await;
            }
        });

        rx
    }
}

#[async_trait]
impl Publisher for TelegramChannel {
    async fn send_photo(&self, chat_id: i64, file_id: &str, caption: Option<&str>) -> Result<i64> {
        let msg: TelegramMessage = self
            .call(
                "sendPhoto",
                serde_json::json!({
                    "chat_id": chat_id,
                    "photo": file_id,
                    "caption": caption.unwrap_or(""),
                }),
            )
            .await?;
        Ok(msg.message_id)
    }

    async fn send_video(&self, chat_id: i64, file_id: &str, caption: Option<&str>) -> Result<i64> {
        let msg: TelegramMessage = self
            .call(
                "sendVideo",
                serde_json::json!({
                    "chat_id": chat_id,
                    "video": file_id,
                    "caption": caption.unwrap_or(""),
                }),
            )
            .await?;
        Ok(msg.message_id)
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64> {
        let msg: TelegramMessage = self
            .call(
                "sendMessage",
                serde_json::json!({
                    "chat_id": chat_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(msg.message_id)
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Vec<TelegramPhotoSize>>,
    pub video: Option<TelegramVideo>,
    pub contact: Option<TelegramContact>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramVideo {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramContact {
    pub phone_number: String,
    pub user_id: Option<i64>,
}

impl TelegramUpdate {
    /// Convert to a channel-neutral IncomingMessage. Bot senders and
    /// payload-less updates are dropped.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;
        let from = msg.from.as_ref()?;
        if from.is_bot {
            return None;
        }

        let phone = msg.contact.as_ref().map(|c| c.phone_number.clone());
        // Largest photo variant carries the best quality file id
        let photo_file_id = msg.photo.as_ref().and_then(|sizes| {
            sizes
                .iter()
                .max_by_key(|s| s.width * s.height)
                .map(|s| s.file_id.clone())
        });
        let video_file_id = msg.video.as_ref().map(|v| v.file_id.clone());
        let text = msg.text.clone().unwrap_or_default();
        if text.is_empty() && phone.is_none() && photo_file_id.is_none() && video_file_id.is_none()
        {
            return None;
        }

        // "/start post_5" → deep link "post_5"
        let deep_link = text
            .strip_prefix("/start ")
            .map(|arg| arg.trim().to_string())
            .filter(|arg| !arg.is_empty());

        Some(IncomingMessage {
            chat_id: msg.chat.id,
            sender_id: from.id,
            sender_name: Some(format!(
                "{}{}",
                from.first_name,
                from.last_name
                    .as_deref()
                    .map(|l| format!(" {l}"))
                    .unwrap_or_default()
            )),
            username: from.username.clone(),
            text,
            photo_file_id,
            video_file_id,
            caption: msg.caption.clone(),
            deep_link,
            phone,
            is_private: msg.chat.chat_type == "private",
            timestamp: chrono::Utc::now(),
        })
    }
}

//! Telegram Bot API transport adapter.
//!
//! Outbound: `sendMessage` with optional inline keyboards. Inbound:
//! `getUpdates` long polling, voice note download via `getFile`, and
//! callback acknowledgement. Payloads are navigated as `serde_json`
//! values; parsing is kept in pure functions so it can be tested without
//! a network.

use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::{json, Value};
use tracing::debug;

use nudge_core::config::TransportConfig;
use nudge_core::error::NudgeError;
use nudge_core::types::{ConfirmationChoice, UserId};

use crate::traits::{ChoiceOption, DeliveryError, MessageTransport};

/// An inbound event from Telegram, reduced to what intake cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundUpdate {
    /// A free-text message (not starting with '/').
    Text { user_id: UserId, text: String },
    /// A bot command such as `/start`.
    Command { user_id: UserId, command: String },
    /// A voice note, identified by its downloadable file id.
    Voice { user_id: UserId, file_id: String },
    /// An inline-keyboard selection.
    Choice {
        user_id: UserId,
        callback_id: String,
        choice: ConfirmationChoice,
    },
}

/// Telegram Bot API adapter.
pub struct TelegramTransport {
    token: String,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
    /// Next getUpdates offset (last seen update_id + 1).
    offset: AtomicI64,
}

impl TelegramTransport {
    pub fn new(token: String, config: &TransportConfig) -> Self {
        Self {
            token,
            api_base: config.api_base.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            client: reqwest::Client::new(),
            offset: AtomicI64::new(0),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, NudgeError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| NudgeError::Transport(format!("{method} request failed: {e}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| NudgeError::Transport(format!("{method} returned invalid JSON: {e}")))?;

        if !status.is_success() || payload.get("ok") != Some(&Value::Bool(true)) {
            return Err(NudgeError::Transport(format!(
                "{method} failed ({status}): {payload}"
            )));
        }
        Ok(payload)
    }

    /// Long-poll for new updates and advance the internal offset.
    pub async fn poll_updates(&self) -> Result<Vec<InboundUpdate>, NudgeError> {
        let body = json!({
            "offset": self.offset.load(Ordering::Relaxed),
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let payload = self.call("getUpdates", body).await?;

        let (updates, max_update_id) = parse_updates(&payload);
        if let Some(max_id) = max_update_id {
            self.offset.store(max_id + 1, Ordering::Relaxed);
        }
        Ok(updates)
    }

    /// Skip any backlog accumulated while the process was down.
    pub async fn drop_pending_updates(&self) -> Result<(), NudgeError> {
        let body = json!({ "offset": -1, "timeout": 0 });
        let payload = self.call("getUpdates", body).await?;

        let (_, max_update_id) = parse_updates(&payload);
        if let Some(max_id) = max_update_id {
            self.offset.store(max_id + 1, Ordering::Relaxed);
            debug!(offset = max_id + 1, "Dropped pending update backlog");
        }
        Ok(())
    }

    /// Download the raw bytes of a voice note.
    pub async fn download_voice(&self, file_id: &str) -> Result<Vec<u8>, NudgeError> {
        let payload = self.call("getFile", json!({ "file_id": file_id })).await?;
        let file_path = payload
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| NudgeError::Transport("getFile returned no file_path".to_string()))?;

        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, file_path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NudgeError::Transport(format!("voice download failed: {e}")))?;

        if !response.status().is_success() {
            return Err(NudgeError::Transport(format!(
                "voice download failed ({})",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| NudgeError::Transport(format!("voice download failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Acknowledge a callback query so the client stops its spinner.
    pub async fn answer_callback(&self, callback_id: &str) -> Result<(), NudgeError> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_id }),
        )
        .await?;
        Ok(())
    }

    async fn send_payload(&self, body: Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let description = response.text().await.unwrap_or_default();
        Err(classify_send_failure(status.as_u16(), &description))
    }
}

impl MessageTransport for TelegramTransport {
    async fn send(&self, user_id: UserId, text: &str) -> Result<(), DeliveryError> {
        self.send_payload(json!({ "chat_id": user_id, "text": text }))
            .await
    }

    async fn present_choice(
        &self,
        user_id: UserId,
        prompt: &str,
        options: &[ChoiceOption],
    ) -> Result<(), DeliveryError> {
        let keyboard: Vec<Vec<Value>> = options
            .iter()
            .map(|option| vec![json!({ "text": option.label, "callback_data": option.data })])
            .collect();

        self.send_payload(json!({
            "chat_id": user_id,
            "text": prompt,
            "reply_markup": { "inline_keyboard": keyboard },
        }))
        .await
    }
}

/// Classify a failed sendMessage response.
///
/// 403 means the user blocked the bot or their account is gone; "chat not
/// found" means the recipient never existed from the bot's point of view.
/// Both are permanent. Everything else is assumed transient and retried.
pub fn classify_send_failure(status: u16, description: &str) -> DeliveryError {
    let lowered = description.to_lowercase();
    if status == 403 || lowered.contains("blocked") || lowered.contains("chat not found") {
        DeliveryError::RecipientUnreachable(format!("{status}: {description}"))
    } else {
        DeliveryError::Transient(format!("{status}: {description}"))
    }
}

/// Parse a getUpdates payload into inbound events.
///
/// Returns the events plus the highest update_id seen (for offset
/// advancement). Updates that intake has no use for are skipped but still
/// counted into the offset so they are not re-delivered forever.
pub fn parse_updates(payload: &Value) -> (Vec<InboundUpdate>, Option<i64>) {
    let mut updates = Vec::new();
    let mut max_update_id = None;

    let Some(entries) = payload.get("result").and_then(Value::as_array) else {
        return (updates, max_update_id);
    };

    for entry in entries {
        if let Some(update_id) = entry.get("update_id").and_then(Value::as_i64) {
            max_update_id = Some(max_update_id.map_or(update_id, |m: i64| m.max(update_id)));
        }

        if let Some(update) = parse_update(entry) {
            updates.push(update);
        }
    }

    (updates, max_update_id)
}

fn parse_update(entry: &Value) -> Option<InboundUpdate> {
    if let Some(callback) = entry.get("callback_query") {
        let user_id = callback.get("from")?.get("id")?.as_i64()?;
        let callback_id = callback.get("id")?.as_str()?.to_string();
        let data = callback.get("data").and_then(Value::as_str).unwrap_or("");
        let choice = ConfirmationChoice::parse(data)?;
        return Some(InboundUpdate::Choice {
            user_id,
            callback_id,
            choice,
        });
    }

    let message = entry.get("message")?;
    let user_id = message.get("from")?.get("id")?.as_i64()?;

    if let Some(voice) = message.get("voice") {
        let file_id = voice.get("file_id")?.as_str()?.to_string();
        return Some(InboundUpdate::Voice { user_id, file_id });
    }

    let text = message.get("text")?.as_str()?.to_string();
    if let Some(command) = text.strip_prefix('/') {
        let command = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        return Some(InboundUpdate::Command { user_id, command });
    }

    Some(InboundUpdate::Text { user_id, text })
}

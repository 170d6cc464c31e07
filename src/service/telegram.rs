//! Telegram Bot API transport

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::service::{MessageFormat, Service, ServiceError, check_status, split_message};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Posts messages to one chat through a bot.
///
/// The text is sent with `parse_mode` matching its format. If Telegram
/// refuses to parse it (400), the chunk is sent again as plain text.
pub struct TelegramService {
    bot_token: String,
    chat_id: String,
    format: MessageFormat,
    api_base: String,
    client: Client,
}

impl TelegramService {
    pub fn new(bot_token: String, chat_id: String, format: MessageFormat) -> Self {
        Self {
            bot_token,
            chat_id,
            format,
            api_base: TELEGRAM_API_BASE.to_string(),
            client: Client::new(),
        }
    }

    /// Point the service at another Bot API server
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn parse_mode(&self) -> &'static str {
        match self.format {
            MessageFormat::Html => "HTML",
            MessageFormat::Markdown => "Markdown",
        }
    }

    fn formatted_payload(&self, text: &str) -> serde_json::Value {
        json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": self.parse_mode(),
        })
    }

    fn plain_payload(&self, text: &str) -> serde_json::Value {
        json!({
            "chat_id": self.chat_id,
            "text": text,
        })
    }

    fn send_chunk(&self, text: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&self.formatted_payload(text))
            .send()?;

        if response.status() != StatusCode::BAD_REQUEST {
            return check_status(response);
        }

        warn!(
            chat_id = %self.chat_id,
            parse_mode = self.parse_mode(),
            "Telegram could not parse message entities; retrying as plain text"
        );
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&self.plain_payload(text))
            .send()?;
        check_status(response)
    }
}

impl Service for TelegramService {
    fn name(&self) -> &str {
        "telegram"
    }

    fn wants_markdown(&self) -> bool {
        self.format == MessageFormat::Markdown
    }

    fn send(&self, text: &str) -> Result<(), ServiceError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_chunk(chunk)?;
        }
        debug!(chat_id = %self.chat_id, "Telegram message sent");
        Ok(())
    }
}

//! Discord webhook transport

use reqwest::blocking::Client;
use serde_json::json;
use tracing::debug;

use crate::service::{MessageFormat, Service, ServiceError, check_status, split_message};

/// Discord rejects message content above this many characters.
const DISCORD_MAX_MESSAGE_LENGTH: usize = 2000;

/// Posts messages to a channel webhook.
pub struct DiscordService {
    webhook_url: String,
    format: MessageFormat,
    client: Client,
}

impl DiscordService {
    pub fn new(webhook_url: String, format: MessageFormat) -> Self {
        Self {
            webhook_url,
            format,
            client: Client::new(),
        }
    }

    fn payload(text: &str) -> serde_json::Value {
        json!({ "content": text })
    }
}

impl Service for DiscordService {
    fn name(&self) -> &str {
        "discord"
    }

    fn wants_markdown(&self) -> bool {
        self.format == MessageFormat::Markdown
    }

    fn send(&self, text: &str) -> Result<(), ServiceError> {
        for chunk in split_message(text, DISCORD_MAX_MESSAGE_LENGTH) {
            let response = self
                .client
                .post(&self.webhook_url)
                .json(&Self::payload(chunk))
                .send()?;
            check_status(response)?;
        }
        debug!("Discord message sent");
        Ok(())
    }
}

//! Downstream notification services

pub mod discord;
#[cfg(test)]
mod http_stub;
pub mod telegram;

pub use discord::DiscordService;
pub use telegram::TelegramService;

use reqwest::StatusCode;
use reqwest::blocking::Response;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service answered {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Which form of a processed message a service should receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Html,
    Markdown,
}

/// A notification target.
///
/// Services are built once at startup and shared by every SMTP session, so
/// `send` takes `&self` and must be safe to call from several threads.
pub trait Service: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Whether this service takes the Markdown form instead of the HTML one
    fn wants_markdown(&self) -> bool;

    fn send(&self, text: &str) -> Result<(), ServiceError>;
}

/// Turn a non-2xx response into [`ServiceError::Rejected`]
pub(crate) fn check_status(response: Response) -> Result<(), ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().unwrap_or_default();
    Err(ServiceError::Rejected { status, body })
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Splits at the last newline before the limit, else the last space, else
/// at the limit itself. Whitespace at the start of a continuation chunk is
/// dropped. Empty input yields no chunks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    // Byte offset of the first character past the limit, if there is one
    while let Some((limit, _)) = remaining.char_indices().nth(max_chars) {
        let window = &remaining[..limit];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&at| at > 0)
            .unwrap_or(limit);
        // A zero limit still has to make progress
        let split_at = if split_at == 0 {
            remaining.chars().next().map_or(remaining.len(), char::len_utf8)
        } else {
            split_at
        };

        chunks.push(&remaining[..split_at]);
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining);
    }

    chunks
}

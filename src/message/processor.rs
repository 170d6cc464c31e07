//! Turns a raw message into the two forms services consume

use std::io::Read;

use crate::message::error::{ConversionError, MessageError};
use crate::message::markup::to_markdown;
use crate::message::normalize::normalize;
use crate::message::reader::read_body;

/// The relayable forms of one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMessage {
    /// Normalized body as extracted from the message (HTML or plain text)
    pub html: String,
    /// `html` converted to Markdown
    pub markdown: String,
}

/// Extract, normalize and convert the body of the message read from `reader`.
///
/// When conversion fails the normalized body is carried by
/// [`MessageError::Markup`].
pub fn process<R: Read>(reader: R) -> Result<ProcessedMessage, MessageError> {
    process_with(reader, to_markdown)
}

/// [`process`] with a caller-supplied Markdown converter
pub fn process_with<R, F>(reader: R, convert: F) -> Result<ProcessedMessage, MessageError>
where
    R: Read,
    F: FnOnce(&str) -> Result<String, ConversionError>,
{
    let body = read_body(reader)?;
    let html = normalize(&body);

    match convert(&html) {
        Ok(markdown) => Ok(ProcessedMessage { html, markdown }),
        Err(source) => Err(MessageError::Markup { html, source }),
    }
}

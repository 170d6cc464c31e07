//! Extracts a single textual body from a raw MIME message

use std::io::Read;

use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::message::error::MessageError;

/// The text flavours a body can be taken from
#[derive(Debug, Clone, Copy, PartialEq)]
enum TextKind {
    Plain,
    Html,
}

impl TextKind {
    fn of(part: &MessagePart<'_>) -> Option<Self> {
        let content_type = part.content_type()?;
        if !content_type.ctype().eq_ignore_ascii_case("text") {
            return None;
        }

        match content_type.subtype() {
            Some(subtype) if subtype.eq_ignore_ascii_case("plain") => Some(Self::Plain),
            Some(subtype) if subtype.eq_ignore_ascii_case("html") => Some(Self::Html),
            _ => None,
        }
    }
}

/// Read a whole message from `reader` and return its most useful body.
///
/// For multipart messages the first `text/html` part wins; without one, all
/// `text/plain` parts are concatenated in order. Other parts are ignored.
/// A single-part message yields its whole decoded body whatever its type.
pub fn read_body<R: Read>(mut reader: R) -> Result<String, MessageError> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    check_header_block(&raw)?;

    let message = MessageParser::default()
        .parse(raw.as_slice())
        .ok_or(MessageError::Parse)?;

    if let Some(body) = multipart_body(&message)? {
        return Ok(body);
    }

    let root = message.root_part();
    if root.is_encoding_problem {
        return Err(MessageError::PartRead { index: 0 });
    }
    Ok(String::from_utf8_lossy(root.contents()).into_owned())
}

/// Reject a message whose header section is not made of `name: value`
/// fields and their folded continuation lines.
///
/// mail-parser skips lines it cannot read as a header field, which would
/// relay the body of a malformed message.
fn check_header_block(raw: &[u8]) -> Result<(), MessageError> {
    if raw.is_empty() {
        return Err(MessageError::Parse);
    }

    let mut seen_field = false;
    for line in raw.split(|&byte| byte == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            break;
        }

        let folded = matches!(line.first(), Some(b' ' | b'\t'));
        if folded && seen_field {
            continue;
        }
        if folded || !is_header_field(line) {
            return Err(MessageError::Parse);
        }
        seen_field = true;
    }

    Ok(())
}

/// RFC 5322 field name (printable ASCII except `:`) followed by a colon
fn is_header_field(line: &[u8]) -> bool {
    let Some(colon) = line.iter().position(|&byte| byte == b':') else {
        return false;
    };
    let name = &line[..colon];
    !name.is_empty() && name.iter().all(|&byte| (33..=126).contains(&byte))
}

/// Walk the direct children of a multipart root.
///
/// Returns `Ok(None)` when the message is not multipart.
fn multipart_body(message: &Message<'_>) -> Result<Option<String>, MessageError> {
    let PartType::Multipart(children) = &message.root_part().body else {
        return Ok(None);
    };

    let mut body = String::new();
    for &id in children {
        let Some(part) = message.part(id) else {
            continue;
        };
        let Some(kind) = TextKind::of(part) else {
            continue;
        };
        if part.is_encoding_problem {
            return Err(MessageError::PartRead { index: id });
        }

        let contents = String::from_utf8_lossy(part.contents());
        match kind {
            TextKind::Plain => body.push_str(&contents),
            TextKind::Html => {
                body.clear();
                body.push_str(&contents);
                break;
            }
        }
    }

    Ok(Some(body))
}

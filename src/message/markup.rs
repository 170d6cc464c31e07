//! HTML to Markdown conversion

use std::any::Any;
use std::panic;

use crate::message::error::ConversionError;

/// Convert HTML-ish text to Markdown with `html2md`.
///
/// Plain text without tags passes through unchanged. html2md has no error
/// channel, so a panic inside it is caught and reported as a
/// [`ConversionError`] instead of unwinding through the session thread.
pub fn to_markdown(body: &str) -> Result<String, ConversionError> {
    panic::catch_unwind(|| html2md::parse_html(body)).map_err(|payload| ConversionError {
        reason: panic_reason(payload.as_ref()),
    })
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "converter panicked".to_string()
    }
}

//! Error types for the body extraction pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("failed to read message: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed MIME message")]
    Parse,

    #[error("MIME part {index} could not be decoded")]
    PartRead { index: u32 },

    /// The body was extracted but could not be converted. `html` holds the
    /// normalized body that was fed to the converter.
    #[error("markdown conversion failed")]
    Markup {
        html: String,
        #[source]
        source: ConversionError,
    },
}

/// Failure of the HTML to Markdown conversion primitive
#[derive(Error, Debug, Clone, PartialEq)]
#[error("HTML to Markdown conversion failed: {reason}")]
pub struct ConversionError {
    pub reason: String,
}

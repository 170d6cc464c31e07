//! Body extraction pipeline: MIME reader, normalizer and Markdown converter

pub mod error;
pub mod markup;
pub mod normalize;
pub mod processor;
pub mod reader;

pub use error::{ConversionError, MessageError};
pub use markup::to_markdown;
pub use normalize::normalize;
pub use processor::{ProcessedMessage, process, process_with};
pub use reader::read_body;

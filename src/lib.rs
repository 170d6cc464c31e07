//! # Mailbell
//!
//! Mailbell is an SMTP to chat notification gateway.
//!
//! It accepts mail from anything that can send it (monitoring systems,
//! cron, appliances), extracts the most readable body and forwards it to
//! Telegram and Discord.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mailbell::{GatewayConfig, build_server};
//!
//! let config = GatewayConfig::load("mailbell.toml").unwrap();
//! let server = build_server(&config);
//!
//! // Blocks, serving each connection on its own thread
//! server.start(&config.smtp.address()).unwrap();
//! ```
//!
//! ## Body extraction
//!
//! - For a multipart message the first `text/html` part wins. Without one,
//!   every `text/plain` part is concatenated in order.
//! - A single-part message is relayed whatever its content type.
//! - `<br>` tags become newlines and surrounding whitespace is trimmed.
//! - Services that want Markdown receive the `html2md` conversion.
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the sender
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify the destination (multiple destinations are supported)
//! - `DATA` - Send the email body
//! - `RSET` - Reset the current transaction
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! ## Notes
//!
//! - Only the "minimal implementation" defined in RFC 821 is implemented.
//! - Messages are relayed synchronously. Nothing is queued or retried.
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.
//!
//! ## Size Limits
//!
//! The server enforces RFC 821 size limits:
//! - User names: 64 characters max
//! - Domain names: 64 characters max
//! - Paths: 256 characters max
//! - Command lines: 512 characters max
//! - Text lines: 1000 characters max
//! - Recipients: 100 max per message
//! - Message data: 10 MiB max

pub mod config;
pub mod gateway;
pub mod message;
pub mod service;
mod smtp;

pub use config::{ConfigError, GatewayConfig, ServiceConfig, SmtpConfig};
pub use gateway::{Gateway, GatewayError, build_server};
pub use message::{MessageError, ProcessedMessage, process};
pub use service::{MessageFormat, Service, ServiceError};
pub use smtp::{
    DataLine, Envelope, MailHandler, SmtpError, SmtpLimits, SmtpResponse, SmtpServer,
    SmtpSession, SmtpState,
};

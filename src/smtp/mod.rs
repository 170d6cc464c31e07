//! Minimal SMTP engine: listener, session state machine and handler callbacks

pub mod commands;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod response;
pub mod server;
pub mod session;

pub use envelope::Envelope;
pub use error::{SmtpError, SmtpLimits};
pub use handler::MailHandler;
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{DataLine, SmtpSession, SmtpState};

//! Callbacks the server invokes over the lifetime of a connection

use std::fmt::Display;
use std::io::Read;
use std::net::SocketAddr;

use crate::smtp::envelope::Envelope;

/// Receives the events of every SMTP session served by [`SmtpServer`].
///
/// One handler is shared by all connections, so implementations must be
/// `Send + Sync`. Every callback except [`data`](MailHandler::data) accepts
/// by default. An `Err` is reported to the client as a negative reply; its
/// `Display` text becomes the reply message.
///
/// [`SmtpServer`]: crate::smtp::SmtpServer
pub trait MailHandler: Send + Sync + 'static {
    type Error: Display;

    /// A client connected, before the greeting is sent. Rejecting closes the
    /// connection with a 554 reply.
    fn connect(&self, _peer: Option<SocketAddr>) -> Result<(), Self::Error> {
        Ok(())
    }

    /// MAIL FROM was accepted by the protocol layer. Rejecting answers 550.
    fn mail(&self, _from: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    /// RCPT TO was accepted by the protocol layer. Rejecting answers 550.
    fn rcpt(&self, _to: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    /// The end of DATA was received. `message` yields the dot-unstuffed
    /// payload (headers and body). Rejecting answers 554.
    fn data(&self, envelope: &Envelope, message: &mut dyn Read) -> Result<(), Self::Error>;

    /// The current transaction was discarded (RSET, or after DATA completed).
    fn reset(&self) {}

    /// The connection is closing.
    fn logout(&self) {}
}

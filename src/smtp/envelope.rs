//! Envelope of a completed mail transaction

use std::time::SystemTime;

/// Sender, recipients and arrival time of one SMTP transaction.
///
/// The message content itself is handed to [`MailHandler::data`] as a byte
/// stream alongside the envelope.
///
/// [`MailHandler::data`]: crate::smtp::MailHandler::data
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Reverse-path from MAIL FROM
    pub from: String,

    /// Forward-paths from RCPT TO, in the order they were given
    pub to: Vec<String>,

    /// Domain the client announced with HELO/EHLO
    pub client_domain: Option<String>,

    /// When the end of DATA was received
    pub received_at: SystemTime,
}

impl Envelope {
    pub fn new(from: String, to: Vec<String>, client_domain: Option<String>) -> Self {
        Self {
            from,
            to,
            client_domain,
            received_at: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_creation() {
        let envelope = Envelope::new(
            "sender@example.com".to_string(),
            vec!["recipient@example.com".to_string()],
            Some("client.local".to_string()),
        );

        assert_eq!(envelope.from, "sender@example.com");
        assert_eq!(envelope.to, vec!["recipient@example.com"]);
        assert_eq!(envelope.client_domain.as_deref(), Some("client.local"));
        assert!(envelope.received_at <= SystemTime::now());
    }
}

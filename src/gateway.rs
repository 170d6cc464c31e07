//! The mail handler that relays every accepted message to the services

use std::io::Read;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::message::{ConversionError, MessageError, ProcessedMessage, process_with, to_markdown};
use crate::service::{Service, ServiceError};
use crate::smtp::{Envelope, MailHandler, SmtpServer};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("{name} delivery failed: {source}")]
    Service {
        name: String,
        #[source]
        source: ServiceError,
    },
}

/// Relays messages to a fixed, ordered list of services.
///
/// Any client, sender and recipient is accepted; only the DATA callback can
/// fail.
pub struct Gateway {
    services: Vec<Box<dyn Service>>,
    convert: fn(&str) -> Result<String, ConversionError>,
}

impl Gateway {
    pub fn new(services: Vec<Box<dyn Service>>) -> Self {
        Self {
            services,
            convert: to_markdown,
        }
    }

    /// Replace the html2md based Markdown converter
    pub fn with_converter(mut self, convert: fn(&str) -> Result<String, ConversionError>) -> Self {
        self.convert = convert;
        self
    }

    pub fn services(&self) -> &[Box<dyn Service>] {
        &self.services
    }

    /// Send `message` to every service in order, each in the form it wants.
    ///
    /// Stops at the first failure. Services already notified stay notified.
    pub fn dispatch(&self, message: &ProcessedMessage) -> Result<(), GatewayError> {
        for service in &self.services {
            let text = if service.wants_markdown() {
                &message.markdown
            } else {
                &message.html
            };

            service
                .send(text)
                .map_err(|source| GatewayError::Service {
                    name: service.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl MailHandler for Gateway {
    type Error = GatewayError;

    fn data(&self, envelope: &Envelope, message: &mut dyn Read) -> Result<(), GatewayError> {
        let processed = process_with(message, self.convert).inspect_err(|e| {
            warn!(from = %envelope.from, error = %e, "Could not extract message body");
        })?;

        self.dispatch(&processed).inspect_err(|e| {
            warn!(from = %envelope.from, error = %e, "Relay aborted");
        })?;

        let elapsed_ms = envelope
            .received_at
            .elapsed()
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        info!(
            from = %envelope.from,
            recipients = envelope.to.len(),
            services = self.services.len(),
            elapsed_ms,
            "Message relayed"
        );
        Ok(())
    }
}

/// Build the services named in `config` and wrap them in a server.
/// Nothing is bound yet.
pub fn build_server(config: &GatewayConfig) -> SmtpServer<Gateway> {
    let services = config.services.iter().map(|service| service.build()).collect();
    SmtpServer::new(&config.smtp.hostname, Gateway::new(services))
}

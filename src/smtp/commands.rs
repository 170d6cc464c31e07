//! Implementation of SMTP commands

use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::handler::MailHandler;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;

/// Handles SMTP commands and returns appropriate responses
#[derive(Debug)]
pub struct SmtpCommandHandler<'a, H> {
    hostname: &'a str,
    handler: &'a H,
}

impl<'a, H: MailHandler> SmtpCommandHandler<'a, H> {
    /// Create a new command handler
    pub fn new(hostname: &'a str, handler: &'a H) -> Self {
        Self { hostname, handler }
    }

    /// Process a command line and return a response
    pub fn process_command(
        &self,
        command_line: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if command_line.len() > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
            return Err(SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            });
        }

        let (verb, argument) = match command_line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (command_line, ""),
        };
        if verb.is_empty() {
            return Err(SmtpError::InvalidCommand);
        }

        match verb.to_uppercase().as_str() {
            "HELO" => self.handle_greeting(argument, session, false),
            "EHLO" => self.handle_greeting(argument, session, true),
            "MAIL" => self.handle_mail(argument, session),
            "RCPT" => self.handle_rcpt(argument, session),
            "DATA" => self.handle_data(argument, session),
            "RSET" => self.handle_rset(session),
            "NOOP" => Ok(SmtpResponse::ok()),
            "QUIT" => Ok(SmtpResponse::quit()),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    /// Handle HELO and EHLO
    fn handle_greeting(
        &self,
        argument: &str,
        session: &mut SmtpSession,
        extended: bool,
    ) -> Result<SmtpResponse, SmtpError> {
        let Some(client_domain) = argument.split_whitespace().next() else {
            return Err(SmtpError::InvalidSyntax(
                "HELO requires domain argument".to_string(),
            ));
        };

        session.set_client_domain(client_domain.to_string())?;

        if extended {
            Ok(SmtpResponse::ehlo(self.hostname, client_domain))
        } else {
            Ok(SmtpResponse::helo(self.hostname, client_domain))
        }
    }

    /// Handle MAIL command
    fn handle_mail(
        &self,
        argument: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("MAIL") {
            return Err(SmtpError::InvalidState(
                "MAIL command requires HELO first".to_string(),
            ));
        }

        // An empty reverse-path (`<>`) is the null sender of bounces
        let addr = parse_path(argument, "FROM:")?;
        check_address_limits(&addr)?;

        self.handler
            .mail(&addr)
            .map_err(|e| SmtpError::Rejected(e.to_string()))?;
        session.set_sender(addr)?;

        Ok(SmtpResponse::ok())
    }

    /// Handle RCPT command
    fn handle_rcpt(
        &self,
        argument: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RCPT") {
            return Err(SmtpError::InvalidState(
                "RCPT command requires MAIL first".to_string(),
            ));
        }

        let addr = parse_path(argument, "TO:")?;
        if addr.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "recipient address cannot be empty".to_string(),
            ));
        }
        check_address_limits(&addr)?;

        self.handler
            .rcpt(&addr)
            .map_err(|e| SmtpError::Rejected(e.to_string()))?;
        session.add_recipient(addr)?;

        Ok(SmtpResponse::ok())
    }

    /// Handle DATA command
    fn handle_data(
        &self,
        argument: &str,
        session: &mut SmtpSession,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("DATA") {
            return Err(SmtpError::InvalidState(
                "DATA command requires RCPT first".to_string(),
            ));
        }

        if !argument.is_empty() {
            return Err(SmtpError::InvalidSyntax(
                "DATA command takes no arguments".to_string(),
            ));
        }

        session.start_data_mode()?;

        Ok(SmtpResponse::data_start())
    }

    /// Handle RSET command
    fn handle_rset(&self, session: &mut SmtpSession) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RSET") {
            return Err(SmtpError::InvalidState(
                "RSET command requires HELO first".to_string(),
            ));
        }

        session.reset();
        self.handler.reset();
        Ok(SmtpResponse::ok())
    }
}

/// Enforce the RFC 821 user and domain lengths. Anything else is accepted,
/// including local-only addresses such as `postmaster`.
fn check_address_limits(addr: &str) -> Result<(), SmtpError> {
    let (user_part, domain_part) = addr.rsplit_once('@').unwrap_or((addr, ""));

    if user_part.len() > SmtpLimits::USER_MAX_LENGTH {
        return Err(SmtpError::UserTooLong {
            max: SmtpLimits::USER_MAX_LENGTH,
        });
    }

    if domain_part.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
        return Err(SmtpError::DomainTooLong {
            max: SmtpLimits::DOMAIN_MAX_LENGTH,
        });
    }

    Ok(())
}

/// Extract the address from `FROM:<addr> [params]` / `TO:<addr> [params]`.
///
/// ESMTP parameters after the closing bracket are accepted and ignored.
/// The address may be empty.
fn parse_path(argument: &str, keyword: &str) -> Result<String, SmtpError> {
    let head = argument.get(..keyword.len()).unwrap_or_default();
    if !head.eq_ignore_ascii_case(keyword) {
        return Err(SmtpError::InvalidSyntax(format!(
            "expected '{keyword}<address>'"
        )));
    }

    let path = argument[keyword.len()..].trim_start();
    let Some(inner) = path.strip_prefix('<') else {
        return Err(SmtpError::InvalidSyntax(
            "address must be enclosed in angle brackets".to_string(),
        ));
    };
    let Some(end) = inner.find('>') else {
        return Err(SmtpError::InvalidSyntax(
            "address must be enclosed in angle brackets".to_string(),
        ));
    };

    let addr = &inner[..end];
    if addr.len() > SmtpLimits::PATH_MAX_LENGTH {
        return Err(SmtpError::PathTooLong {
            max: SmtpLimits::PATH_MAX_LENGTH,
        });
    }

    Ok(addr.to_string())
}

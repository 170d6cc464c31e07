//! SMTP server implementation

use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::handler::MailHandler;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{DataLine, SmtpSession};

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

/// SMTP server that hands every completed transaction to a [`MailHandler`]
#[derive(Debug)]
pub struct SmtpServer<H> {
    /// Server hostname, used in the greeting and HELO/EHLO replies
    hostname: String,
    handler: Arc<H>,
    /// How long a client may stay silent before it is disconnected
    idle_timeout: Duration,
}

/// RFC 5321 section 4.5.3.2 asks for at least five minutes per command.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

impl<H: MailHandler> SmtpServer<H> {
    /// Create a new SMTP server. Nothing is bound until [`start`](Self::start).
    pub fn new(hostname: &str, handler: H) -> Self {
        Self {
            hostname: hostname.to_owned(),
            handler: Arc::new(handler),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Bind to `addr` and serve connections (blocking)
    pub fn start(&self, addr: &str) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Serve connections from an existing listener (blocking).
    /// Each connection runs on its own thread.
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!(addr = %listener.local_addr()?, "SMTP server listening");

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let hostname = self.hostname.clone();
                    let handler = Arc::clone(&self.handler);
                    let idle_timeout = self.idle_timeout;
                    thread::spawn(move || {
                        let peer = stream.peer_addr().ok();
                        if let Err(e) = handle_client(stream, &hostname, &*handler, idle_timeout)
                        {
                            error!(?peer, error = %e, "Error handling client");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                }
            }
        }

        Ok(())
    }
}

/// Serve one client connection until QUIT or disconnect
fn handle_client<H: MailHandler>(
    mut stream: TcpStream,
    hostname: &str,
    handler: &H,
    idle_timeout: Duration,
) -> Result<(), SmtpError> {
    let peer = stream.peer_addr().ok();
    debug!(?peer, "Client connected");
    stream.set_read_timeout(Some(idle_timeout))?;

    if let Err(e) = handler.connect(peer) {
        let refusal = SmtpError::TransactionFailed(e.to_string());
        warn!(?peer, reason = %e, "Connection refused by handler");
        return send_response(&mut stream, &SmtpResponse::from(&refusal));
    }

    let result = serve_session(&mut stream, hostname, handler);
    handler.logout();
    debug!(?peer, "Client disconnected");
    result
}

fn serve_session<H: MailHandler>(
    stream: &mut TcpStream,
    hostname: &str,
    handler: &H,
) -> Result<(), SmtpError> {
    let command_handler = SmtpCommandHandler::new(hostname, handler);
    let mut session = SmtpSession::new();
    let mut reader = BufReader::new(stream.try_clone()?);

    send_response(stream, &SmtpResponse::greeting(hostname))?;

    // First error hit while receiving DATA; reported once the terminating
    // "." arrives so the rest of the payload is not read as commands.
    let mut data_error: Option<SmtpError> = None;
    let mut line_buffer = Vec::new();
    loop {
        let too_long = match read_line_bounded(&mut reader, &mut line_buffer) {
            Ok(LineRead::Closed) => break,
            Ok(LineRead::Complete) => false,
            Ok(LineRead::TooLong) => true,
            Err(e) if is_timeout(&e) => {
                debug!("Client idle for too long");
                let timeout = SmtpResponse::new("421", &format!("{hostname} Idle timeout"));
                // The client may be gone already
                let _ = send_response(stream, &timeout);
                break;
            }
            Err(e) => {
                warn!(error = %e, "Error reading from client");
                break;
            }
        };

        let line = strip_line_ending(&line_buffer);

        if session.in_data_mode {
            let outcome = match data_error {
                Some(_) if line == b"." => Ok(DataLine::End),
                Some(_) => Ok(DataLine::Continue),
                None if too_long => Err(SmtpError::LineTooLong {
                    max: SmtpLimits::TEXT_LINE_MAX_LENGTH,
                }),
                None => session.add_data_line(line),
            };

            match outcome {
                Ok(DataLine::Continue) => {}
                Ok(DataLine::End) => {
                    let response = match data_error.take() {
                        Some(e) => {
                            session.reset();
                            handler.reset();
                            SmtpResponse::from(&e)
                        }
                        None => deliver(&mut session, handler),
                    };
                    send_response(stream, &response)?;
                }
                Err(e) => data_error = Some(e),
            }
            continue;
        }

        if too_long {
            let error = SmtpError::LineTooLong {
                max: SmtpLimits::COMMAND_LINE_MAX_LENGTH,
            };
            send_response(stream, &SmtpResponse::from(&error))?;
            continue;
        }

        let command = String::from_utf8_lossy(line);
        let command = command.trim();
        if command.is_empty() {
            continue;
        }

        let response = match command_handler.process_command(command, &mut session) {
            Ok(response) => response,
            Err(e) => {
                debug!(command, error = %e, "Command failed");
                SmtpResponse::from(&e)
            }
        };
        send_response(stream, &response)?;
        if response.closes_connection() {
            break;
        }
    }

    Ok(())
}

/// Hand the finished transaction to the handler and build the final reply
fn deliver<H: MailHandler>(session: &mut SmtpSession, handler: &H) -> SmtpResponse {
    let response = match session.finish_data_collection() {
        Ok((envelope, data)) => match handler.data(&envelope, &mut data.as_slice()) {
            Ok(()) => {
                info!(
                    from = %envelope.from,
                    recipients = envelope.to.len(),
                    size = data.len(),
                    "Message accepted"
                );
                SmtpResponse::ok()
            }
            Err(e) => {
                warn!(from = %envelope.from, reason = %e, "Message rejected by handler");
                SmtpResponse::from(&SmtpError::TransactionFailed(e.to_string()))
            }
        },
        Err(e) => SmtpResponse::from(&e),
    };

    session.reset();
    handler.reset();
    response
}

enum LineRead {
    Complete,
    /// More than a text line's worth of bytes arrived without a line feed.
    /// The rest of the line has been discarded.
    TooLong,
    Closed,
}

/// Read one line into `buffer`, holding at most one text line in memory
fn read_line_bounded<R: BufRead>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<LineRead> {
    buffer.clear();

    let limit = SmtpLimits::TEXT_LINE_MAX_LENGTH as u64;
    let read = reader.by_ref().take(limit).read_until(b'\n', buffer)?;
    if read == 0 {
        return Ok(LineRead::Closed);
    }
    if buffer.ends_with(b"\n") || (read as u64) < limit {
        return Ok(LineRead::Complete);
    }

    discard_line(reader)?;
    buffer.clear();
    Ok(LineRead::TooLong)
}

/// Skip input up to and including the next line feed
fn discard_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&byte| byte == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let skipped = available.len();
                reader.consume(skipped);
            }
        }
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Send a response to the client
fn send_response(stream: &mut TcpStream, response: &SmtpResponse) -> Result<(), SmtpError> {
    let formatted = response.format();
    if response.multiline.is_none() && formatted.len() > SmtpLimits::REPLY_LINE_MAX_LENGTH {
        let truncated_response = SmtpResponse::new(&response.code, "Response too long (truncated)");
        stream.write_all(truncated_response.format().as_bytes())?;
    } else {
        stream.write_all(formatted.as_bytes())?;
    }
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::envelope::Envelope;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Forwards every delivered message to a channel; rejects payloads
    /// containing "REJECT".
    struct Recorder {
        tx: mpsc::Sender<(Envelope, Vec<u8>)>,
    }

    impl MailHandler for Recorder {
        type Error = String;

        fn data(&self, envelope: &Envelope, message: &mut dyn Read) -> Result<(), String> {
            let mut data = Vec::new();
            message.read_to_end(&mut data).map_err(|e| e.to_string())?;
            if String::from_utf8_lossy(&data).contains("REJECT") {
                return Err("content refused".to_string());
            }
            self.tx
                .send((envelope.clone(), data))
                .map_err(|e| e.to_string())
        }
    }

    fn start_test_server() -> (String, mpsc::Receiver<(Envelope, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel();
        let server = SmtpServer::new("test.local", Recorder { tx });

        thread::spawn(move || {
            if let Err(e) = server.start_with_listener(listener) {
                eprintln!("Error starting server: {e}");
            }
        });

        (addr, rx)
    }

    fn send_command(stream: &mut TcpStream, command: &str) -> Result<String, std::io::Error> {
        writeln!(stream, "{command}")?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response)?;
        Ok(response.trim().to_string())
    }

    fn connect(addr: &str) -> (TcpStream, BufReader<TcpStream>) {
        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        assert!(greeting.starts_with("220 test.local"));
        (stream, reader)
    }

    fn open_transaction(stream: &mut TcpStream) {
        assert!(send_command(stream, "HELO client.local").unwrap().starts_with("250"));
        assert!(send_command(stream, "MAIL FROM:<test@example.com>").unwrap().starts_with("250"));
        assert!(send_command(stream, "RCPT TO:<recipient@example.com>").unwrap().starts_with("250"));
        assert!(send_command(stream, "DATA").unwrap().starts_with("354"));
    }

    #[test]
    fn test_server_creation() {
        let (tx, _rx) = mpsc::channel();
        let server = SmtpServer::new("test.local", Recorder { tx });
        assert_eq!(server.hostname(), "test.local");
    }

    #[test]
    fn test_complete_smtp_session() {
        let (addr, rx) = start_test_server();
        let (mut stream, mut reader) = connect(&addr);
        open_transaction(&mut stream);

        write!(stream, "Subject: Test Email\r\n\r\n  indented\r\n..dotted\r\n.\r\n").unwrap();
        stream.flush().unwrap();

        let mut final_response = String::new();
        reader.read_line(&mut final_response).unwrap();
        assert!(final_response.starts_with("250"));

        let response = send_command(&mut stream, "QUIT").unwrap();
        assert!(response.starts_with("221"));

        let (envelope, data) = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(envelope.from, "test@example.com");
        assert_eq!(envelope.to, vec!["recipient@example.com"]);
        assert_eq!(envelope.client_domain.as_deref(), Some("client.local"));
        assert_eq!(data, b"Subject: Test Email\r\n\r\n  indented\r\n.dotted\r\n");
    }

    #[test]
    fn test_handler_rejection_answers_554() {
        let (addr, rx) = start_test_server();
        let (mut stream, mut reader) = connect(&addr);
        open_transaction(&mut stream);

        writeln!(stream, "Subject: REJECT me").unwrap();
        writeln!(stream, ".").unwrap();
        stream.flush().unwrap();

        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        assert_eq!(response.trim(), "554 Transaction failed: content refused");

        // The session is back to post-greeting state
        let response = send_command(&mut stream, "MAIL FROM:<again@example.com>").unwrap();
        assert!(response.starts_with("250"));

        send_command(&mut stream, "QUIT").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_oversized_data_line_reported_after_terminator() {
        let (addr, rx) = start_test_server();
        let (mut stream, mut reader) = connect(&addr);
        open_transaction(&mut stream);

        writeln!(stream, "{}", "a".repeat(SmtpLimits::TEXT_LINE_MAX_LENGTH + 10)).unwrap();
        writeln!(stream, "NOOP").unwrap();
        writeln!(stream, ".").unwrap();
        stream.flush().unwrap();

        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        assert!(response.starts_with("500"));

        let response = send_command(&mut stream, "NOOP").unwrap();
        assert!(response.starts_with("250"));

        send_command(&mut stream, "QUIT").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_read_line_bounded() {
        let limit = SmtpLimits::TEXT_LINE_MAX_LENGTH;
        let input = format!("HELO a\r\n{}\r\nNOOP\r\ntail", "x".repeat(limit * 3));
        let mut reader = BufReader::with_capacity(64, input.as_bytes());
        let mut buffer = Vec::new();

        assert!(matches!(
            read_line_bounded(&mut reader, &mut buffer).unwrap(),
            LineRead::Complete
        ));
        assert_eq!(buffer, b"HELO a\r\n");

        assert!(matches!(
            read_line_bounded(&mut reader, &mut buffer).unwrap(),
            LineRead::TooLong
        ));
        assert!(buffer.is_empty());

        // The rest of the oversized line was skipped
        assert!(matches!(
            read_line_bounded(&mut reader, &mut buffer).unwrap(),
            LineRead::Complete
        ));
        assert_eq!(buffer, b"NOOP\r\n");

        // Unterminated input at end of stream is still a line
        assert!(matches!(
            read_line_bounded(&mut reader, &mut buffer).unwrap(),
            LineRead::Complete
        ));
        assert_eq!(buffer, b"tail");

        assert!(matches!(
            read_line_bounded(&mut reader, &mut buffer).unwrap(),
            LineRead::Closed
        ));
    }

    #[test]
    fn test_read_line_bounded_accepts_longest_text_line() {
        let line = format!("{}\r\n", "x".repeat(SmtpLimits::TEXT_LINE_MAX_LENGTH - 2));
        let mut reader = BufReader::new(line.as_bytes());
        let mut buffer = Vec::new();

        assert!(matches!(
            read_line_bounded(&mut reader, &mut buffer).unwrap(),
            LineRead::Complete
        ));
        assert_eq!(buffer.len(), SmtpLimits::TEXT_LINE_MAX_LENGTH);
    }

    #[test]
    fn test_unterminated_command_flood_is_refused() {
        let (addr, _rx) = start_test_server();
        let (mut stream, mut reader) = connect(&addr);

        stream.write_all(&vec![b'a'; 64 * 1024]).unwrap();
        stream.write_all(b"\r\n").unwrap();
        stream.flush().unwrap();

        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        assert!(response.starts_with("500"), "got {response:?}");

        let response = send_command(&mut stream, "NOOP").unwrap();
        assert!(response.starts_with("250"));
        send_command(&mut stream, "QUIT").unwrap();
    }

    #[test]
    fn test_unterminated_data_flood_is_reported_after_terminator() {
        let (addr, rx) = start_test_server();
        let (mut stream, mut reader) = connect(&addr);
        open_transaction(&mut stream);

        stream.write_all(&vec![b'a'; 64 * 1024]).unwrap();
        stream.write_all(b"\r\n.\r\n").unwrap();
        stream.flush().unwrap();

        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        assert!(response.starts_with("500"), "got {response:?}");

        send_command(&mut stream, "QUIT").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_idle_client_is_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, _rx) = mpsc::channel();
        let server = SmtpServer::new("test.local", Recorder { tx })
            .with_idle_timeout(Duration::from_millis(100));
        thread::spawn(move || server.start_with_listener(listener));

        let (stream, mut reader) = connect(&addr);
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        assert!(response.starts_with("421"), "got {response:?}");

        // Then the server hangs up
        let mut rest = String::new();
        assert_eq!(reader.read_line(&mut rest).unwrap(), 0);
    }

    #[test]
    fn test_error_handling() {
        let (addr, _rx) = start_test_server();
        let (mut stream, _reader) = connect(&addr);

        let response = send_command(&mut stream, "INVALID").unwrap();
        assert!(response.starts_with("500"));

        let response = send_command(&mut stream, "MAIL FROM:<test@example.com>").unwrap();
        assert!(response.starts_with("503"));

        let response = send_command(&mut stream, "QUIT").unwrap();
        assert!(response.starts_with("221"));
    }

    #[test]
    fn test_multiple_recipients() {
        let (addr, rx) = start_test_server();
        let (mut stream, mut reader) = connect(&addr);

        send_command(&mut stream, "HELO client.local").unwrap();
        send_command(&mut stream, "MAIL FROM:<sender@example.com>").unwrap();
        send_command(&mut stream, "RCPT TO:<recipient1@example.com>").unwrap();
        send_command(&mut stream, "RCPT TO:<recipient2@example.com>").unwrap();
        send_command(&mut stream, "DATA").unwrap();

        writeln!(stream, "Subject: Multiple Recipients").unwrap();
        writeln!(stream).unwrap();
        writeln!(stream, "Test message for multiple recipients").unwrap();
        writeln!(stream, ".").unwrap();
        stream.flush().unwrap();

        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        assert!(response.starts_with("250"));

        send_command(&mut stream, "QUIT").unwrap();

        let (envelope, _) = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(
            envelope.to,
            vec!["recipient1@example.com", "recipient2@example.com"]
        );
    }
}

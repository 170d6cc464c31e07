//! Shared helpers for the integration tests: an in-memory service and a
//! line-oriented SMTP client

#![allow(dead_code)]

use mailbell::{Gateway, Service, ServiceError, SmtpServer};
use reqwest::StatusCode;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub type Outbox = Arc<Mutex<Vec<String>>>;

/// Records every text it is asked to send
pub struct RecordingService {
    name: &'static str,
    markdown: bool,
    fail: bool,
    outbox: Outbox,
}

impl RecordingService {
    pub fn html(name: &'static str) -> (Self, Outbox) {
        Self::build(name, false, false)
    }

    pub fn markdown(name: &'static str) -> (Self, Outbox) {
        Self::build(name, true, false)
    }

    /// Records the text, then answers 502
    pub fn failing(name: &'static str) -> (Self, Outbox) {
        Self::build(name, false, true)
    }

    fn build(name: &'static str, markdown: bool, fail: bool) -> (Self, Outbox) {
        let outbox = Outbox::default();
        let service = Self {
            name,
            markdown,
            fail,
            outbox: Arc::clone(&outbox),
        };
        (service, outbox)
    }
}

impl Service for RecordingService {
    fn name(&self) -> &str {
        self.name
    }

    fn wants_markdown(&self) -> bool {
        self.markdown
    }

    fn send(&self, text: &str) -> Result<(), ServiceError> {
        self.outbox.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(ServiceError::Rejected {
                status: StatusCode::BAD_GATEWAY,
                body: "upstream unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Serve a gateway over `services` on an ephemeral port; returns its address
pub fn start_gateway(services: Vec<Box<dyn Service>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = SmtpServer::new("test.local", Gateway::new(services));

    thread::spawn(move || {
        if let Err(e) = server.start_with_listener(listener) {
            eprintln!("Error starting server: {e}");
        }
    });

    addr
}

/// Gateway with a single HTML service; returns its address and outbox
pub fn start_recording_gateway() -> (String, Outbox) {
    let (service, outbox) = RecordingService::html("recorder");
    (start_gateway(vec![Box::new(service)]), outbox)
}

/// Wait until `outbox` holds `count` texts or a second has passed
pub fn wait_for(outbox: &Outbox, count: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(1);
    loop {
        let texts = outbox.lock().unwrap().clone();
        if texts.len() >= count || Instant::now() > deadline {
            return texts;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

pub struct SmtpClient {
    pub stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl SmtpClient {
    /// Connect and consume the greeting
    pub fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        let mut client = Self { stream, reader };

        let greeting = client.read_reply();
        assert!(greeting.starts_with("220"), "greeting was {greeting:?}");
        client
    }

    /// Send one command line and return the (last line of the) reply
    pub fn command(&mut self, line: &str) -> String {
        self.write_line(line);
        self.read_reply()
    }

    pub fn write_line(&mut self, line: &str) {
        write!(self.stream, "{line}\r\n").unwrap();
        self.stream.flush().unwrap();
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
        self.stream.flush().unwrap();
    }

    /// Read a single reply line, without its line ending
    pub fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap_or(0);
        line.trim_end().to_string()
    }

    /// Read one reply, skipping continuation lines of a multiline one.
    /// Returns an empty string if the server closed the connection.
    pub fn read_reply(&mut self) -> String {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).unwrap_or(0) == 0 {
                return String::new();
            }
            if line.as_bytes().get(3) != Some(&b'-') {
                return line.trim_end().to_string();
            }
        }
    }

    /// HELO, MAIL FROM and RCPT TO, each expected to succeed
    pub fn begin(&mut self, from: &str, to: &[&str]) {
        assert!(self.command("HELO client.local").starts_with("250"));
        assert!(self.command(&format!("MAIL FROM:<{from}>")).starts_with("250"));
        for rcpt in to {
            assert!(self.command(&format!("RCPT TO:<{rcpt}>")).starts_with("250"));
        }
    }

    /// DATA, the given lines and the terminating dot. Returns the final reply.
    pub fn data(&mut self, lines: &[&str]) -> String {
        let reply = self.command("DATA");
        assert!(reply.starts_with("354"), "DATA answered {reply:?}");
        for line in lines {
            self.write_line(line);
        }
        self.command(".")
    }
}

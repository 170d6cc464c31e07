//! One-request-per-connection HTTP server answering with canned statuses

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// A request as received by the stub
#[derive(Debug)]
pub(crate) struct Captured {
    pub path: String,
    pub body: serde_json::Value,
}

pub(crate) struct HttpStub {
    pub base_url: String,
    requests: mpsc::Receiver<Captured>,
}

impl HttpStub {
    /// Answer one request per entry of `statuses`, in order
    pub fn serve(statuses: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, requests) = mpsc::channel();

        thread::spawn(move || {
            for status in statuses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();

                let mut content_length = 0;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).unwrap();
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    let Some((name, value)) = header.split_once(':') else {
                        continue;
                    };
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }

                let mut body = vec![0; content_length];
                reader.read_exact(&mut body).unwrap();
                let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                tx.send(Captured { path, body }).unwrap();

                let reply = match status {
                    204 => "",
                    200..=299 => r#"{"ok":true}"#,
                    _ => r#"{"ok":false}"#,
                };
                let mut stream = stream;
                write!(
                    stream,
                    "HTTP/1.1 {status} Stub\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\
                     \r\n\
                     {reply}",
                    reply.len()
                )
                .unwrap();
                stream.flush().unwrap();
            }
        });

        Self { base_url, requests }
    }

    /// Next captured request, waiting up to five seconds
    pub fn next(&self) -> Captured {
        self.requests.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    /// Whether no further request arrived within a short grace period
    pub fn is_idle(&self) -> bool {
        self.requests.recv_timeout(Duration::from_millis(100)).is_err()
    }
}

//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::{BodyExt, Empty, Full};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use switchyard::{Error, Host, Telemetry};

/// Keeps every report so tests can assert on them.
#[derive(Default)]
pub struct RecordingTelemetry {
    messages: Mutex<Vec<String>>,
}

impl RecordingTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl Telemetry for RecordingTelemetry {
    fn capture_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_owned());
    }
}

/// A fully read response.
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.to_str().unwrap())
    }
}

pub fn request(method: &str, uri: &str) -> http::request::Builder {
    http::Request::builder().method(method).uri(uri)
}

/// Dispatches an empty-bodied request and collects the response.
pub async fn send(host: &Host, req: http::request::Builder) -> Result<Reply, Error> {
    let resp = host.dispatch(req.body(Empty::<Bytes>::new()).unwrap()).await?;
    Ok(collect(resp).await)
}

pub async fn send_body(host: &Host, req: http::request::Builder, body: &str) -> Result<Reply, Error> {
    let req = req.body(Full::new(Bytes::from(body.to_owned()))).unwrap();
    let resp = host.dispatch(req).await?;
    Ok(collect(resp).await)
}

pub async fn collect(resp: http::Response<switchyard::ResponseBody>) -> Reply {
    let (parts, body) = resp.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    Reply { status: parts.status, headers: parts.headers, body }
}

/// Starts a one-route HTTP backend on an ephemeral port.
///
/// A request whose `Authorization` header equals `token` gets `200` with
/// `body`; anything else gets `401`.
pub async fn start_auth_backend(token: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let authorized = head.lines().any(|line| {
                    line.split_once(':').is_some_and(|(name, value)| {
                        name.eq_ignore_ascii_case("authorization") && value.trim() == token
                    })
                });
                let (status, body) = if authorized { ("200 OK", body) } else { ("401 Unauthorized", "") };
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

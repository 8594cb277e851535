//! Loopback HTTP/1.1 responder for unit tests. One request per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const MAX_HEAD_BYTES: usize = 16 * 1024;

pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl Reply {
    pub fn html(body: impl Into<String>) -> Self {
        Self { status: 200, headers: vec![("Content-Type", "text/html".to_string())], body: body.into() }
    }

    pub fn not_found() -> Self {
        Self { status: 404, headers: Vec::new(), body: String::new() }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Serve `handler(method, path)` on an ephemeral port until the runtime shuts down.
pub async fn serve<F>(handler: F) -> SocketAddr
where
    F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let mut buf = vec![0u8; MAX_HEAD_BYTES];
                let mut read = 0;
                loop {
                    let n = stream.read(&mut buf[read..]).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    read += n;
                    if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                    if read == buf.len() {
                        return;
                    }
                }
                let reply = {
                    let head = String::from_utf8_lossy(&buf[..read]);
                    let mut request_line = head.split_whitespace();
                    let method = request_line.next().unwrap_or("GET");
                    let path = request_line.next().unwrap_or("/");
                    handler(method, path)
                };
                let mut out = format!(
                    "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    out.push_str(&format!("{}: {}\r\n", name, value));
                }
                out.push_str("\r\n");
                out.push_str(&reply.body);
                let _ = stream.write_all(out.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

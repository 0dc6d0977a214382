//! Connection Handler Module
//!
//! This module handles individual client connections to dotkv.
//! Each client gets its own handler task that runs in a loop,
//! reading requests and sending responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse HTTP request      │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute on a worker     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send response           │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │   [Loop back if keep-alive]  │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / Connection: close / error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. TCP is a stream
//! protocol, so a read may hold half a request or several pipelined ones.

use crate::commands::handler::error_response;
use crate::commands::ApiHandler;
use crate::protocol::parser::{MAX_BODY_SIZE, MAX_HEAD_SIZE};
use crate::protocol::types::{CONTINUE_RESPONSE, HEADER_END};
use crate::protocol::{HttpRequest, HttpResponse, ParseError, RequestParser};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, trace, warn};

/// Room for stray CRLFs ahead of a request line
const BUFFER_SLACK: usize = 1024;

/// Maximum size for the read buffer (one maximal request)
const MAX_BUFFER_SIZE: usize = MAX_HEAD_SIZE + HEADER_END.len() + MAX_BODY_SIZE + BUFFER_SLACK;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests answered
    pub requests_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The API handler (shares the store with every connection)
    api: ApiHandler,

    parser: RequestParser,

    /// Whether the pending request has already been sent `100 Continue`
    continue_sent: bool,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        api: ApiHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            api,
            parser: RequestParser::new(),
            continue_sent: false,
            stats,
        }
    }

    /// Serves requests until the client disconnects, asks to close, or an
    /// error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Connection closed"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let request = match self.try_parse_request() {
                Ok(Some(request)) => request,
                Ok(None) => {
                    self.send_continue_if_expected().await?;
                    self.read_more_data().await?;
                    continue;
                }
                Err(ConnectionError::ParseError(e)) => {
                    let response = error_response(e.status(), e.code());
                    // Best effort; the connection is dropped either way
                    let _ = self.send_response(&response, false).await;
                    return Err(ConnectionError::ParseError(e));
                }
                Err(e) => return Err(e),
            };

            let keep_alive = request.keep_alive();
            let response = self.dispatch(request).await;
            self.stats.request_processed();

            self.send_response(&response, keep_alive).await?;

            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Attempts to parse a request from the buffer.
    fn try_parse_request(&mut self) -> Result<Option<HttpRequest>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((request, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                self.continue_sent = false;
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                Ok(Some(request))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete request, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Runs the request on the blocking pool; Set and Delete write the
    /// snapshot synchronously.
    async fn dispatch(&self, request: HttpRequest) -> HttpResponse {
        let api = self.api.clone();
        let method = request.method.clone();
        let path = request.path.clone();

        let response = match tokio::task::spawn_blocking(move || api.execute(&request)).await {
            Ok(response) => response,
            Err(e) => {
                error!(client = %self.addr, error = %e, "Request worker failed");
                HttpResponse::empty(500)
            }
        };

        debug!(
            client = %self.addr,
            method = %method,
            path = %path,
            status = response.status,
            "Handled request"
        );
        response
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial request in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Tells a client waiting on `Expect: 100-continue` to send its body.
    async fn send_continue_if_expected(&mut self) -> Result<(), ConnectionError> {
        if self.continue_sent || !self.parser.expects_continue(&self.buffer) {
            return Ok(());
        }

        self.stream.write_all(CONTINUE_RESPONSE).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(CONTINUE_RESPONSE.len());
        self.continue_sent = true;
        trace!(client = %self.addr, "Sent 100 Continue");
        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(
        &mut self,
        response: &HttpResponse,
        keep_alive: bool,
    ) -> Result<(), ConnectionError> {
        let bytes = response.serialize(keep_alive);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed or unsupported HTTP request
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected between requests
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    api: ApiHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, api, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

/// Accepts connections forever, one task per client.
pub async fn serve(listener: TcpListener, api: ApiHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let api = api.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, api, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyValueStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn create_test_server() -> (SocketAddr, Arc<KeyValueStore>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(KeyValueStore::new());
        let stats = Arc::new(ConnectionStats::new());

        tokio::spawn(serve(
            listener,
            ApiHandler::new(Arc::clone(&store)),
            Arc::clone(&stats),
        ));

        (addr, store, stats)
    }

    /// Reads whole responses off a stream, keeping any pipelined remainder.
    struct TestClient {
        stream: TcpStream,
        buf: Vec<u8>,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                buf: Vec::new(),
            }
        }

        async fn send(&mut self, raw: &str) {
            self.stream.write_all(raw.as_bytes()).await.unwrap();
        }

        async fn response(&mut self) -> (u16, String, String) {
            loop {
                if let Some(pos) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&self.buf[..pos]).to_string();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("Content-Length: "))
                        .map(|v| v.parse::<usize>().unwrap())
                        .unwrap_or(0);
                    let end = pos + 4 + len;
                    if self.buf.len() >= end {
                        let status = head[9..12].parse().unwrap();
                        let body = String::from_utf8_lossy(&self.buf[pos + 4..end]).to_string();
                        self.buf.drain(..end);
                        return (status, head, body);
                    }
                }

                let mut chunk = [0u8; 1024];
                let n = self.stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before a full response");
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }
    }

    fn post(path: &str, body: &str) -> String {
        format!(
            "POST {} HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\n\r\n{}",
            path,
            body.len(),
            body
        )
    }

    fn get(target: &str) -> String {
        format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", target)
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, store, _) = create_test_server().await;
        let mut client = TestClient::connect(addr).await;

        client
            .send(&post("/set", r#"[{"key":"name","value":"Ariz","ttl":0}]"#))
            .await;
        let (status, head, body) = client.response().await;
        assert_eq!(status, 200);
        assert!(head.contains("Content-Type: application/json"));
        assert!(head.contains("Connection: keep-alive"));
        assert_eq!(body, r#"[{"key":"name","value":"Ariz","ttl":0}]"#);

        client.send(&get("/get?keys=name")).await;
        let (status, _, body) = client.response().await;
        assert_eq!(status, 200);
        assert_eq!(body, r#"[{"key":"name","value":"Ariz"}]"#);

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_pipelined_requests() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TestClient::connect(addr).await;

        let batch = [
            post("/set", r#"[{"key":"k1","value":"v1"}]"#),
            post("/set", r#"[{"key":"k2","value":"v2"}]"#),
            get("/get?keys=k1"),
            get("/get?keys=k2"),
        ]
        .concat();
        client.send(&batch).await;

        assert_eq!(client.response().await.0, 200);
        assert_eq!(client.response().await.0, 200);
        assert!(client.response().await.2.contains("v1"));
        assert!(client.response().await.2.contains("v2"));
    }

    #[tokio::test]
    async fn test_body_split_across_reads() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TestClient::connect(addr).await;

        let raw = post("/set", r#"[{"key":"slow","value":"drip"}]"#);
        let (first, second) = raw.split_at(raw.len() - 5);
        client.send(first).await;
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        client.send(second).await;

        assert_eq!(client.response().await.0, 200);
    }

    #[tokio::test]
    async fn test_connection_close() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TestClient::connect(addr).await;

        client
            .send("GET /metric?metric=Set HTTP/1.1\r\nConnection: close\r\n\r\n")
            .await;
        let (status, head, _) = client.response().await;
        assert_eq!(status, 404);
        assert!(head.contains("Connection: close"));

        let mut rest = Vec::new();
        let n = client.stream.read_to_end(&mut rest).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TestClient::connect(addr).await;

        client.send("NONSENSE\r\n\r\n").await;
        let (status, head, body) = client.response().await;
        assert_eq!(status, 400);
        assert!(head.contains("Connection: close"));
        assert_eq!(body, r#"{"error":"bad_request"}"#);
    }

    #[tokio::test]
    async fn test_expect_continue() {
        let (addr, store, _) = create_test_server().await;
        let mut client = TestClient::connect(addr).await;

        let body = r#"[{"key":"big","value":"payload"}]"#;
        client
            .send(&format!(
                "POST /set HTTP/1.1\r\nHost: test\r\nExpect: 100-continue\r\nContent-Length: {}\r\n\r\n",
                body.len()
            ))
            .await;

        let (status, _, interim) = client.response().await;
        assert_eq!(status, 100);
        assert!(interim.is_empty());

        client.send(body).await;
        assert_eq!(client.response().await.0, 200);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_largest_request_is_answered() {
        let (addr, _, _) = create_test_server().await;
        let client = TestClient::connect(addr).await;

        let mut head = format!(
            "POST /set HTTP/1.1\r\nContent-Length: {}\r\nX-Pad: ",
            MAX_BODY_SIZE
        );
        let pad = MAX_HEAD_SIZE - head.len();
        head.push_str(&"p".repeat(pad));
        head.push_str("\r\n\r\n");

        let mut raw = head.into_bytes();
        raw.resize(raw.len() + MAX_BODY_SIZE, b'x');

        let (mut reader, mut writer) = client.stream.into_split();
        let write = tokio::spawn(async move {
            writer.write_all(&raw).await.unwrap();
            writer
        });

        let mut response = Vec::new();
        let mut chunk = [0u8; 1024];
        while !response.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = reader.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed without a response");
            response.extend_from_slice(&chunk[..n]);
        }
        write.await.unwrap();

        // The body is not JSON, but the request itself fits
        assert!(response.starts_with(b"HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TestClient::connect(addr).await;

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.send(&get("/search?keyword=x")).await;
        let _ = client.response().await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.requests_processed.load(Ordering::Relaxed), 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}

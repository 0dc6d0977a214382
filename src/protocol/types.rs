//! HTTP/1.1 Message Types
//!
//! This module defines the request and response types exchanged with clients.
//! Only what the JSON API needs is modelled: a request line, headers, a
//! `Content-Length` body, and JSON responses.
//!
//! ## Wire Format
//!
//! ```text
//! POST /set HTTP/1.1\r\n
//! Host: localhost:4000\r\n
//! Content-Length: 42\r\n
//! \r\n
//! [{"key":"x","value":"hello","ttl":0}]
//! ```
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: application/json\r\n
//! Content-Length: 38\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! [{"key":"x","value":"hello","ttl":0}]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF line terminator
pub const CRLF: &[u8] = b"\r\n";

/// Marks the end of the request head
pub const HEADER_END: &[u8] = b"\r\n\r\n";

/// Interim response sent to clients that wait on `Expect: 100-continue`
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Content type of every API response body
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol version from the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

/// A fully received request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,

    /// Decoded path, without the query string
    pub path: String,

    /// Decoded query parameters in the order they appeared
    pub query: Vec<(String, String)>,

    pub version: Version,

    /// Header names as sent; look them up with [`HttpRequest::header`]
    pub headers: Vec<(String, String)>,

    pub body: Bytes,
}

impl HttpRequest {
    /// Returns the first header named `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first query parameter named `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value of a repeated query parameter.
    pub fn query_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the connection should stay open after the response.
    ///
    /// HTTP/1.1 defaults to keep-alive, HTTP/1.0 to close.
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match self.version {
            Version::Http11 => connection.as_deref() != Some("close"),
            Version::Http10 => connection.as_deref() == Some("keep-alive"),
        }
    }
}

/// A response ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string())],
            body: body.into(),
        }
    }

    /// Creates a response with no body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serializes the response, announcing whether the connection stays open.
    pub fn serialize(&self, keep_alive: bool) -> Bytes {
        let mut buf = BytesMut::with_capacity(128 + self.body.len());

        buf.put_slice(
            format!("HTTP/1.1 {} {}", self.status, reason_phrase(self.status)).as_bytes(),
        );
        buf.put_slice(CRLF);

        for (name, value) in &self.headers {
            buf.put_slice(format!("{}: {}", name, value).as_bytes());
            buf.put_slice(CRLF);
        }
        buf.put_slice(format!("Content-Length: {}", self.body.len()).as_bytes());
        buf.put_slice(CRLF);
        let connection: &[u8] = if keep_alive {
            b"Connection: keep-alive"
        } else {
            b"Connection: close"
        };
        buf.put_slice(connection);
        buf.put_slice(CRLF);
        buf.put_slice(CRLF);

        buf.put_slice(&self.body);
        buf.freeze()
    }
}

/// Standard reason phrase for the status codes the API produces.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(version: Version, headers: &[(&str, &str)]) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            path: "/get".to_string(),
            query: vec![
                ("keys".to_string(), "a".to_string()),
                ("other".to_string(), "1".to_string()),
                ("keys".to_string(), "b".to_string()),
            ],
            version,
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            body: Bytes::new(),
        }
    }

    #[test]
    fn test_query_lookup() {
        let req = request(Version::Http11, &[]);
        assert_eq!(req.query_param("keys"), Some("a"));
        assert_eq!(req.query_param("missing"), None);
        assert_eq!(req.query_values("keys").collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let req = request(Version::Http11, &[("Content-Length", "5")]);
        assert_eq!(req.header("content-length"), Some("5"));
        assert_eq!(req.header("CONTENT-LENGTH"), Some("5"));
        assert_eq!(req.header("host"), None);
    }

    #[test]
    fn test_keep_alive_defaults() {
        assert!(request(Version::Http11, &[]).keep_alive());
        assert!(!request(Version::Http11, &[("Connection", "Close")]).keep_alive());
        assert!(!request(Version::Http10, &[]).keep_alive());
        assert!(request(Version::Http10, &[("Connection", "keep-alive")]).keep_alive());
    }

    #[test]
    fn test_serialize_json_response() {
        let response = HttpResponse::json(200, r#"{"a":1}"#);
        assert_eq!(
            response.serialize(true),
            Bytes::from(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 7\r\nConnection: keep-alive\r\n\r\n{\"a\":1}"
            )
        );
    }

    #[test]
    fn test_serialize_empty_response() {
        let response = HttpResponse::empty(500).with_header("X-Test", "1");
        assert_eq!(
            response.serialize(false),
            Bytes::from(
                "HTTP/1.1 500 Internal Server Error\r\nX-Test: 1\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
        );
    }

    #[test]
    fn test_method_round_trip() {
        assert_eq!(Method::parse("POST"), Method::Post);
        assert_eq!(Method::parse("BREW"), Method::Other("BREW".to_string()));
        assert_eq!(Method::parse("BREW").to_string(), "BREW");
    }
}

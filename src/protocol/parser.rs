//! Incremental HTTP/1.1 Request Parser
//!
//! This module turns raw bytes from a socket into [`HttpRequest`]s.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((request, consumed)))` - A whole request was parsed, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the head or the body is incomplete
//! - `Err(ParseError)` - The bytes are not a request we can serve
//!
//! This lets the connection handler append socket reads to one buffer, parse
//! as many pipelined requests as are complete, and keep the remainder.
//!
//! Bodies are delimited by `Content-Length` only. A request without one has
//! an empty body; chunked transfer encoding is rejected.

use crate::protocol::types::{HttpRequest, Method, Version, CRLF, HEADER_END};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The request line is not `METHOD SP target SP version`
    #[error("invalid request line: {0}")]
    InvalidRequestLine(String),

    /// A header line has no colon or an empty name
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Only HTTP/1.0 and HTTP/1.1 are served
    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(String),

    /// `Content-Length` is not a non-negative integer, or is repeated with different values
    #[error("invalid content length: {0}")]
    InvalidContentLength(String),

    /// `Transfer-Encoding` other than identity
    #[error("unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),

    /// The head is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// The head grew past the limit without a blank line
    #[error("request head too large: {size} bytes (max: {max})")]
    HeadTooLarge { size: usize, max: usize },

    /// The announced body exceeds the limit
    #[error("request body too large: {size} bytes (max: {max})")]
    BodyTooLarge { size: usize, max: usize },
}

impl ParseError {
    /// Status code sent back before the connection is closed.
    pub fn status(&self) -> u16 {
        match self {
            ParseError::HeadTooLarge { .. } => 431,
            ParseError::BodyTooLarge { .. } => 413,
            ParseError::UnsupportedVersion(_) => 505,
            ParseError::UnsupportedTransferEncoding(_) => 501,
            _ => 400,
        }
    }

    /// Code placed in the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::HeadTooLarge { .. } => "headers_too_large",
            ParseError::BodyTooLarge { .. } => "payload_too_large",
            ParseError::UnsupportedVersion(_) => "http_version_not_supported",
            ParseError::UnsupportedTransferEncoding(_) => "not_implemented",
            _ => "bad_request",
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size of the request line plus headers (16 KB)
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Maximum size of a request body (4 MB)
pub const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

/// An incremental HTTP/1.1 request parser.
///
/// # Example
///
/// ```
/// use dotkv::protocol::RequestParser;
///
/// let mut parser = RequestParser::new();
/// let buf = b"GET /get?keys=name HTTP/1.1\r\nHost: localhost\r\n\r\n";
///
/// let (request, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(request.path, "/get");
/// assert_eq!(request.query_param("keys"), Some("name"));
/// assert_eq!(consumed, buf.len());
/// ```
#[derive(Debug, Clone)]
pub struct RequestParser {
    max_head_size: usize,
    max_body_size: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// Creates a parser with the default size limits.
    pub fn new() -> Self {
        Self::with_limits(MAX_HEAD_SIZE, MAX_BODY_SIZE)
    }

    pub fn with_limits(max_head_size: usize, max_body_size: usize) -> Self {
        Self {
            max_head_size,
            max_body_size,
        }
    }

    /// Attempts to parse one request from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(HttpRequest, usize)>> {
        // Stray CRLFs between pipelined requests are allowed before a request line
        let mut start = 0;
        while buf[start..].starts_with(CRLF) {
            start += CRLF.len();
        }
        let buf_rest = &buf[start..];

        let head_end = match find_subslice(buf_rest, HEADER_END) {
            Some(pos) => pos,
            // The blank line may still be arriving
            None if buf_rest.len() > self.max_head_size + HEADER_END.len() => {
                return Err(ParseError::HeadTooLarge {
                    size: buf_rest.len(),
                    max: self.max_head_size,
                })
            }
            None => return Ok(None),
        };
        if head_end > self.max_head_size {
            return Err(ParseError::HeadTooLarge {
                size: head_end,
                max: self.max_head_size,
            });
        }

        let head = std::str::from_utf8(&buf_rest[..head_end])
            .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
        let mut lines = head.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let (method, target, version) = parse_request_line(request_line)?;
        let headers = lines
            .map(parse_header)
            .collect::<ParseResult<Vec<(String, String)>>>()?;

        if let Some((_, encoding)) = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("transfer-encoding"))
        {
            if !encoding.eq_ignore_ascii_case("identity") {
                return Err(ParseError::UnsupportedTransferEncoding(encoding.clone()));
            }
        }

        let body_len = content_length(&headers)?;
        if body_len > self.max_body_size {
            return Err(ParseError::BodyTooLarge {
                size: body_len,
                max: self.max_body_size,
            });
        }

        let body_start = head_end + HEADER_END.len();
        let total = body_start + body_len;
        if buf_rest.len() < total {
            return Ok(None);
        }

        let (path, query) = split_target(target);
        let request = HttpRequest {
            method,
            path: percent_decode(path, false),
            query: parse_query(query),
            version,
            headers,
            body: Bytes::copy_from_slice(&buf_rest[body_start..total]),
        };

        Ok(Some((request, start + total)))
    }

    /// Whether the request at the front of `buf` has a complete head asking
    /// for `Expect: 100-continue`.
    ///
    /// Meant to be called after [`RequestParser::parse`] returned `Ok(None)`,
    /// in which case the body is what is still missing.
    pub fn expects_continue(&self, buf: &[u8]) -> bool {
        let mut start = 0;
        while buf[start..].starts_with(CRLF) {
            start += CRLF.len();
        }
        let buf_rest = &buf[start..];

        let Some(head_end) = find_subslice(buf_rest, HEADER_END) else {
            return false;
        };
        let Ok(head) = std::str::from_utf8(&buf_rest[..head_end]) else {
            return false;
        };

        let mut lines = head.split("\r\n");
        let http11 = lines
            .next()
            .is_some_and(|line| line.ends_with(" HTTP/1.1"));

        http11
            && lines.filter_map(|line| parse_header(line).ok()).any(|(name, value)| {
                name.eq_ignore_ascii_case("expect") && value.eq_ignore_ascii_case("100-continue")
            })
    }
}

/// Parses `METHOD SP target SP version`.
fn parse_request_line(line: &str) -> ParseResult<(Method, &str, Version)> {
    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequestLine(line.to_string()));
    };

    if method.is_empty() || !target.starts_with('/') {
        return Err(ParseError::InvalidRequestLine(line.to_string()));
    }

    let version = match version {
        "HTTP/1.1" => Version::Http11,
        "HTTP/1.0" => Version::Http10,
        other => return Err(ParseError::UnsupportedVersion(other.to_string())),
    };

    Ok((Method::parse(method), target, version))
}

/// Parses `Name: value`, trimming whitespace around the value.
fn parse_header(line: &str) -> ParseResult<(String, String)> {
    match line.split_once(':') {
        Some((name, value)) if !name.is_empty() && !name.ends_with(char::is_whitespace) => {
            Ok((name.to_string(), value.trim().to_string()))
        }
        _ => Err(ParseError::InvalidHeader(line.to_string())),
    }
}

/// Reads the body length; repeated headers must agree.
fn content_length(headers: &[(String, String)]) -> ParseResult<usize> {
    let mut length = None;
    for (_, value) in headers
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case("content-length"))
    {
        let parsed: usize = value
            .parse()
            .map_err(|_| ParseError::InvalidContentLength(value.clone()))?;
        match length {
            Some(previous) if previous != parsed => {
                return Err(ParseError::InvalidContentLength(value.clone()))
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length.unwrap_or(0))
}

/// Splits a request target into path and raw query string.
fn split_target(target: &str) -> (&str, &str) {
    let target = target.split_once('#').map_or(target, |(t, _)| t);
    target.split_once('?').unwrap_or((target, ""))
}

/// Decodes an `application/x-www-form-urlencoded` query string.
///
/// Pairs without `=` get an empty value; empty pairs are skipped.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(name, true), percent_decode(value, true))
        })
        .collect()
}

/// Decodes `%XX` escapes, and `+` as a space when `plus_as_space` is set.
///
/// Malformed escapes are kept literally; invalid UTF-8 is replaced.
pub fn percent_decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => match (hex_value(bytes.get(i + 1)), hex_value(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
                _ => out.push(b'%'),
            },
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[inline]
fn hex_value(byte: Option<&u8>) -> Option<u8> {
    match *byte? {
        b @ b'0'..=b'9' => Some(b - b'0'),
        b @ b'a'..=b'f' => Some(b - b'a' + 10),
        b @ b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Finds the first occurrence of `needle` in `haystack`.
#[inline]
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Helper function to parse a single request from bytes.
///
/// This is a convenience function for simple use cases.
pub fn parse_request(buf: &[u8]) -> ParseResult<Option<(HttpRequest, usize)>> {
    RequestParser::new().parse(buf)
}

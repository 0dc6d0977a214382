//! HTTP/1.1 Protocol Implementation
//!
//! This module provides the small slice of HTTP/1.1 the JSON API needs.
//!
//! ## Modules
//!
//! - `types`: `HttpRequest`, `HttpResponse` and response serialization
//! - `parser`: incremental request parser and query-string decoding
//!
//! ## Example
//!
//! ```
//! use dotkv::protocol::{parse_request, HttpResponse};
//!
//! // Parsing incoming data
//! let data = b"GET /metric?metric=Set HTTP/1.1\r\n\r\n";
//! let (request, consumed) = parse_request(data).unwrap().unwrap();
//! assert_eq!(request.query_param("metric"), Some("Set"));
//!
//! // Creating responses
//! let response = HttpResponse::json(200, r#"{"metric":"Set","count":1}"#);
//! let bytes = response.serialize(true);
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_request, ParseError, ParseResult, RequestParser};
pub use types::{HttpRequest, HttpResponse, Method, Version};

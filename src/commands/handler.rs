//! API Handler
//!
//! This module maps HTTP requests onto [`KeyValueStore`] operations and
//! turns their results into JSON responses.
//!
//! ## Routes
//!
//! - `POST /set` - body `[{"key": k, "value": v, "ttl": seconds}, ...]`
//! - `GET /get?keys=k1&keys=k2` - exact or dotted-path lookups
//! - `POST /delete` - body `{"key": k}`
//! - `GET /search?keyword=w` - first key containing `w`
//! - `GET /metric?metric=Set` - operation counter
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ApiHandler                            │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   route()   │───>│  decode()   │───>│  respond()  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                            │                                │
//! │                            ▼                                │
//! │                      KeyValueStore                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::error::StoreError;
use crate::protocol::{HttpRequest, HttpResponse, Method};
use crate::storage::{DeleteOutcome, KeyValueStore, SearchOutcome, SetEntry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

/// Body of a Delete request.
#[derive(Debug, Deserialize)]
struct DeleteRequest {
    #[serde(default)]
    key: String,
}

type Route = fn(&ApiHandler, &HttpRequest) -> HttpResponse;

/// Handles API requests against a shared store.
#[derive(Clone)]
pub struct ApiHandler {
    store: Arc<KeyValueStore>,
}

impl ApiHandler {
    /// Creates a new handler for the given store.
    pub fn new(store: Arc<KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    /// Executes a request and returns the response.
    pub fn execute(&self, request: &HttpRequest) -> HttpResponse {
        let (allowed, handler) = match request.path.as_str() {
            "/set" => (Method::Post, Self::handle_set as Route),
            "/get" => (Method::Get, Self::handle_get as Route),
            "/delete" => (Method::Post, Self::handle_delete as Route),
            "/search" => (Method::Get, Self::handle_search as Route),
            "/metric" => (Method::Get, Self::handle_metric as Route),
            _ => return error_response(404, "not_found"),
        };

        if request.method != allowed {
            return error_response(405, "method_not_allowed")
                .with_header("Allow", allowed.as_str());
        }

        handler(self, request)
    }

    /// POST /set
    fn handle_set(&self, request: &HttpRequest) -> HttpResponse {
        let entries: Vec<SetEntry> = match serde_json::from_slice(&request.body) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "Rejected set payload");
                return store_error(StoreError::InvalidPayload);
            }
        };

        match self.store.set(entries) {
            Ok(entries) => json_response(200, &entries),
            Err(e) => store_error(e),
        }
    }

    /// GET /get
    fn handle_get(&self, request: &HttpRequest) -> HttpResponse {
        let keys: Vec<String> = request.query_values("keys").map(str::to_string).collect();

        match self.store.get(&keys) {
            Ok(found) => json_response(200, &found),
            Err(e) => store_error(e),
        }
    }

    /// POST /delete
    fn handle_delete(&self, request: &HttpRequest) -> HttpResponse {
        let payload: DeleteRequest = match serde_json::from_slice(&request.body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "Rejected delete payload");
                return store_error(StoreError::InvalidPayload);
            }
        };

        match self.store.delete(&payload.key) {
            Ok(DeleteOutcome::Deleted(removed)) => json_response(200, &removed),
            Ok(DeleteOutcome::NotFound) => message_response(200, "key_not_found"),
            Err(e) => store_error(e),
        }
    }

    /// GET /search
    fn handle_search(&self, request: &HttpRequest) -> HttpResponse {
        let keyword = request.query_param("keyword").unwrap_or_default();

        match self.store.search(keyword) {
            SearchOutcome::Found(found) => json_response(200, &found),
            SearchOutcome::Expired(_) => error_response(404, "key_not_found"),
            SearchOutcome::NoMatch => message_response(404, "key_not_found"),
        }
    }

    /// GET /metric
    fn handle_metric(&self, request: &HttpRequest) -> HttpResponse {
        let name = request.query_param("metric").unwrap_or_default();

        match self.store.metric(name) {
            Ok(count) => json_response(200, &count),
            Err(e) => store_error(e),
        }
    }
}

/// Encodes `body` as JSON. An encoding failure becomes an empty 500.
fn json_response<T: Serialize + ?Sized>(status: u16, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => HttpResponse::json(status, bytes),
        Err(e) => {
            error!(error = %e, "Failed to encode response body");
            HttpResponse::empty(500)
        }
    }
}

/// `{"error": code}`
pub fn error_response(status: u16, code: &str) -> HttpResponse {
    json_response(status, &json!({ "error": code }))
}

/// `{"message": message}`
fn message_response(status: u16, message: &str) -> HttpResponse {
    json_response(status, &json!({ "message": message }))
}

fn store_error(e: StoreError) -> HttpResponse {
    error_response(e.status(), e.code())
}

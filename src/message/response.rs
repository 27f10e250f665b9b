//! Response descriptors handed back to callers and to the cache.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Status line and headers of a response, without its body.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseInit {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
}

impl ResponseInit {
    /// The state before any header block has been parsed.
    pub fn placeholder() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            status_text: "No response".to_string(),
            headers: HeaderMap::new(),
        }
    }
}

/// A complete response with a materialized body.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDescriptor {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseDescriptor {
    pub fn from_parts(init: ResponseInit, body: Bytes) -> Self {
        Self {
            status: init.status,
            status_text: init.status_text,
            headers: init.headers,
            body,
        }
    }

    /// Status line and headers, as handed to the cache.
    pub fn init(&self) -> ResponseInit {
        ResponseInit {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// First value of `name`, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

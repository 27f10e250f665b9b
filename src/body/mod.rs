//! Request bodies and their byte-length estimation.
//!
//! # Data Flow
//! ```text
//! Body (caller value)
//!     → estimator.rs (length + replayable stream + content type)
//!         Text / Bytes   → length known up front
//!         Multipart      → MultipartEncoder → Stream (recurse)
//!         Stream         → tee.rs → measure cursor (drained) + send cursor
//!     → Estimate handed to the wire codec
//! ```
//!
//! # Design Decisions
//! - HTTP/1.1 needs `Content-Length` before any body byte, so every body is
//!   measured before it is sent
//! - Body shape is a closed enum, one estimation rule per variant

pub mod estimator;
pub mod tee;

use std::fmt;
use std::io;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::FetchResult;

pub use estimator::{BodyEstimator, Estimate};
pub use tee::{tee, TeeCursor};

/// A live, lazily produced sequence of body chunks.
pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

/// The request body supplied by the caller.
#[derive(Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Text, sent as UTF-8.
    Text(String),
    /// A pre-materialized blob.
    Bytes(Bytes),
    /// A multipart form, encoded by the configured [`MultipartEncoder`].
    Multipart(MultipartForm),
    /// A live byte stream of unknown length.
    Stream(BodyStream),
    /// A query-string map. Not supported as a request body.
    Query(Vec<(String, String)>),
}

impl Body {
    /// Whether the body carries any payload at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Empty => "empty",
            Body::Text(_) => "text",
            Body::Bytes(_) => "bytes",
            Body::Multipart(_) => "multipart",
            Body::Stream(_) => "stream",
            Body::Query(_) => "query",
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Text(text) => write!(f, "Body::Text({} bytes)", text.len()),
            Body::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Body::Multipart(form) => write!(f, "Body::Multipart({} parts)", form.parts.len()),
            other => write!(f, "Body::{}", other.kind()),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

/// A multipart form value.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::Text(value.into()),
        });
        self
    }

    /// Append a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::File {
                filename: filename.into(),
                content_type: content_type.into(),
                data,
            },
        });
        self
    }
}

/// One named field of a [`MultipartForm`].
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

#[derive(Debug, Clone)]
pub enum PartValue {
    Text(String),
    File {
        filename: String,
        content_type: String,
        data: Bytes,
    },
}

/// Output of a [`MultipartEncoder`].
pub struct EncodedMultipart {
    /// Full content type including the boundary parameter.
    pub content_type: String,
    pub stream: BodyStream,
}

/// Encodes multipart forms into a byte stream. Implemented by the host.
pub trait MultipartEncoder: Send + Sync {
    fn encode(&self, form: MultipartForm) -> FetchResult<EncodedMultipart>;
}

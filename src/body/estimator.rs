//! Body length estimation.
//!
//! Every body kind is turned into an exact byte length plus a stream that
//! replays the same bytes for the real send.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::body::{tee, Body, BodyStream, MultipartEncoder};
use crate::error::{FetchError, FetchResult};

/// Content type attached to text bodies when the caller did not set one.
pub const TEXT_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Result of estimating a body.
pub struct Estimate {
    /// Exact number of bytes `stream` will yield.
    pub length: u64,
    /// Replayable body bytes.
    pub stream: BodyStream,
    /// Content type implied by the body kind, if any.
    pub content_type: Option<String>,
}

impl std::fmt::Debug for Estimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estimate")
            .field("length", &self.length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Sizes request bodies before they are sent.
#[derive(Clone, Default)]
pub struct BodyEstimator {
    multipart: Option<Arc<dyn MultipartEncoder>>,
}

impl BodyEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `encoder` for multipart form bodies.
    pub fn with_multipart_encoder(mut self, encoder: Arc<dyn MultipartEncoder>) -> Self {
        self.multipart = Some(encoder);
        self
    }

    /// Measure `body`, returning its length and a stream of the same bytes.
    pub async fn estimate(&self, body: Body) -> FetchResult<Estimate> {
        match body {
            Body::Empty => Ok(Estimate {
                length: 0,
                stream: stream::empty().boxed(),
                content_type: None,
            }),
            // Byte length, not character count: what goes on the wire is UTF-8.
            Body::Text(text) => {
                let bytes = Bytes::from(text);
                Ok(Estimate {
                    length: bytes.len() as u64,
                    stream: once(bytes),
                    content_type: Some(TEXT_CONTENT_TYPE.to_string()),
                })
            }
            Body::Bytes(bytes) => Ok(Estimate {
                length: bytes.len() as u64,
                stream: once(bytes),
                content_type: None,
            }),
            Body::Multipart(form) => {
                let encoder = self
                    .multipart
                    .as_ref()
                    .ok_or(FetchError::UnsupportedBodyType("multipart form without an encoder"))?;
                let encoded = encoder.encode(form)?;
                let mut estimate = measure_stream(encoded.stream).await?;
                estimate.content_type = Some(encoded.content_type);
                Ok(estimate)
            }
            Body::Stream(source) => measure_stream(source).await,
            Body::Query(_) => Err(FetchError::UnsupportedBodyType("query-string map")),
        }
    }
}

fn once(bytes: Bytes) -> BodyStream {
    stream::once(async move { Ok(bytes) }).boxed()
}

/// Tee the stream, drain one side to count bytes and return the other.
async fn measure_stream(source: BodyStream) -> FetchResult<Estimate> {
    let (mut measure, send) = tee(source);

    let mut length = 0u64;
    while let Some(chunk) = measure.next().await {
        let chunk = chunk.map_err(|e| FetchError::BodyRead(e.to_string()))?;
        length += chunk.len() as u64;
    }
    drop(measure);

    tracing::trace!(length, buffered_chunks = send.buffered_len(), "Measured streamed body");

    Ok(Estimate {
        length,
        stream: send.into_stream(),
        content_type: None,
    })
}

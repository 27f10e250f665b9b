//! Passthrough for URLs that are not appliance applications.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::StreamExt;

use crate::body::Body;
use crate::error::{FetchError, FetchResult};
use crate::message::{FetchRequest, ResponseDescriptor, ResponseInit};

/// The host's ordinary request mechanism.
#[async_trait]
pub trait NativeFetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> FetchResult<ResponseDescriptor>;
}

/// [`NativeFetch`] over a `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NativeFetch for ReqwestFetch {
    async fn fetch(&self, request: FetchRequest) -> FetchResult<ResponseDescriptor> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        builder = match request.body {
            Body::Empty => builder,
            Body::Text(text) => builder.body(text),
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| FetchError::BodyRead(e.to_string()))?;
                    buf.extend_from_slice(&chunk);
                }
                builder.body(buf.freeze())
            }
            Body::Multipart(_) => {
                return Err(FetchError::UnsupportedBodyType("multipart form on passthrough"));
            }
            Body::Query(_) => return Err(FetchError::UnsupportedBodyType("query-string map")),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let init = ResponseInit {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: response.headers().clone(),
        };
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        tracing::debug!(status = status.as_u16(), body_bytes = body.len(), "Passthrough complete");
        Ok(ResponseDescriptor::from_parts(init, body))
    }
}

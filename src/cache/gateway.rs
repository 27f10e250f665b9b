//! Per-connection response cache handles.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use url::Url;

use crate::error::FetchResult;
use crate::message::{RequestHead, ResponseDescriptor, ResponseInit};

/// Identity of one cache: the connection plus the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub flock: Url,
    pub appliance: String,
    pub persona: Option<String>,
    /// Canonical application id.
    pub app: String,
}

/// A response cache. Its policy is entirely its own.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// A stored response for `request`, if one matches.
    async fn match_request(
        &self,
        request: &RequestHead,
    ) -> FetchResult<Option<ResponseDescriptor>>;

    async fn cache_response(
        &self,
        request: &RequestHead,
        init: &ResponseInit,
        body: Bytes,
    ) -> FetchResult<()>;
}

/// Opens caches.
#[async_trait]
pub trait CacheFactory: Send + Sync {
    async fn open(&self, key: &CacheKey) -> FetchResult<Arc<dyn ResponseCache>>;
}

/// Lazily opens one cache per [`CacheKey`] and keeps it.
pub struct CacheGateway {
    factory: Arc<dyn CacheFactory>,
    handles: DashMap<CacheKey, Arc<dyn ResponseCache>>,
}

impl CacheGateway {
    pub fn new(factory: Arc<dyn CacheFactory>) -> Self {
        Self {
            factory,
            handles: DashMap::new(),
        }
    }

    /// The cache for `key`, if it has been opened already.
    pub fn existing(&self, key: &CacheKey) -> Option<Arc<dyn ResponseCache>> {
        self.handles.get(key).map(|handle| handle.clone())
    }

    /// The cache for `key`, opening it on first use.
    pub async fn open(&self, key: &CacheKey) -> FetchResult<Arc<dyn ResponseCache>> {
        if let Some(handle) = self.existing(key) {
            return Ok(handle);
        }
        let opened = self.factory.open(key).await?;
        tracing::debug!(app = %key.app, appliance = %key.appliance, "Response cache opened");

        // A concurrent opener may have won; keep the first handle.
        Ok(self
            .handles
            .entry(key.clone())
            .or_insert(opened)
            .clone())
    }

    pub async fn match_request(
        &self,
        key: &CacheKey,
        request: &RequestHead,
    ) -> FetchResult<Option<ResponseDescriptor>> {
        match self.existing(key) {
            Some(cache) => cache.match_request(request).await,
            None => Ok(None),
        }
    }

    pub async fn cache_response(
        &self,
        key: &CacheKey,
        request: &RequestHead,
        response: &ResponseDescriptor,
    ) -> FetchResult<()> {
        let cache = self.open(key).await?;
        cache
            .cache_response(request, &response.init(), response.body.clone())
            .await
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl std::fmt::Debug for CacheGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheGateway")
            .field("handles", &self.handles.len())
            .finish()
    }
}

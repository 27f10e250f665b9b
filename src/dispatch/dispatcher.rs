//! Top-level request lifecycle.
//!
//! # Responsibilities
//! - Route non-appliance URLs to the native passthrough
//! - Resolve an authenticated client through the session manager
//! - Decide between cache lookup and a fresh exchange
//! - Run the exchange on a new channel and store the result
//! - Account progress: connect is the first half, the exchange the second

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::body::BodyEstimator;
use crate::cache::{CacheGateway, CacheKey};
use crate::config::schema::{FetchConfig, TimeoutConfig};
use crate::error::{FetchError, FetchResult};
use crate::message::{AppUrl, FetchRequest, RequestDescriptor, RequestHead, ResponseDescriptor};
use crate::observability::metrics;
use crate::progress::{Progress, ProgressFn, ProgressTracker};
use crate::session::{ResolvedSession, SessionManager, SessionSelector};
use crate::wire::{Exchange, ExchangeObservers, ExchangeSettings};

use super::native::NativeFetch;

/// Issues requests against appliance-hosted applications.
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    cache: Option<Arc<CacheGateway>>,
    native: Option<Arc<dyn NativeFetch>>,
    estimator: BodyEstimator,
    settings: ExchangeSettings,
    connect_timeout: Option<Duration>,
    exchange_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            cache: None,
            native: None,
            estimator: BodyEstimator::new(),
            settings: ExchangeSettings::default(),
            connect_timeout: None,
            exchange_timeout: None,
        }
    }

    /// Header defaults and deadlines from `config`.
    pub fn from_config(sessions: Arc<SessionManager>, config: &FetchConfig) -> Self {
        Self::new(sessions)
            .with_settings(ExchangeSettings {
                user_agent: config.http.user_agent.clone(),
                accept_language: config.http.accept_language.clone(),
                partial_interval: config.http.partial_interval(),
            })
            .with_timeouts(&config.timeouts)
    }

    pub fn with_cache(mut self, cache: Arc<CacheGateway>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_native(mut self, native: Arc<dyn NativeFetch>) -> Self {
        self.native = Some(native);
        self
    }

    pub fn with_estimator(mut self, estimator: BodyEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_settings(mut self, settings: ExchangeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_timeouts(mut self, timeouts: &TimeoutConfig) -> Self {
        self.connect_timeout = timeouts.connect();
        self.exchange_timeout = timeouts.exchange();
        self
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Issue `request`.
    pub async fn fetch(&self, request: FetchRequest) -> FetchResult<ResponseDescriptor> {
        let sink: ProgressFn = Arc::new(|p: Progress| {
            tracing::trace!(loaded = p.loaded, total = p.total, "Dispatch progress");
        });
        self.fetch_with_tracker(request, ProgressTracker::root(Some(sink)))
            .await
    }

    /// Issue `request`, reporting overall progress into `tracker`.
    ///
    /// `tracker` is marked done when this returns, whatever the outcome.
    pub async fn fetch_with_tracker(
        &self,
        request: FetchRequest,
        tracker: ProgressTracker,
    ) -> FetchResult<ResponseDescriptor> {
        let _done = tracker.done_on_drop();

        let target = match AppUrl::parse(&request.url) {
            Ok(Some(target)) => target,
            Ok(None) => {
                let result = self.passthrough(request).await;
                metrics::record_request("passthrough", outcome(&result));
                return result;
            }
            Err(e) => {
                metrics::record_request("appliance", e.kind().as_str());
                return Err(e);
            }
        };

        let result = self.fetch_app(target, request, &tracker).await;
        metrics::record_request("appliance", outcome(&result));
        if let Err(e) = &result {
            tracing::debug!(error = %e, kind = e.kind().as_str(), "Request failed");
        }
        result
    }

    async fn passthrough(&self, request: FetchRequest) -> FetchResult<ResponseDescriptor> {
        match &self.native {
            Some(native) => {
                tracing::debug!(url = %request.url, "Passing request to native fetch");
                native.fetch(request).await
            }
            None => Err(FetchError::PassthroughUnavailable(request.url)),
        }
    }

    async fn fetch_app(
        &self,
        target: AppUrl,
        request: FetchRequest,
        tracker: &ProgressTracker,
    ) -> FetchResult<ResponseDescriptor> {
        let FetchRequest {
            method,
            headers,
            body,
            cache_mode,
            flock,
            appliance,
            persona,
            make_default,
            silent,
            on_progress,
            on_partial,
            ..
        } = request;

        let descriptor = RequestDescriptor {
            method,
            target,
            headers,
            body,
            cache_mode,
        };
        let selector = SessionSelector {
            flock,
            appliance,
            persona,
            make_default,
            silent,
        };

        let connect = tracker.child(0.0, 0.5);
        let session = with_deadline(
            "session resolution",
            self.connect_timeout,
            self.sessions.resolve_client(&selector),
        )
        .await?;
        connect.done();

        let key = CacheKey {
            flock: session.flock.clone(),
            appliance: session.appliance.clone(),
            persona: session.persona.clone(),
            app: descriptor.target.canonical_app(),
        };

        // Caches only ever see the head; the body stream is not `Sync`.
        let head = descriptor.head();
        if let Some(hit) = self.lookup(&key, &head).await {
            return Ok(hit);
        }

        let stored_request = match (&self.cache, head.cache_mode.stores()) {
            (Some(_), true) => Some(head),
            _ => None,
        };

        let exchange_tracker = tracker.child(0.5, 1.0);
        let progress: ProgressFn = {
            let exchange_tracker = exchange_tracker.clone();
            Arc::new(move |p: Progress| {
                exchange_tracker.update(p.loaded, p.total);
                if let Some(caller) = &on_progress {
                    caller(p);
                }
            })
        };
        let observers = ExchangeObservers {
            progress: Some(progress),
            partial: on_partial,
        };

        let response = with_deadline(
            "exchange",
            self.exchange_timeout,
            self.exchange(&session, descriptor, observers),
        )
        .await?;
        exchange_tracker.done();

        if let (Some(gateway), Some(stored_request)) = (&self.cache, stored_request) {
            if let Err(e) = gateway.cache_response(&key, &stored_request, &response).await {
                metrics::record_cache_store_failure();
                tracing::warn!(app = %key.app, error = %e, "Failed to cache response");
            }
        }

        Ok(response)
    }

    /// Consult the cache when the mode allows it and a handle already exists.
    async fn lookup(&self, key: &CacheKey, head: &RequestHead) -> Option<ResponseDescriptor> {
        let gateway = self.cache.as_ref()?;
        if !head.cache_mode.consults_cache() || gateway.existing(key).is_none() {
            return None;
        }

        match gateway.match_request(key, head).await {
            Ok(Some(hit)) => {
                metrics::record_cache_lookup("hit");
                tracing::debug!(app = %key.app, status = hit.status.as_u16(), "Served from cache");
                Some(hit)
            }
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                None
            }
            Err(e) => {
                metrics::record_cache_lookup("error");
                tracing::warn!(app = %key.app, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn exchange(
        &self,
        session: &ResolvedSession,
        descriptor: RequestDescriptor,
        observers: ExchangeObservers,
    ) -> FetchResult<ResponseDescriptor> {
        let app = descriptor.target.canonical_app();

        session
            .client
            .request_apps(std::slice::from_ref(&app))
            .await
            .map_err(|e| FetchError::Transport(format!("could not start '{app}': {e}")))?;

        let channel = session
            .client
            .open_channel(&app, descriptor.target.port)
            .await
            .map_err(|e| FetchError::Transport(format!("could not open channel to '{app}': {e}")))?;

        Exchange::new(self.settings.clone(), self.estimator.clone())
            .with_observers(observers)
            .run(channel, descriptor)
            .await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sessions", &self.sessions)
            .field("cache", &self.cache)
            .field("native", &self.native.is_some())
            .field("settings", &self.settings)
            .field("connect_timeout", &self.connect_timeout)
            .field("exchange_timeout", &self.exchange_timeout)
            .finish()
    }
}

async fn with_deadline<T>(
    operation: &'static str,
    limit: Option<Duration>,
    future: impl Future<Output = FetchResult<T>>,
) -> FetchResult<T> {
    match limit {
        None => future.await,
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| FetchError::Timeout {
                operation,
                secs: limit.as_secs(),
            })?,
    }
}

fn outcome(result: &FetchResult<ResponseDescriptor>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind().as_str(),
    }
}

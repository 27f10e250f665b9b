//! One request/response cycle on one channel.
//!
//! # Responsibilities
//! - Build the header block from defaults, caller headers and the body estimate
//! - Write the head, then stream the body with per-chunk progress
//! - Feed inbound bytes through the push parser until the message completes
//! - Emit throttled partial-load snapshots while the body arrives
//! - Close the channel on every exit path

use std::time::{Duration, Instant as StdInstant};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::header::{
    HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL,
    CONTENT_LENGTH, CONTENT_TYPE, HOST, PRAGMA, USER_AGENT,
};
use http::{HeaderMap, Method};
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::body::{Body, BodyEstimator, Estimate};
use crate::error::{FetchError, FetchResult};
use crate::message::{RequestDescriptor, ResponseDescriptor, ResponseInit};
use crate::observability::metrics;
use crate::progress::{
    PartialFn, PartialLoad, Progress, ProgressFn, Throttle, DEFAULT_PARTIAL_INTERVAL,
};
use crate::transport::Channel;
use crate::wire::parser::{ParseEvent, ResponseParser};
use crate::wire::request::encode_head;

/// Progress units reported for a request without a body.
const NO_BODY_UNITS: u64 = 50;

/// Header defaults shared by every exchange.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub user_agent: String,
    pub accept_language: String,
    pub partial_interval: Duration,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("flock-fetch/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9".to_string(),
            partial_interval: DEFAULT_PARTIAL_INTERVAL,
        }
    }
}

/// Optional observers of one exchange.
#[derive(Clone, Default)]
pub struct ExchangeObservers {
    /// Upload progress as `(bytes_sent, total)`.
    pub progress: Option<ProgressFn>,
    /// Snapshots of the response while its body arrives.
    pub partial: Option<PartialFn>,
}

/// Exchange lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Connecting,
    SendingHeaders,
    SendingBody,
    AwaitingHeaders,
    AwaitingBody,
    Complete,
    Failed,
}

/// Accumulated response while it is being received.
#[derive(Debug, Default)]
struct Inbound {
    init: Option<ResponseInit>,
    total: Option<u64>,
    received: u64,
    chunks: Vec<Bytes>,
}

impl Inbound {
    fn snapshot(&self) -> Option<PartialLoad> {
        let init = self.init.as_ref()?;
        Some(PartialLoad {
            status: init.status,
            status_text: init.status_text.clone(),
            headers: init.headers.clone(),
            received: self.received,
            total: self.total,
            chunks: self.chunks.clone(),
        })
    }

    fn into_response(self) -> FetchResult<ResponseDescriptor> {
        let mut init = self
            .init
            .ok_or_else(|| FetchError::Protocol("message completed without a header block".into()))?;
        init.headers
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

        let mut body = BytesMut::with_capacity(self.received as usize);
        for chunk in &self.chunks {
            body.extend_from_slice(chunk);
        }
        Ok(ResponseDescriptor::from_parts(init, body.freeze()))
    }
}

/// A single exchange. Consumed by [`Exchange::run`].
pub struct Exchange {
    id: Uuid,
    settings: ExchangeSettings,
    estimator: BodyEstimator,
    observers: ExchangeObservers,
    state: ExchangeState,
}

impl Exchange {
    pub fn new(settings: ExchangeSettings, estimator: BodyEstimator) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            estimator,
            observers: ExchangeObservers::default(),
            state: ExchangeState::Connecting,
        }
    }

    pub fn with_observers(mut self, observers: ExchangeObservers) -> Self {
        self.observers = observers;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Send `request` on `channel` and read back the response.
    ///
    /// The channel is closed before this returns, whatever the outcome.
    pub async fn run(
        mut self,
        mut channel: Box<dyn Channel>,
        request: RequestDescriptor,
    ) -> FetchResult<ResponseDescriptor> {
        let span = tracing::debug_span!(
            "exchange",
            exchange_id = %self.id,
            method = %request.method,
            target = %request.target,
        );

        async move {
            let started = StdInstant::now();
            let result = self.drive(channel.as_mut(), request).await;
            channel.close().await;

            match &result {
                Ok(response) => {
                    tracing::debug!(
                        status = response.status.as_u16(),
                        body_bytes = response.body.len(),
                        "Exchange complete"
                    );
                    metrics::record_exchange("success", started.elapsed());
                }
                Err(e) => {
                    self.transition(ExchangeState::Failed);
                    tracing::debug!(error = %e, "Exchange failed");
                    metrics::record_exchange(e.kind().as_str(), started.elapsed());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &mut self,
        channel: &mut dyn Channel,
        mut request: RequestDescriptor,
    ) -> FetchResult<ResponseDescriptor> {
        let body = request.take_body();
        let forced_type = matches!(body, Body::Multipart(_));
        let estimate = if body.is_empty() {
            None
        } else {
            Some(self.estimator.estimate(body).await?)
        };

        let headers = self.build_headers(&request, estimate.as_ref(), forced_type)?;
        let head = encode_head(&request.method, &request.target.path, &headers);

        self.transition(ExchangeState::SendingHeaders);
        if estimate.is_none() {
            self.report(0, NO_BODY_UNITS);
        }
        channel.send(head).await.map_err(send_failed)?;

        match estimate {
            Some(estimate) => {
                self.transition(ExchangeState::SendingBody);
                self.send_body(channel, estimate).await?;
            }
            None => self.report(NO_BODY_UNITS, NO_BODY_UNITS),
        }

        self.transition(ExchangeState::AwaitingHeaders);
        self.receive(channel, request.method != Method::HEAD).await
    }

    fn build_headers(
        &self,
        request: &RequestDescriptor,
        estimate: Option<&Estimate>,
        forced_type: bool,
    ) -> FetchResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, header_value(request.target.host())?);
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, header_value(&self.settings.accept_language)?);
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(USER_AGENT, header_value(&self.settings.user_agent)?);

        for name in request.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in request.headers.iter() {
            headers.append(name.clone(), value.clone());
        }

        if let Some(estimate) = estimate {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(estimate.length));
            if let Some(content_type) = &estimate.content_type {
                if forced_type || !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, header_value(content_type)?);
                }
            }
        }
        Ok(headers)
    }

    async fn send_body(&mut self, channel: &mut dyn Channel, estimate: Estimate) -> FetchResult<()> {
        let total = estimate.length;
        let mut stream = estimate.stream;
        let mut sent = 0u64;

        self.report(0, total);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::BodyRead(e.to_string()))?;
            if chunk.is_empty() {
                continue;
            }
            sent += chunk.len() as u64;
            channel.send(chunk).await.map_err(send_failed)?;
            self.report(sent, total);
        }

        if sent != total {
            return Err(FetchError::BodyRead(format!(
                "body produced {sent} bytes but {total} were announced"
            )));
        }
        tracing::trace!(bytes = sent, "Request body sent");
        Ok(())
    }

    async fn receive(
        &mut self,
        channel: &mut dyn Channel,
        expect_body: bool,
    ) -> FetchResult<ResponseDescriptor> {
        let mut parser = ResponseParser::new(expect_body);
        let mut throttle = Throttle::new(self.settings.partial_interval);
        let mut inbound = Inbound::default();

        loop {
            let deadline = throttle.deadline();
            tokio::select! {
                received = channel.recv() => {
                    let (events, closed) = match received {
                        Some(Ok(bytes)) => (parser.feed(&bytes)?, false),
                        Some(Err(e)) => {
                            return Err(FetchError::Transport(format!("channel read failed: {e}")));
                        }
                        None => (parser.finish()?, true),
                    };

                    if self.apply(events, &mut inbound, &mut throttle)? {
                        let response = inbound.into_response()?;
                        self.transition(ExchangeState::Complete);
                        return Ok(response);
                    }
                    if closed {
                        return Err(FetchError::Transport(
                            "channel closed before the response was complete".into(),
                        ));
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if throttle.fire(Instant::now()) {
                        self.emit_partial(&inbound);
                    }
                }
            }
        }
    }

    /// Fold parser events into `inbound`. Returns `true` once the message is complete.
    fn apply(
        &mut self,
        events: Vec<ParseEvent>,
        inbound: &mut Inbound,
        throttle: &mut Throttle,
    ) -> FetchResult<bool> {
        for event in events {
            match event {
                ParseEvent::HeadersComplete(head) => {
                    tracing::trace!(
                        status = head.status.as_u16(),
                        version = ?head.version,
                        "Response headers received"
                    );
                    inbound.total = head.content_length;
                    inbound.init = Some(ResponseInit {
                        status: head.status,
                        status_text: head.reason,
                        headers: head.headers,
                    });
                    self.transition(ExchangeState::AwaitingBody);
                }
                ParseEvent::HeaderFragment(trailers) => {
                    if let Some(init) = inbound.init.as_mut() {
                        for (name, value) in trailers.iter() {
                            init.headers.append(name.clone(), value.clone());
                        }
                    }
                }
                ParseEvent::BodyFragment(bytes) => {
                    inbound.received += bytes.len() as u64;
                    inbound.chunks.push(bytes);
                    if self.observers.partial.is_some() && throttle.offer(Instant::now()) {
                        self.emit_partial(inbound);
                    }
                }
                ParseEvent::MessageComplete => {
                    throttle.cancel();
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn emit_partial(&self, inbound: &Inbound) {
        if let Some(observer) = &self.observers.partial {
            if let Some(partial) = inbound.snapshot() {
                observer(&partial);
            }
        }
    }

    fn report(&self, loaded: u64, total: u64) {
        if let Some(observer) = &self.observers.progress {
            observer(Progress::new(loaded, total));
        }
    }

    fn transition(&mut self, next: ExchangeState) {
        tracing::trace!(from = ?self.state, to = ?next, "Exchange state");
        self.state = next;
    }
}

fn header_value(value: &str) -> FetchResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| FetchError::Protocol(format!("invalid header value '{value}': {e}")))
}

fn send_failed(err: std::io::Error) -> FetchError {
    FetchError::Transport(format!("channel write failed: {err}"))
}

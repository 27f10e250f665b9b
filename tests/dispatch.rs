//! Dispatcher behavior against scripted appliances.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::StatusCode;

use flock_fetch::body::Body;
use flock_fetch::cache::CacheGateway;
use flock_fetch::config::TimeoutConfig;
use flock_fetch::error::{ErrorKind, FetchError, FetchResult};
use flock_fetch::message::{ResponseDescriptor, ResponseInit};
use flock_fetch::progress::{Progress, ProgressTracker};
use flock_fetch::{CacheMode, Dispatcher, FetchRequest, NativeFetch};

mod common;

use common::{MemoryCacheFactory, MockClient, MockConnector, Reply};

const HELLO: &str = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";

fn dispatcher(client: Arc<MockClient>) -> Dispatcher {
    let connector = MockConnector::new().with_client("home", client);
    Dispatcher::new(Arc::new(common::manager(connector)))
}

fn cached_dispatcher(client: Arc<MockClient>) -> (Dispatcher, Arc<MemoryCacheFactory>) {
    let factory = Arc::new(MemoryCacheFactory::default());
    let dispatcher = dispatcher(client).with_cache(Arc::new(CacheGateway::new(factory.clone())));
    (dispatcher, factory)
}

#[tokio::test]
async fn test_get_widgets_returns_hello() {
    let client = MockClient::open(vec![Reply::ok(HELLO)]);
    let dispatcher = dispatcher(client.clone());

    let response = dispatcher
        .fetch(FetchRequest::get("stork+app://example.com/app/widgets"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "hello");

    let channel = client.channel(0);
    assert!(channel.written().starts_with("GET /widgets HTTP/1.1\r\nHost: example.com\r\n"));
    assert!(channel.is_closed());
    assert_eq!(
        *client.apps_requested.lock().unwrap(),
        vec!["stork+app:example.com/app".to_string()]
    );
    assert_eq!(*client.ports.lock().unwrap(), vec![80]);
}

#[tokio::test]
async fn test_port_comes_from_target() {
    let client = MockClient::open(vec![Reply::ok(HELLO)]);
    let dispatcher = dispatcher(client.clone());

    dispatcher
        .fetch(FetchRequest::get("stork+app://example.com:8080/app/"))
        .await
        .unwrap();

    assert_eq!(*client.ports.lock().unwrap(), vec![8080]);
}

#[tokio::test]
async fn test_post_sets_content_length() {
    let client = MockClient::open(vec![Reply::ok(
        "HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n",
    )]);
    let dispatcher = dispatcher(client.clone());

    let response = dispatcher
        .fetch(FetchRequest::post("stork+app://example.com/app/items").body("0123456789"))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::CREATED);
    let written = client.channel(0).written();
    assert!(written.starts_with("POST /items HTTP/1.1\r\n"));
    assert!(written.contains("Content-Length: 10\r\n"));
    assert!(written.ends_with("\r\n\r\n0123456789"));
}

#[tokio::test]
async fn test_progress_is_monotone_and_completes() {
    let client = MockClient::open(vec![Reply::Chunks(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhello",
        b"world",
    ])]);
    let dispatcher = dispatcher(client);

    let exchange_events = Arc::new(Mutex::new(Vec::<Progress>::new()));
    let sink = exchange_events.clone();
    let overall = Arc::new(Mutex::new(Vec::<Progress>::new()));
    let overall_sink = overall.clone();
    let tracker = ProgressTracker::root(Some(Arc::new(move |p: Progress| {
        overall_sink.lock().unwrap().push(p)
    })));

    let request = FetchRequest::get("stork+app://example.com/app/big")
        .on_progress(Arc::new(move |p: Progress| sink.lock().unwrap().push(p)));
    let response = dispatcher
        .fetch_with_tracker(request, tracker.clone())
        .await
        .unwrap();

    assert_eq!(response.text(), "helloworld");
    assert!(tracker.is_done());

    let events = exchange_events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.loaded, last.total);
    assert!(events.windows(2).all(|w| w[0].loaded <= w[1].loaded));

    let overall = overall.lock().unwrap();
    assert!(overall.windows(2).all(|w| w[0].loaded < w[1].loaded));
    assert_eq!(overall.last(), Some(&Progress::new(1000, 1000)));
}

#[tokio::test]
async fn test_tracker_done_after_failure() {
    let connector = MockConnector::new();
    let dispatcher = Dispatcher::new(Arc::new(common::manager(connector)));
    let tracker = ProgressTracker::root(None);

    let err = dispatcher
        .fetch_with_tracker(
            FetchRequest::get("stork+app://example.com/app/").appliance("ghost"),
            tracker.clone(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DiscoveryFailed);
    assert!(tracker.is_done());
}

#[tokio::test]
async fn test_http2_is_protocol_error_and_channel_closed() {
    let client = MockClient::open(vec![Reply::ok("HTTP/2.0 200 OK\r\n\r\n")]);
    let dispatcher = dispatcher(client.clone());

    let err = dispatcher
        .fetch(FetchRequest::get("stork+app://example.com/app/"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("Invalid HTTP version 2.0"));
    assert!(client.channel(0).is_closed());
}

#[tokio::test]
async fn test_malformed_target() {
    let dispatcher = dispatcher(MockClient::open(vec![]));

    let err = dispatcher
        .fetch(FetchRequest::get("stork+app://example.com"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MalformedTargetUrl);
}

#[tokio::test]
async fn test_no_store_never_touches_cache() {
    let client = MockClient::open(vec![Reply::ok(HELLO), Reply::ok(HELLO)]);
    let (dispatcher, factory) = cached_dispatcher(client.clone());

    for _ in 0..2 {
        dispatcher
            .fetch(
                FetchRequest::get("stork+app://example.com/app/widgets")
                    .cache_mode(CacheMode::NoStore),
            )
            .await
            .unwrap();
    }

    assert_eq!(factory.open_count(), 0);
    assert_eq!(factory.cache.lookup_count(), 0);
    assert_eq!(factory.cache.store_count(), 0);
    assert_eq!(client.channel_count(), 2);
}

#[tokio::test]
async fn test_second_request_served_from_cache() {
    let client = MockClient::open(vec![Reply::ok(HELLO)]);
    let (dispatcher, factory) = cached_dispatcher(client.clone());
    let url = "stork+app://example.com/app/widgets";

    let first = dispatcher.fetch(FetchRequest::get(url)).await.unwrap();
    assert_eq!(factory.open_count(), 1);
    assert_eq!(factory.cache.store_count(), 1);
    // First request had no handle to look in.
    assert_eq!(factory.cache.lookup_count(), 0);

    let second = dispatcher.fetch(FetchRequest::get(url)).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(factory.cache.lookup_count(), 1);
    assert_eq!(client.channel_count(), 1);
}

#[tokio::test]
async fn test_reload_skips_lookup_but_stores() {
    let client = MockClient::open(vec![Reply::ok(HELLO), Reply::ok(HELLO)]);
    let (dispatcher, factory) = cached_dispatcher(client.clone());
    let url = "stork+app://example.com/app/widgets";

    dispatcher.fetch(FetchRequest::get(url)).await.unwrap();
    dispatcher
        .fetch(FetchRequest::get(url).cache_mode(CacheMode::Reload))
        .await
        .unwrap();

    assert_eq!(factory.cache.lookup_count(), 0);
    assert_eq!(factory.cache.store_count(), 2);
    assert_eq!(client.channel_count(), 2);
}

#[tokio::test]
async fn test_cache_failures_are_swallowed() {
    let client = MockClient::open(vec![Reply::ok(HELLO), Reply::ok(HELLO)]);
    let (dispatcher, factory) = cached_dispatcher(client.clone());
    factory.cache.fail_store.store(true, Ordering::SeqCst);
    factory.cache.fail_lookup.store(true, Ordering::SeqCst);
    let url = "stork+app://example.com/app/widgets";

    let first = dispatcher.fetch(FetchRequest::get(url)).await.unwrap();
    let second = dispatcher.fetch(FetchRequest::get(url)).await.unwrap();

    assert_eq!(first.text(), "hello");
    assert_eq!(second.text(), "hello");
    assert_eq!(factory.cache.lookup_count(), 1);
    assert_eq!(factory.cache.store_count(), 2);
    assert_eq!(factory.cache.len(), 0);
    assert_eq!(client.channel_count(), 2);
}

#[tokio::test]
async fn test_cached_request_has_no_body() {
    let client = MockClient::open(vec![Reply::ok(HELLO)]);
    let (dispatcher, factory) = cached_dispatcher(client);

    dispatcher
        .fetch(FetchRequest::post("stork+app://example.com/app/form").body("a=1"))
        .await
        .unwrap();

    assert_eq!(factory.cache.store_count(), 1);
    assert_eq!(factory.cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exchange_deadline() {
    let client = MockClient::open(vec![Reply::Hang]);
    let dispatcher = dispatcher(client).with_timeouts(&TimeoutConfig {
        connect_secs: 0,
        exchange_secs: 1,
    });

    let err = dispatcher
        .fetch(FetchRequest::get("stork+app://example.com/app/"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::Timeout {
            operation: "exchange",
            secs: 1
        }
    );
}

#[tokio::test]
async fn test_passthrough_unavailable() {
    let dispatcher = dispatcher(MockClient::open(vec![]));

    let err = dispatcher
        .fetch(FetchRequest::get("https://example.com/"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::PassthroughUnavailable("https://example.com/".into())
    );
}

#[derive(Default)]
struct RecordingFetch {
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl NativeFetch for RecordingFetch {
    async fn fetch(&self, request: FetchRequest) -> FetchResult<ResponseDescriptor> {
        self.urls.lock().unwrap().push(request.url);
        Ok(ResponseDescriptor::from_parts(
            ResponseInit {
                status: StatusCode::OK,
                status_text: "OK".into(),
                headers: Default::default(),
            },
            Bytes::from_static(b"native"),
        ))
    }
}

#[tokio::test]
async fn test_passthrough_uses_native_fetch() {
    let client = MockClient::open(vec![]);
    let native = Arc::new(RecordingFetch::default());
    let dispatcher = dispatcher(client.clone()).with_native(native.clone());

    let response = dispatcher
        .fetch(FetchRequest::get("https://example.com/page"))
        .await
        .unwrap();

    assert_eq!(response.text(), "native");
    assert_eq!(*native.urls.lock().unwrap(), vec!["https://example.com/page"]);
    assert_eq!(client.channel_count(), 0);
}

fn assert_send<T: Send>(value: T) -> T {
    value
}

#[tokio::test]
async fn test_fetch_future_is_send() {
    let client = MockClient::open(vec![Reply::ok(HELLO), Reply::ok(HELLO)]);
    let (dispatcher, factory) = cached_dispatcher(client);
    let dispatcher = Arc::new(dispatcher);
    let url = "stork+app://example.com/app/widgets";

    dispatcher.fetch(FetchRequest::get(url)).await.unwrap();

    // A streamed body must not keep the future off a multi-threaded runtime.
    let chunks = vec![Ok::<_, std::io::Error>(Bytes::from_static(b"a=1"))];
    let body = Body::Stream(futures_util::stream::iter(chunks).boxed());
    let request = FetchRequest::post(url).body(body);
    let spawned = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(assert_send(async move { dispatcher.fetch(request).await }))
    };

    let response = spawned.await.unwrap().unwrap();
    assert_eq!(response.text(), "hello");
    assert_eq!(factory.cache.lookup_count(), 1);
}

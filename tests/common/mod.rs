//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use url::Url;

use flock_fetch::cache::{CacheFactory, CacheKey, ResponseCache};
use flock_fetch::error::{FetchError, FetchResult};
use flock_fetch::message::{RequestHead, ResponseDescriptor, ResponseInit};
use flock_fetch::session::{FixedApplianceChooser, SessionManager};
use flock_fetch::transport::{
    ApplianceClient, Channel, Credentials, DirectoryConnector, RemoteError,
};

pub const FLOCK: &str = "ws://flock.test:6853/";

pub fn flock() -> Url {
    Url::parse(FLOCK).unwrap()
}

/// A session manager over `connector` whose appliance chooser picks `home`.
pub fn manager(connector: Arc<MockConnector>) -> SessionManager {
    SessionManager::builder(connector)
        .appliance_chooser(Arc::new(FixedApplianceChooser::new(Some("home".into()))))
        .default_directories(vec![flock()])
        .build()
}

/// What one opened channel will answer.
#[derive(Clone)]
pub enum Reply {
    /// Deliver these chunks, then report the peer closed.
    Chunks(Vec<&'static [u8]>),
    /// Never answer.
    Hang,
}

impl Reply {
    pub fn ok(raw: &'static str) -> Self {
        Reply::Chunks(vec![raw.as_bytes()])
    }
}

/// Bytes written to a channel and whether it was closed.
#[derive(Default)]
pub struct ChannelLog {
    pub written: Mutex<Vec<u8>>,
    pub closed: AtomicBool,
}

impl ChannelLog {
    pub fn written(&self) -> String {
        String::from_utf8(self.written.lock().unwrap().clone()).unwrap()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockChannel {
    inbound: VecDeque<Bytes>,
    hang: bool,
    log: Arc<ChannelLog>,
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, data: Bytes) -> io::Result<()> {
        self.log.written.lock().unwrap().extend_from_slice(&data);
        Ok(())
    }

    async fn recv(&mut self) -> Option<io::Result<Bytes>> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.inbound.pop_front().map(Ok)
    }

    async fn close(&mut self) {
        self.log.closed.store(true, Ordering::SeqCst);
    }
}

/// An appliance client answering channels from a script.
pub struct MockClient {
    logged_in: AtomicBool,
    /// Password every persona must present; `None` accepts any.
    password: Option<String>,
    replies: Mutex<VecDeque<Reply>>,
    pub channels: Mutex<Vec<Arc<ChannelLog>>>,
    pub ports: Mutex<Vec<u16>>,
    pub apps_requested: Mutex<Vec<String>>,
    pub logins: Mutex<Vec<String>>,
    pub permission_requests: AtomicUsize,
    permissions_denied: AtomicBool,
    login_delay: Mutex<Duration>,
}

impl MockClient {
    /// A client that needs no login.
    pub fn open(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self::build(true, None, replies))
    }

    /// A client that requires a login with `password`.
    pub fn locked(password: &str, replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self::build(false, Some(password.to_string()), replies))
    }

    fn build(logged_in: bool, password: Option<String>, replies: Vec<Reply>) -> Self {
        Self {
            logged_in: AtomicBool::new(logged_in),
            password,
            replies: Mutex::new(replies.into()),
            channels: Mutex::new(Vec::new()),
            ports: Mutex::new(Vec::new()),
            apps_requested: Mutex::new(Vec::new()),
            logins: Mutex::new(Vec::new()),
            permission_requests: AtomicUsize::new(0),
            permissions_denied: AtomicBool::new(false),
            login_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn channel(&self, index: usize) -> Arc<ChannelLog> {
        self.channels.lock().unwrap()[index].clone()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn log_out(&self) {
        self.logged_in.store(false, Ordering::SeqCst);
    }

    /// Reject permission requests until set back to `false`.
    pub fn deny_permissions(&self, deny: bool) {
        self.permissions_denied.store(deny, Ordering::SeqCst);
    }

    /// Delay every login attempt, so concurrent callers overlap.
    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock().unwrap() = delay;
    }

    pub fn login_count(&self) -> usize {
        self.logins.lock().unwrap().len()
    }

    pub fn permission_count(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplianceClient for MockClient {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    async fn try_login(&self, persona: &str, credentials: &Credentials) -> Result<(), RemoteError> {
        self.logins.lock().unwrap().push(persona.to_string());
        let delay = *self.login_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(expected) = &self.password {
            if credentials.secret.as_deref() != Some(expected.as_str()) {
                return Err(RemoteError::Rejected("bad password".into()));
            }
        }
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn request_permissions(&self, _permissions: &[String]) -> Result<(), RemoteError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        if self.permissions_denied.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected("permissions denied".into()));
        }
        Ok(())
    }

    async fn request_apps(&self, apps: &[String]) -> Result<(), RemoteError> {
        self.apps_requested.lock().unwrap().extend(apps.iter().cloned());
        Ok(())
    }

    async fn open_channel(&self, _app: &str, port: u16) -> Result<Box<dyn Channel>, RemoteError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RemoteError::Rejected("no scripted reply left".into()))?;

        let log = Arc::new(ChannelLog::default());
        self.channels.lock().unwrap().push(log.clone());
        self.ports.lock().unwrap().push(port);

        let channel = match reply {
            Reply::Chunks(chunks) => MockChannel {
                inbound: chunks.into_iter().map(Bytes::from_static).collect(),
                hang: false,
                log,
            },
            Reply::Hang => MockChannel {
                inbound: VecDeque::new(),
                hang: true,
                log,
            },
        };
        Ok(Box::new(channel))
    }
}

/// A directory that knows a fixed set of clients.
#[derive(Default)]
pub struct MockConnector {
    clients: Mutex<HashMap<String, Arc<MockClient>>>,
    pub connects: AtomicUsize,
    failures: AtomicUsize,
    delay: Mutex<Duration>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_client(self: Arc<Self>, name: &str, client: Arc<MockClient>) -> Arc<Self> {
        self.clients.lock().unwrap().insert(name.to_string(), client);
        self
    }

    /// Fail the next `count` connects.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Delay every connect, so concurrent callers overlap.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryConnector for MockConnector {
    async fn connect(
        &self,
        _flock: &Url,
        appliance: &str,
    ) -> Result<Arc<dyn ApplianceClient>, RemoteError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RemoteError::Io("connection refused".into()));
        }

        let client = self
            .clients
            .lock()
            .unwrap()
            .get(appliance)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(appliance.to_string()))?;
        Ok(client)
    }
}

/// In-memory cache keyed by method and request target.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, ResponseDescriptor>>,
    pub lookups: AtomicUsize,
    pub stores: AtomicUsize,
    pub fail_lookup: AtomicBool,
    pub fail_store: AtomicBool,
}

impl MemoryCache {
    fn key(request: &RequestHead) -> String {
        format!("{} {}", request.method, request.target.path)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn match_request(
        &self,
        request: &RequestHead,
    ) -> FetchResult<Option<ResponseDescriptor>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(FetchError::Cache("lookup exploded".into()));
        }
        Ok(self.entries.lock().unwrap().get(&Self::key(request)).cloned())
    }

    async fn cache_response(
        &self,
        request: &RequestHead,
        init: &ResponseInit,
        body: Bytes,
    ) -> FetchResult<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(FetchError::Cache("disk full".into()));
        }
        self.entries.lock().unwrap().insert(
            Self::key(request),
            ResponseDescriptor::from_parts(init.clone(), body),
        );
        Ok(())
    }
}

/// Hands out one shared [`MemoryCache`] and counts how often it was opened.
#[derive(Default)]
pub struct MemoryCacheFactory {
    pub cache: Arc<MemoryCache>,
    pub opens: AtomicUsize,
}

impl MemoryCacheFactory {
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheFactory for MemoryCacheFactory {
    async fn open(&self, _key: &CacheKey) -> FetchResult<Arc<dyn ResponseCache>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.cache.clone())
    }
}

/// Start a mock backend on an ephemeral port that answers every connection
/// with `200 OK` and `body`. Each received request head and body is sent on
/// the returned receiver.
pub async fn start_mock_backend(body: &'static str) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        let _ = tx.send(request);

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

/// Start a mock backend that writes `raw` verbatim and closes.
pub async fn start_raw_backend(raw: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_request(&mut socket).await;
                let _ = socket.write_all(raw).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Read one request: the head, then `Content-Length` bytes of body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        if let Some(end) = find_head_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + length {
                break;
            }
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

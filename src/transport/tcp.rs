//! Static, config-driven directory whose channels are TCP connections.
//!
//! # Responsibilities
//! - Resolve appliance names from `[[appliances]]` config entries
//! - Check persona passwords at login
//! - Open one TCP connection per channel to `host:port`

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::config::schema::ApplianceConfig;
use crate::transport::{ApplianceClient, Channel, Credentials, DirectoryConnector, RemoteError};

const READ_CHUNK: usize = 8 * 1024;

/// Relaxed ordering is enough: ids only need to be unique.
static CHANNEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a channel, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn new() -> Self {
        Self(CHANNEL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// Directory backed by a fixed list of appliances.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    appliances: Arc<HashMap<String, ApplianceConfig>>,
}

impl StaticDirectory {
    pub fn new(appliances: impl IntoIterator<Item = ApplianceConfig>) -> Self {
        let appliances = appliances
            .into_iter()
            .map(|appliance| (appliance.name.clone(), appliance))
            .collect();
        Self {
            appliances: Arc::new(appliances),
        }
    }

    pub fn len(&self) -> usize {
        self.appliances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appliances.is_empty()
    }
}

#[async_trait]
impl DirectoryConnector for StaticDirectory {
    async fn connect(
        &self,
        flock: &Url,
        appliance: &str,
    ) -> Result<Arc<dyn ApplianceClient>, RemoteError> {
        let config = self
            .appliances
            .get(appliance)
            .ok_or_else(|| RemoteError::NotFound(appliance.to_string()))?;

        tracing::debug!(flock = %flock, appliance, host = %config.host, "Static appliance resolved");

        Ok(Arc::new(StaticClient::new(config.clone())))
    }
}

/// Client for one static appliance.
#[derive(Debug)]
pub struct StaticClient {
    config: ApplianceConfig,
    logged_in: AtomicBool,
}

impl StaticClient {
    pub fn new(config: ApplianceConfig) -> Self {
        let logged_in = AtomicBool::new(config.personas.is_empty());
        Self { config, logged_in }
    }

    fn ensure_logged_in(&self) -> Result<(), RemoteError> {
        if self.is_logged_in() {
            Ok(())
        } else {
            Err(RemoteError::Rejected(format!(
                "not logged in to appliance '{}'",
                self.config.name
            )))
        }
    }
}

#[async_trait]
impl ApplianceClient for StaticClient {
    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    async fn try_login(&self, persona: &str, credentials: &Credentials) -> Result<(), RemoteError> {
        let known = self
            .config
            .personas
            .iter()
            .find(|p| p.id == persona)
            .ok_or_else(|| RemoteError::Rejected(format!("unknown persona '{persona}'")))?;

        if let Some(expected) = &known.password {
            if credentials.secret.as_deref() != Some(expected.as_str()) {
                return Err(RemoteError::Rejected("invalid credentials".into()));
            }
        }

        self.logged_in.store(true, Ordering::Release);
        tracing::debug!(appliance = %self.config.name, persona, "Logged in");
        Ok(())
    }

    async fn request_permissions(&self, permissions: &[String]) -> Result<(), RemoteError> {
        self.ensure_logged_in()?;
        tracing::trace!(appliance = %self.config.name, ?permissions, "Permissions granted");
        Ok(())
    }

    async fn request_apps(&self, apps: &[String]) -> Result<(), RemoteError> {
        if self.config.apps.is_empty() {
            return Ok(());
        }
        match apps.iter().find(|app| !self.config.apps.contains(app)) {
            Some(missing) => Err(RemoteError::Rejected(format!(
                "application '{missing}' is not installed on '{}'",
                self.config.name
            ))),
            None => Ok(()),
        }
    }

    async fn open_channel(&self, app: &str, port: u16) -> Result<Box<dyn Channel>, RemoteError> {
        self.ensure_logged_in()?;
        let stream = TcpStream::connect((self.config.host.as_str(), port)).await?;
        let channel = TcpChannel::new(stream);
        tracing::debug!(
            channel_id = %channel.id(),
            appliance = %self.config.name,
            app,
            port,
            "Channel opened"
        );
        Ok(Box::new(channel))
    }
}

/// A channel over one TCP connection.
#[derive(Debug)]
pub struct TcpChannel {
    id: ChannelId,
    stream: Option<TcpStream>,
    buf: BytesMut,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            id: ChannelId::new(),
            stream: Some(stream),
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn send(&mut self, data: Bytes) -> io::Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.write_all(&data).await,
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "channel closed")),
        }
    }

    async fn recv(&mut self) -> Option<io::Result<Bytes>> {
        let stream = self.stream.as_mut()?;
        self.buf.reserve(READ_CHUNK);
        match stream.read_buf(&mut self.buf).await {
            Ok(0) => None,
            Ok(_) => Some(Ok(self.buf.split().freeze())),
            Err(e) => Some(Err(e)),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            tracing::trace!(channel_id = %self.id, "Channel closed");
        }
    }
}

//! Contracts with the directory service, appliances and their channels.
//!
//! # Data Flow
//! ```text
//! DirectoryConnector::connect(flock, appliance)
//!     → ApplianceClient (login state, permissions, app pre-warm)
//!         → open_channel(app, port)
//!             → Channel (duplex bytes: send / recv / close)
//! ```
//!
//! # Design Decisions
//! - The crate never implements the directory protocol or channel framing;
//!   it only sequences calls on these traits
//! - `tcp.rs` provides a static, config-driven implementation where each
//!   channel is a plain TCP connection

pub mod tcp;

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

pub use tcp::{StaticDirectory, TcpChannel};

/// Failure reported by a directory, appliance or channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("appliance '{0}' not found")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("I/O failure: {0}")]
    Io(String),
}

impl From<io::Error> for RemoteError {
    fn from(err: io::Error) -> Self {
        RemoteError::Io(err.to_string())
    }
}

/// Secret material handed to an appliance at login.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub secret: Option<String>,
}

impl Credentials {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn password(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.secret.is_some() { "<redacted>" } else { "<none>" };
        f.debug_struct("Credentials").field("secret", &secret).finish()
    }
}

/// Discovers appliances through a directory.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(
        &self,
        flock: &Url,
        appliance: &str,
    ) -> Result<Arc<dyn ApplianceClient>, RemoteError>;
}

/// A connection to one appliance, authenticated as at most one persona.
#[async_trait]
pub trait ApplianceClient: Send + Sync {
    fn is_logged_in(&self) -> bool;

    async fn try_login(&self, persona: &str, credentials: &Credentials) -> Result<(), RemoteError>;

    async fn request_permissions(&self, permissions: &[String]) -> Result<(), RemoteError>;

    /// Ask the appliance to have `apps` running before channels are opened.
    async fn request_apps(&self, apps: &[String]) -> Result<(), RemoteError>;

    async fn open_channel(&self, app: &str, port: u16) -> Result<Box<dyn Channel>, RemoteError>;
}

/// A duplex byte stream to one application.
#[async_trait]
pub trait Channel: Send {
    async fn send(&mut self, data: Bytes) -> io::Result<()>;

    /// Next inbound bytes; `None` once the peer has closed.
    async fn recv(&mut self) -> Option<io::Result<Bytes>>;

    async fn close(&mut self);
}

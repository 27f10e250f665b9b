//! HTTP fetch for applications hosted on appliances.
//!
//! Requests addressed to `stork+app://<domain>[:<port>]/<app>/<path>` are
//! tunneled as HTTP/1.1 over a channel opened on an appliance discovered
//! through a directory (flock). Any other URL is handed to a native fetch.

// Request path
pub mod dispatch;
pub mod message;
pub mod wire;

// Connection management
pub mod session;
pub mod transport;

// Supporting subsystems
pub mod body;
pub mod cache;
pub mod progress;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;

pub use config::FetchConfig;
pub use dispatch::{Dispatcher, NativeFetch, ReqwestFetch};
pub use error::{ErrorKind, FetchError, FetchResult};
pub use message::{AppUrl, CacheMode, FetchRequest, ResponseDescriptor};
pub use session::{SessionManager, SessionSelector};

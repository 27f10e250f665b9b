//! Error taxonomy shared by every subsystem.
//!
//! `FetchError` is `Clone` because a single pending discovery or login is
//! awaited by every concurrent caller, and each of them receives the settled
//! outcome.

use thiserror::Error;

/// Errors surfaced to callers of the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The logical address could not be parsed.
    #[error("Malformed target URL '{url}': {reason}")]
    MalformedTargetUrl { url: String, reason: String },

    /// The estimator cannot size this kind of body.
    #[error("Unsupported body type: {0}")]
    UnsupportedBodyType(&'static str),

    /// Reading a streamed request body failed.
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// The directory could not reach the named appliance.
    #[error("Discovery of appliance '{appliance}' on {flock} failed: {reason}")]
    DiscoveryFailed {
        flock: String,
        appliance: String,
        reason: String,
    },

    /// No default appliance is known and prompting was not allowed.
    #[error("No default appliance selected for {0}")]
    NoDefaultAppliance(String),

    /// Login or permission grant failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The user declined an interactive selection.
    #[error("The {0} selection was canceled")]
    ChooserCanceled(&'static str),

    /// The appliance answered with something that is not HTTP/1.x.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Channel-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Cache gateway failure. Never fails a request on its own.
    #[error("Cache error: {0}")]
    Cache(String),

    /// An opt-in deadline elapsed.
    #[error("{operation} timed out after {secs} seconds")]
    Timeout { operation: &'static str, secs: u64 },

    /// A non-appliance URL was given but no native fetch is configured.
    #[error("No native fetch available for '{0}'")]
    PassthroughUnavailable(String),
}

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedTargetUrl,
    UnsupportedBodyType,
    BodyRead,
    DiscoveryFailed,
    NoDefaultAppliance,
    AuthenticationFailed,
    ChooserCanceled,
    Protocol,
    Transport,
    Cache,
    Timeout,
    PassthroughUnavailable,
}

impl ErrorKind {
    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedTargetUrl => "malformed_target_url",
            ErrorKind::UnsupportedBodyType => "unsupported_body_type",
            ErrorKind::BodyRead => "body_read",
            ErrorKind::DiscoveryFailed => "discovery_failed",
            ErrorKind::NoDefaultAppliance => "no_default_appliance",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::ChooserCanceled => "chooser_canceled",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Transport => "transport",
            ErrorKind::Cache => "cache",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PassthroughUnavailable => "passthrough_unavailable",
        }
    }
}

impl FetchError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::MalformedTargetUrl { .. } => ErrorKind::MalformedTargetUrl,
            FetchError::UnsupportedBodyType(_) => ErrorKind::UnsupportedBodyType,
            FetchError::BodyRead(_) => ErrorKind::BodyRead,
            FetchError::DiscoveryFailed { .. } => ErrorKind::DiscoveryFailed,
            FetchError::NoDefaultAppliance(_) => ErrorKind::NoDefaultAppliance,
            FetchError::AuthenticationFailed(_) => ErrorKind::AuthenticationFailed,
            FetchError::ChooserCanceled(_) => ErrorKind::ChooserCanceled,
            FetchError::Protocol(_) => ErrorKind::Protocol,
            FetchError::Transport(_) => ErrorKind::Transport,
            FetchError::Cache(_) => ErrorKind::Cache,
            FetchError::Timeout { .. } => ErrorKind::Timeout,
            FetchError::PassthroughUnavailable(_) => ErrorKind::PassthroughUnavailable,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

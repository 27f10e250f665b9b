//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Directory used when neither the request nor the config names one.
pub const DEFAULT_DIRECTORY_URL: &str = "ws://localhost:6853/";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory (flock) endpoints.
    pub directories: DirectoryConfig,

    /// Request header defaults and partial-load pacing.
    pub http: HttpConfig,

    /// Appliance and persona selection.
    pub session: SessionConfig,

    /// Optional deadlines.
    pub timeouts: TimeoutConfig,

    /// Log level and format.
    pub logging: LoggingConfig,

    /// Statically known appliances, reached over TCP.
    pub appliances: Vec<ApplianceConfig>,
}

/// Directory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Default directory URLs, first one wins.
    pub default_urls: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            default_urls: vec![DEFAULT_DIRECTORY_URL.to_string()],
        }
    }
}

/// Header defaults for tunneled requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// `User-Agent` sent to applications.
    pub user_agent: String,

    /// `Accept-Language` sent to applications.
    pub accept_language: String,

    /// Minimum spacing of partial-load notifications in milliseconds.
    pub partial_throttle_ms: u64,
}

impl HttpConfig {
    pub fn partial_interval(&self) -> Duration {
        Duration::from_millis(self.partial_throttle_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("flock-fetch/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9".to_string(),
            partial_throttle_ms: 16,
        }
    }
}

/// Non-interactive selection of appliance and persona.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// Fail instead of prompting when no default appliance is known.
    pub silent: bool,

    /// Site permissions requested after every login.
    pub permissions: Vec<String>,

    /// Appliance picked when a default is needed.
    pub appliance: Option<String>,

    /// Persona logged in when a default is needed.
    pub persona: Option<String>,

    /// Password for `persona`.
    pub password: Option<String>,
}

/// Timeout configuration. Zero disables a deadline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Session resolution (discovery, choosers, login) in seconds.
    pub connect_secs: u64,

    /// One request/response exchange in seconds.
    pub exchange_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Option<Duration> {
        (self.connect_secs > 0).then(|| Duration::from_secs(self.connect_secs))
    }

    pub fn exchange(&self) -> Option<Duration> {
        (self.exchange_secs > 0).then(|| Duration::from_secs(self.exchange_secs))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// A statically configured appliance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApplianceConfig {
    /// Name the directory knows the appliance by.
    pub name: String,

    /// Host channels connect to; the port comes from the application URL.
    pub host: String,

    /// Personas accepted at login. Empty means no login is required.
    #[serde(default)]
    pub personas: Vec<PersonaConfig>,

    /// Canonical application ids served. Empty means any.
    #[serde(default)]
    pub apps: Vec<String>,
}

/// A persona of a static appliance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonaConfig {
    pub id: String,

    /// Required password, if any.
    #[serde(default)]
    pub password: Option<String>,
}

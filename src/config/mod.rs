//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → FetchConfig (validated, immutable)
//!     → SessionManagerBuilder::session_config / Dispatcher::from_config
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; a running client does not reload it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ApplianceConfig, DirectoryConfig, FetchConfig, HttpConfig, LogFormat, LoggingConfig,
    PersonaConfig, SessionConfig, TimeoutConfig, DEFAULT_DIRECTORY_URL,
};
pub use validation::{validate_config, ValidationError};

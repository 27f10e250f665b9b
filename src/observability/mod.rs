//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch / session / wire produce:
//!     → tracing events and spans (exchange_id, flock, appliance, persona)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stderr, pretty or JSON)
//!     → whatever metrics recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a global subscriber or recorder; binaries do
//! - Metric updates without a recorder are no-ops
//! - Secrets (passwords) never appear in fields

pub mod logging;
pub mod metrics;

pub use logging::init_logging;

//! External response cache gateway.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → CacheKey (flock, appliance, persona, app)
//!     → gateway.rs (existing handle? → match_request)
//!     → after a fresh exchange: open handle lazily → cache_response
//! ```
//!
//! # Design Decisions
//! - The cache implementation is external; only match/store is used
//! - A handle is opened the first time a response is stored, so the first
//!   request on a connection never waits for cache setup

pub mod gateway;

pub use gateway::{CacheFactory, CacheGateway, CacheKey, ResponseCache};

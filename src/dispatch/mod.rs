//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! FetchRequest
//!     → AppUrl::parse
//!         not stork+app → native.rs (reqwest passthrough)
//!     → SessionManager::resolve_client          [progress 0.0 .. 0.5]
//!     → CacheGateway::match_request (if allowed and a handle exists)
//!         hit → ResponseDescriptor
//!     → request_apps + open_channel + Exchange  [progress 0.5 .. 1.0]
//!     → CacheGateway::cache_response (failures logged, never fatal)
//!     → ResponseDescriptor
//! ```
//!
//! # Design Decisions
//! - The dispatcher owns no registries; it borrows a shared `SessionManager`
//! - Deadlines are opt-in; dropping the returned future cancels the request
//! - The progress tracker is marked done on every exit path

pub mod dispatcher;
pub mod native;

pub use dispatcher::Dispatcher;
pub use native::{NativeFetch, ReqwestFetch};

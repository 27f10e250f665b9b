//! Request and response value types.
//!
//! # Data Flow
//! ```text
//! FetchRequest (caller)
//!     → target.rs (stork+app URL → AppUrl, or passthrough)
//!     → request.rs (RequestDescriptor: method, target, headers, body, cache mode)
//!     → [wire exchange]
//!     → response.rs (ResponseDescriptor: status, headers, body bytes)
//! ```

pub mod request;
pub mod response;
pub mod target;

pub use request::{CacheMode, FetchRequest, RequestDescriptor, RequestHead};
pub use response::{ResponseDescriptor, ResponseInit};
pub use target::{AppUrl, APP_SCHEME};

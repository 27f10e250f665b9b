//! HTTP/1.1 tunneling over an abstract channel.
//!
//! # Data Flow
//! ```text
//! RequestDescriptor
//!     → body estimator (Content-Length before any body byte)
//!     → request.rs (request line + Title-Case header block)
//!     → Channel::send (head, then body chunks with progress)
//!
//! Channel::recv bytes
//!     → parser.rs (push parser: head, length / chunked / until-close body)
//!     → exchange.rs (ordered chunk buffer, throttled partial loads)
//!     → ResponseDescriptor
//! ```
//!
//! # Design Decisions
//! - One exchange per channel; the channel is closed on every exit
//! - Only HTTP/1.0 and HTTP/1.1 responses are accepted
//! - The parser is a plain state machine value, independent of I/O

pub mod exchange;
pub mod parser;
pub mod request;

pub use exchange::{Exchange, ExchangeObservers, ExchangeSettings, ExchangeState};
pub use parser::{ParseError, ParseEvent, ResponseHead, ResponseParser};
pub use request::{canonical_name, encode_head};

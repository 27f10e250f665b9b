//! Progress accounting.
//!
//! # Data Flow
//! ```text
//! Exchange (bytes sent / received)
//!     → caller ProgressFn (raw loaded/total)
//!     → tracker.rs (child range of the dispatch tracker)
//!     → root tracker (weighted, monotone, permille)
//!
//! Exchange (body fragments)
//!     → throttle.rs (at most one emission per interval)
//!     → caller PartialFn (PartialLoad snapshot)
//! ```
//!
//! # Design Decisions
//! - Trackers form a tree; a child reports into a fixed sub-range of its parent
//! - Reported progress never decreases
//! - `done` takes effect once, whatever path the dispatch exits by

pub mod throttle;
pub mod tracker;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};

pub use throttle::{Throttle, DEFAULT_PARTIAL_INTERVAL};
pub use tracker::{DoneGuard, ProgressTracker};

/// A single progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(loaded: u64, total: u64) -> Self {
        Self { loaded, total }
    }
}

/// Observer for byte-level progress.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Snapshot of a response that is still arriving.
#[derive(Debug, Clone)]
pub struct PartialLoad {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    /// Body bytes received so far.
    pub received: u64,
    /// Announced body length, when the response carries one.
    pub total: Option<u64>,
    /// Body fragments in receive order.
    pub chunks: Vec<Bytes>,
}

impl PartialLoad {
    /// Concatenation of the fragments received so far.
    pub fn body(&self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks[0].clone(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.received as usize);
                for chunk in &self.chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        }
    }
}

/// Observer for partial responses.
pub type PartialFn = Arc<dyn Fn(&PartialLoad) + Send + Sync>;

//! Hierarchical progress tracker.
//!
//! A root tracker reports to an optional sink in permille (`total == 1000`).
//! Children cover a `[start, end]` slice of their parent's range, so nested
//! phases (connect, exchange, upload) combine into one monotone figure.

use std::sync::{Arc, Mutex, PoisonError};

use crate::progress::{Progress, ProgressFn};

const ROOT_SCALE: u64 = 1000;

struct Node {
    state: Mutex<NodeState>,
    parent: Option<(ProgressTracker, f64, f64)>,
    sink: Option<ProgressFn>,
}

#[derive(Default)]
struct NodeState {
    fraction: f64,
    reported: u64,
    done: bool,
}

/// Cheaply cloneable handle to one node of the progress tree.
#[derive(Clone)]
pub struct ProgressTracker {
    node: Arc<Node>,
}

impl ProgressTracker {
    /// A root tracker reporting to `sink`.
    pub fn root(sink: Option<ProgressFn>) -> Self {
        Self {
            node: Arc::new(Node {
                state: Mutex::new(NodeState::default()),
                parent: None,
                sink,
            }),
        }
    }

    /// A child covering `[start, end]` (fractions of this tracker's range).
    pub fn child(&self, start: f64, end: f64) -> Self {
        let start = start.clamp(0.0, 1.0);
        let end = end.clamp(start, 1.0);
        Self {
            node: Arc::new(Node {
                state: Mutex::new(NodeState::default()),
                parent: Some((self.clone(), start, end)),
                sink: None,
            }),
        }
    }

    /// Report `loaded` of `total` units. A zero total counts as no progress.
    pub fn update(&self, loaded: u64, total: u64) {
        let fraction = if total == 0 {
            0.0
        } else {
            (loaded as f64 / total as f64).min(1.0)
        };
        self.advance(fraction);
    }

    /// Mark this range complete. Returns `true` only for the call that did it.
    pub fn done(&self) -> bool {
        {
            let mut state = self.lock();
            if state.done {
                return false;
            }
            state.done = true;
        }
        self.advance(1.0);
        true
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Current fraction of this tracker's own range.
    pub fn fraction(&self) -> f64 {
        self.lock().fraction
    }

    /// Guard that marks the tracker done when dropped.
    pub fn done_on_drop(&self) -> DoneGuard {
        DoneGuard {
            tracker: self.clone(),
        }
    }

    fn advance(&self, fraction: f64) {
        let fraction = {
            let mut state = self.lock();
            if fraction <= state.fraction {
                return;
            }
            state.fraction = fraction;

            if let Some(sink) = &self.node.sink {
                let loaded = (fraction * ROOT_SCALE as f64).round() as u64;
                if loaded > state.reported || (fraction >= 1.0 && state.reported < ROOT_SCALE) {
                    state.reported = loaded;
                    // Emitted under the lock so concurrent updates stay ordered.
                    sink(Progress::new(loaded, ROOT_SCALE));
                }
            }
            fraction
        };

        if let Some((parent, start, end)) = &self.node.parent {
            parent.advance(start + (end - start) * fraction);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NodeState> {
        self.node.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ProgressTracker")
            .field("fraction", &state.fraction)
            .field("done", &state.done)
            .finish()
    }
}

/// Marks its tracker done on drop.
#[must_use = "the tracker is marked done when the guard is dropped"]
pub struct DoneGuard {
    tracker: ProgressTracker,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.tracker.done();
    }
}

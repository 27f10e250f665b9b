//! Fan-out of one body stream into two independent cursors.
//!
//! # Responsibilities
//! - Pull each chunk from the source exactly once
//! - Hand every chunk to both cursors, in source order
//! - Retain only chunks the lagging cursor has not yet seen
//!
//! # Design Decisions
//! - Whichever cursor is at the frontier pulls from the source; the other reads
//!   from the buffer, so draining one cursor never starves the other
//! - Dropping a cursor detaches it and releases what only it still needed

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};

use crate::body::BodyStream;

/// Buffered copy of a source item. `io::Error` is not `Clone`, so errors are
/// kept as kind + message and rebuilt for each cursor.
type Item = Result<Bytes, (io::ErrorKind, String)>;

struct TeeState {
    source: BodyStream,
    exhausted: bool,
    buffer: VecDeque<Item>,
    /// Absolute index of `buffer[0]`.
    base: usize,
    positions: [usize; 2],
    attached: [bool; 2],
    wakers: [Option<Waker>; 2],
}

impl TeeState {
    fn frontier(&self) -> usize {
        self.base + self.buffer.len()
    }

    /// Drop chunks every attached cursor has already consumed.
    fn release(&mut self) {
        let floor = (0..2)
            .filter(|&side| self.attached[side])
            .map(|side| self.positions[side])
            .min()
            .unwrap_or_else(|| self.frontier());

        while self.base < floor && self.buffer.pop_front().is_some() {
            self.base += 1;
        }
    }

    fn wake_other(&mut self, side: usize) {
        if let Some(waker) = self.wakers[1 - side].take() {
            waker.wake();
        }
    }
}

/// One of the two cursors produced by [`tee`].
pub struct TeeCursor {
    state: Arc<Mutex<TeeState>>,
    side: usize,
}

/// Split `source` into two cursors that each observe the full sequence.
pub fn tee(source: BodyStream) -> (TeeCursor, TeeCursor) {
    let state = Arc::new(Mutex::new(TeeState {
        source,
        exhausted: false,
        buffer: VecDeque::new(),
        base: 0,
        positions: [0, 0],
        attached: [true, true],
        wakers: [None, None],
    }));

    (
        TeeCursor {
            state: Arc::clone(&state),
            side: 0,
        },
        TeeCursor { state, side: 1 },
    )
}

impl TeeCursor {
    /// Number of chunks currently retained for the lagging cursor.
    pub fn buffered_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .buffer
            .len()
    }

    pub fn into_stream(self) -> BodyStream {
        self.boxed()
    }
}

fn to_io(item: Item) -> io::Result<Bytes> {
    item.map_err(|(kind, message)| io::Error::new(kind, message))
}

impl Stream for TeeCursor {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let side = self.side;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let position = state.positions[side];
        if position < state.frontier() {
            let item = state.buffer[position - state.base].clone();
            state.positions[side] += 1;
            state.release();
            return Poll::Ready(Some(to_io(item)));
        }

        if state.exhausted {
            return Poll::Ready(None);
        }

        match state.source.poll_next_unpin(cx) {
            Poll::Ready(Some(result)) => {
                let item: Item = result.map_err(|e| (e.kind(), e.to_string()));
                if state.attached[1 - side] {
                    state.buffer.push_back(item.clone());
                } else {
                    // Nobody else needs it, just advance the absolute index.
                    state.base += 1;
                }
                state.positions[side] += 1;
                state.release();
                state.wake_other(side);
                Poll::Ready(Some(to_io(item)))
            }
            Poll::Ready(None) => {
                state.exhausted = true;
                state.wake_other(side);
                Poll::Ready(None)
            }
            Poll::Pending => {
                state.wakers[side] = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Drop for TeeCursor {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.attached[self.side] = false;
        state.wakers[self.side] = None;
        state.release();
        state.wake_other(self.side);
    }
}

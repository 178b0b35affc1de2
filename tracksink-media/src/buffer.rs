//! Bounded playback buffer bridging the async and real-time domains
//!
//! The producer side is async: [`PlaybackBuffer::push`] waits for space on a
//! tokio [`Notify`] and gives up after a timeout, dropping the incoming item.
//! The consumer side is a blocking OS thread: [`PlaybackBuffer::pop_timeout`]
//! parks on a condition variable. Survivors keep FIFO order.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;

/// Result of a producer push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The item was queued
    Queued,
    /// The buffer stayed full for the whole timeout; the item was dropped
    Dropped,
    /// The buffer was closed
    Closed,
}

/// Result of a consumer pop
#[derive(Debug, PartialEq, Eq)]
pub enum PopOutcome<T> {
    /// Next item in FIFO order
    Item(T),
    /// Nothing arrived within the timeout
    Timeout,
    /// The buffer is closed and empty
    Closed,
}

/// Counters exposed by a [`PlaybackBuffer`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Items accepted
    pub queued: u64,
    /// Items dropped on push timeout
    pub dropped: u64,
    /// Largest observed queue length
    pub high_water_mark: usize,
}

#[derive(Debug)]
struct BufferState<T> {
    queue: VecDeque<T>,
    closed: bool,
    stats: BufferStats,
}

/// Bounded FIFO with an async producer and a blocking consumer
#[derive(Debug)]
pub struct PlaybackBuffer<T> {
    state: Mutex<BufferState<T>>,
    not_empty: Condvar,
    space: Notify,
    capacity: usize,
}

impl<T> PlaybackBuffer<T> {
    /// Create a buffer holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(BufferState {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
                stats: BufferStats::default(),
            }),
            not_empty: Condvar::new(),
            space: Notify::new(),
            capacity,
        }
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current queue length
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> BufferStats {
        self.state.lock().stats
    }

    /// Queue `item`, waiting at most `timeout` for space
    ///
    /// Never blocks the calling task longer than `timeout`.
    pub async fn push(&self, item: T, timeout: Duration) -> PushOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a pop in between is not missed
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return PushOutcome::Closed;
                }
                if state.queue.len() < self.capacity {
                    state.queue.push_back(item);
                    state.stats.queued += 1;
                    let len = state.queue.len();
                    if len > state.stats.high_water_mark {
                        state.stats.high_water_mark = len;
                    }
                    drop(state);
                    self.not_empty.notify_one();
                    return PushOutcome::Queued;
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let mut state = self.state.lock();
                if state.closed {
                    return PushOutcome::Closed;
                }
                state.stats.dropped += 1;
                return PushOutcome::Dropped;
            }
        }
    }

    /// Take the oldest item, blocking the calling thread at most `timeout`
    ///
    /// Items queued before [`close`](Self::close) are still handed out.
    pub fn pop_timeout(&self, timeout: Duration) -> PopOutcome<T> {
        let deadline = std::time::Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.space.notify_one();
                return PopOutcome::Item(item);
            }
            if state.closed {
                return PopOutcome::Closed;
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return match state.queue.pop_front() {
                    Some(item) => {
                        drop(state);
                        self.space.notify_one();
                        PopOutcome::Item(item)
                    }
                    None if state.closed => PopOutcome::Closed,
                    None => PopOutcome::Timeout,
                };
            }
        }
    }

    /// Reject further pushes and wake both sides
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.space.notify_waiters();
    }
}

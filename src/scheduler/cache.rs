//! The request cache: a closeable FIFO queue feeding the schedule pump.

use crate::data::Request;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Running,
    Closed,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Running => f.write_str("running"),
            CacheStatus::Closed => f.write_str("closed"),
        }
    }
}

/// A value snapshot of the cache, for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    pub status: CacheStatus,
    pub length: usize,
    pub capacity: usize,
}

impl fmt::Display for CacheSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status: {}, length: {}, capacity: {}",
            self.status, self.length, self.capacity
        )
    }
}

#[derive(Debug)]
struct CacheState {
    queue: VecDeque<Request>,
    status: CacheStatus,
}

/// An unbounded FIFO of pending requests.
///
/// Queue and status live under one mutex, so a `close` is immediately
/// visible to concurrent `put` and `get` callers.
#[derive(Debug)]
pub struct RequestCache {
    state: Mutex<CacheState>,
}

impl RequestCache {
    pub fn new() -> Self {
        RequestCache {
            state: Mutex::new(CacheState {
                queue: VecDeque::new(),
                status: CacheStatus::Running,
            }),
        }
    }

    /// Appends a request. Returns false once the cache is closed.
    pub fn put(&self, request: Request) -> bool {
        let mut state = self.state.lock();
        if state.status == CacheStatus::Closed {
            return false;
        }
        state.queue.push_back(request);
        true
    }

    /// Removes and returns the oldest request, or `None` when the cache is
    /// empty or closed.
    pub fn get(&self) -> Option<Request> {
        let mut state = self.state.lock();
        if state.status == CacheStatus::Closed {
            return None;
        }
        state.queue.pop_front()
    }

    /// The advisory capacity of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.state.lock().queue.capacity()
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Idempotent.
    pub fn close(&self) {
        self.state.lock().status = CacheStatus::Closed;
    }

    pub fn status(&self) -> CacheStatus {
        self.state.lock().status
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.lock();
        CacheSnapshot {
            status: state.status,
            length: state.queue.len(),
            capacity: state.queue.capacity(),
        }
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

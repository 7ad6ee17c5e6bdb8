//! # Channel Manager
//!
//! Owns the four bounded pipeline queues (request, response, item, error)
//! and their lifecycle. Each stage dispatcher holds clones of the handles it
//! needs; `close` seals all four queues at once, which is the sentinel every
//! dispatcher loop terminates on.

use crate::args::ChannelArgs;
use crate::data::{Item, Request, Response};
use crate::error::{ChannelError, CrawlerError};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;

/// Lifecycle status of the manager. Construction initialises the queues, so
/// there is no separate uninitialised state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelManagerStatus {
    Initialized,
    Closed,
}

impl fmt::Display for ChannelManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelManagerStatus::Initialized => f.write_str("initialized"),
            ChannelManagerStatus::Closed => f.write_str("closed"),
        }
    }
}

struct Queue<T> {
    tx: kanal::AsyncSender<T>,
    rx: kanal::AsyncReceiver<T>,
    cap: usize,
}

impl<T> Queue<T> {
    fn bounded(cap: usize) -> Self {
        let (tx, rx) = kanal::bounded_async(cap);
        Queue { tx, rx, cap }
    }

    fn stat(&self) -> QueueStat {
        QueueStat {
            len: self.tx.len(),
            cap: self.cap,
        }
    }
}

/// Occupancy of one queue at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStat {
    pub len: usize,
    pub cap: usize,
}

impl fmt::Display for QueueStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.len, self.cap)
    }
}

/// A value snapshot of the manager state, for summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelManagerSnapshot {
    pub status: ChannelManagerStatus,
    pub request: QueueStat,
    pub response: QueueStat,
    pub item: QueueStat,
    pub error: QueueStat,
}

impl fmt::Display for ChannelManagerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status: {}, request: {}, response: {}, item: {}, error: {}",
            self.status, self.request, self.response, self.item, self.error
        )
    }
}

/// The owner of the four pipeline queues.
pub struct ChannelManager {
    status: RwLock<ChannelManagerStatus>,
    request: Queue<Request>,
    response: Queue<Response>,
    item: Queue<Item>,
    error: Queue<CrawlerError>,
}

impl ChannelManager {
    pub fn new(args: ChannelArgs) -> Self {
        ChannelManager {
            status: RwLock::new(ChannelManagerStatus::Initialized),
            request: Queue::bounded(args.request_queue_cap),
            response: Queue::bounded(args.response_queue_cap),
            item: Queue::bounded(args.item_queue_cap),
            error: Queue::bounded(args.error_queue_cap),
        }
    }

    pub fn status(&self) -> ChannelManagerStatus {
        *self.status.read()
    }

    fn guard(&self) -> Result<(), ChannelError> {
        match *self.status.read() {
            ChannelManagerStatus::Initialized => Ok(()),
            ChannelManagerStatus::Closed => Err(ChannelError::Closed),
        }
    }

    pub fn request_sender(&self) -> Result<kanal::AsyncSender<Request>, ChannelError> {
        self.guard()?;
        Ok(self.request.tx.clone())
    }

    pub fn request_receiver(&self) -> Result<kanal::AsyncReceiver<Request>, ChannelError> {
        self.guard()?;
        Ok(self.request.rx.clone())
    }

    pub fn response_sender(&self) -> Result<kanal::AsyncSender<Response>, ChannelError> {
        self.guard()?;
        Ok(self.response.tx.clone())
    }

    pub fn response_receiver(&self) -> Result<kanal::AsyncReceiver<Response>, ChannelError> {
        self.guard()?;
        Ok(self.response.rx.clone())
    }

    pub fn item_sender(&self) -> Result<kanal::AsyncSender<Item>, ChannelError> {
        self.guard()?;
        Ok(self.item.tx.clone())
    }

    pub fn item_receiver(&self) -> Result<kanal::AsyncReceiver<Item>, ChannelError> {
        self.guard()?;
        Ok(self.item.rx.clone())
    }

    pub fn error_sender(&self) -> Result<kanal::AsyncSender<CrawlerError>, ChannelError> {
        self.guard()?;
        Ok(self.error.tx.clone())
    }

    pub fn error_receiver(&self) -> Result<kanal::AsyncReceiver<CrawlerError>, ChannelError> {
        self.guard()?;
        Ok(self.error.rx.clone())
    }

    /// Seals all four queues. Returns false if already closed.
    pub fn close(&self) -> bool {
        let mut status = self.status.write();
        if *status == ChannelManagerStatus::Closed {
            return false;
        }
        let _ = self.request.tx.close();
        let _ = self.response.tx.close();
        let _ = self.item.tx.close();
        let _ = self.error.tx.close();
        *status = ChannelManagerStatus::Closed;
        true
    }

    pub fn snapshot(&self) -> ChannelManagerSnapshot {
        ChannelManagerSnapshot {
            status: self.status(),
            request: self.request.stat(),
            response: self.response.stat(),
            item: self.item.stat(),
            error: self.error.stat(),
        }
    }
}

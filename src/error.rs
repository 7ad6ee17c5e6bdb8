//! Error types for the crawl engine.
//!
//! Two families exist side by side. [`Error`] covers fallible operations on
//! the engine itself, configuration problems foremost, and fails `start`
//! synchronously. [`CrawlerError`] is the payload of the error queue: a stage
//! tag plus a message, reported while the crawl keeps running.

use serde::Serialize;
use std::fmt;

/// The stage a reported error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Downloader,
    Analyzer,
    ItemProcessor,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Downloader => "Downloader Error",
            ErrorKind::Analyzer => "Analyzer Error",
            ErrorKind::ItemProcessor => "Item Processor Error",
        };
        f.write_str(name)
    }
}

/// A recoverable stage error dispatched to the error queue.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Crawler Error: {kind}: {message}")]
pub struct CrawlerError {
    kind: ErrorKind,
    message: String,
}

impl CrawlerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CrawlerError {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors returned by pool operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("the pool cannot be initialized (capacity={0})")]
    ZeroCapacity(u32),
    #[error("duplicate entity id {0} at pool construction")]
    DuplicateId(u32),
    #[error("the entity container is closed")]
    Closed,
    #[error("the entity (id={0}) is already in the pool")]
    AlreadyReleased(u32),
    #[error("the entity (id={0}) is unknown to this pool")]
    UnknownEntity(u32),
}

/// Errors returned by channel manager accessors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("the channel manager is closed")]
    Closed,
}

/// Top-level engine errors. Only these stop `start`; a running crawl is
/// stopped solely through `Scheduler::stop`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("the scheduler has already been started")]
    AlreadyStarted,
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("cannot derive a primary domain from host '{0}'")]
    PrimaryDomain(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawler_error_display_carries_stage_tag() {
        let err = CrawlerError::new(ErrorKind::Analyzer, "bad markup");
        assert_eq!(err.to_string(), "Crawler Error: Analyzer Error: bad markup");
        assert_eq!(err.kind(), ErrorKind::Analyzer);
    }
}

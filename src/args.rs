//! Configuration containers for the scheduler.
//!
//! Every numeric field must be greater than zero; `validate` is called by
//! `Scheduler::start` before any component is built, so a bad container
//! fails the start synchronously and the crawl never begins.

use crate::error::Error;
use serde::Serialize;
use std::fmt;

/// Capacities of the four bounded pipeline queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelArgs {
    pub request_queue_cap: usize,
    pub response_queue_cap: usize,
    pub item_queue_cap: usize,
    pub error_queue_cap: usize,
}

impl ChannelArgs {
    pub fn new(
        request_queue_cap: usize,
        response_queue_cap: usize,
        item_queue_cap: usize,
        error_queue_cap: usize,
    ) -> Self {
        ChannelArgs {
            request_queue_cap,
            response_queue_cap,
            item_queue_cap,
            error_queue_cap,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.request_queue_cap == 0 {
            return Err(Error::Configuration(
                "the request queue capacity cannot be 0".into(),
            ));
        }
        if self.response_queue_cap == 0 {
            return Err(Error::Configuration(
                "the response queue capacity cannot be 0".into(),
            ));
        }
        if self.item_queue_cap == 0 {
            return Err(Error::Configuration(
                "the item queue capacity cannot be 0".into(),
            ));
        }
        if self.error_queue_cap == 0 {
            return Err(Error::Configuration(
                "the error queue capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ChannelArgs {
    fn default() -> Self {
        ChannelArgs::new(100, 100, 100, 100)
    }
}

impl fmt::Display for ChannelArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ request: {}, response: {}, item: {}, error: {} }}",
            self.request_queue_cap,
            self.response_queue_cap,
            self.item_queue_cap,
            self.error_queue_cap
        )
    }
}

/// Sizes of the downloader and analyzer worker pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolArgs {
    pub downloader_pool_size: u32,
    pub analyzer_pool_size: u32,
}

impl PoolArgs {
    pub fn new(downloader_pool_size: u32, analyzer_pool_size: u32) -> Self {
        PoolArgs {
            downloader_pool_size,
            analyzer_pool_size,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.downloader_pool_size == 0 {
            return Err(Error::Configuration(
                "the downloader pool size cannot be 0".into(),
            ));
        }
        if self.analyzer_pool_size == 0 {
            return Err(Error::Configuration(
                "the analyzer pool size cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolArgs {
    fn default() -> Self {
        let cpus = num_cpus::get() as u32;
        PoolArgs {
            downloader_pool_size: cpus.clamp(2, 16),
            analyzer_pool_size: cpus.clamp(2, 8),
        }
    }
}

impl fmt::Display for PoolArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ downloaders: {}, analyzers: {} }}",
            self.downloader_pool_size, self.analyzer_pool_size
        )
    }
}

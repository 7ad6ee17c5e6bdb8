//! # trawler
//!
//! A concurrent web-crawler orchestration engine: breadth-first,
//! bounded-depth, same-domain crawling through parallel download, analyze
//! and item-processing stages.
//!
//! The engine owns the scheduling machinery only. HTTP fetching, response
//! parsing and item processing are injected by the caller through the
//! [`HttpClient`] trait and the [`ParseResponse`] / [`ProcessItem`]
//! callback types.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trawler::prelude::*;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scheduler = Arc::new(Scheduler::new());
//!     let check_count_rx = monitoring(Arc::clone(&scheduler), MonitorArgs::default());
//!
//!     scheduler
//!         .start(
//!             ChannelArgs::new(10, 10, 10, 10),
//!             PoolArgs::new(3, 3),
//!             1,
//!             ReqwestClient::factory(),
//!             vec![my_link_parser()],
//!             vec![my_item_processor()],
//!             Request::new(Url::parse("http://www.example.com").unwrap()),
//!         )
//!         .unwrap();
//!
//!     // wait for the monitor to observe convergence and auto-stop
//!     check_count_rx.recv().await.unwrap();
//! }
//! ```

pub mod analyzer;
pub mod args;
pub mod chanman;
pub mod client;
pub mod data;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod id;
pub mod monitor;
pub mod pipeline;
pub mod pool;
pub mod prelude;
pub mod scheduler;
pub mod stopsign;

pub use analyzer::{Analyzer, ParseResponse};
pub use args::{ChannelArgs, PoolArgs};
pub use chanman::{ChannelManager, ChannelManagerStatus};
pub use client::{GenHttpClient, HttpClient, ReqwestClient};
pub use data::{Data, Item, Request, Response};
pub use downloader::PageDownloader;
pub use error::{ChannelError, CrawlerError, Error, ErrorKind, PoolError};
pub use id::{IdGenerator, WideIdGenerator};
pub use monitor::{monitoring, MonitorArgs};
pub use pipeline::{ItemPipeline, ProcessItem};
pub use pool::{Entity, Pool};
pub use scheduler::{RequestCache, RunState, SchedSummary, Scheduler};
pub use stopsign::StopSign;

pub use async_trait::async_trait;
pub use tokio;

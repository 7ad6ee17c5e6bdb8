//! # Scheduler Module
//!
//! The heart of the engine: wires the stages together, enforces the
//! URL/domain/depth admission policy, pumps requests from the cache into the
//! bounded request queue, and orchestrates shutdown.
//!
//! ## Control flow
//!
//! A seed request is placed in the request cache. The schedule pump moves
//! requests from the cache into the request queue as capacity permits. The
//! download dispatcher reads the request queue, checks a downloader out of
//! its pool, performs the fetch and writes the response to the response
//! queue. The analyze dispatcher reads responses, checks out an analyzer and
//! runs the user parsers; resulting requests are filtered back into the
//! cache, items go to the item queue. The item dispatcher drains items
//! through the item pipeline. Errors from every stage flow to a single
//! error queue.
//!
//! ## Shutdown discipline
//!
//! The stop sign is the single source of truth. Every outbound queue write
//! is guarded on it; a signed stop makes the writer record the deal under
//! its code and drop the send. Closing the channel manager unblocks all
//! dispatchers, closing the cache stops the pump. `stop` does not wait for
//! dispatchers to finish; the monitor observes quiescence.

mod cache;
mod summary;

pub use cache::{CacheSnapshot, CacheStatus, RequestCache};
pub use summary::{PoolStat, SchedSummary};

use crate::analyzer::{analyzer_pool, Analyzer, ParseResponse};
use crate::args::{ChannelArgs, PoolArgs};
use crate::chanman::ChannelManager;
use crate::client::GenHttpClient;
use crate::data::{Data, Item, Request, Response};
use crate::domain;
use crate::downloader::{downloader_pool, PageDownloader};
use crate::error::{CrawlerError, Error, ErrorKind};
use crate::pipeline::{ItemPipeline, ProcessItem};
use crate::pool::{Entity, Pool};
use crate::stopsign::StopSign;
use anyhow::anyhow;
use dashmap::DashSet;
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, trace, warn};

pub(crate) const DOWNLOADER_CODE: &str = "downloader";
pub(crate) const ANALYZER_CODE: &str = "analyzer";
pub(crate) const ITEM_PIPELINE_CODE: &str = "item_pipeline";
pub(crate) const SCHEDULER_CODE: &str = "scheduler";

const RUN_INITIAL: u32 = 0;
const RUN_STARTED: u32 = 1;
const RUN_STOPPED: u32 = 2;

/// Interval of the schedule pump.
const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initial,
    Started,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Initial => f.write_str("initial"),
            RunState::Started => f.write_str("started"),
            RunState::Stopped => f.write_str("stopped"),
        }
    }
}

fn entity_code(prefix: &str, id: u32) -> String {
    format!("{prefix}-{id}")
}

/// The crawl orchestrator.
///
/// One scheduler drives one crawl at a time; after a `stop` it may be
/// started again with fresh components. All methods take `&self`, so a
/// scheduler is shared behind an `Arc` between the caller and the monitor.
pub struct Scheduler {
    running: AtomicU32,
    stop_sign: Arc<StopSign>,
    accepted_schemes: Mutex<Vec<String>>,
    inner: RwLock<Option<Arc<Inner>>>,
}

// Per-run component container, immutable once built.
pub(crate) struct Inner {
    channel_args: ChannelArgs,
    pool_args: PoolArgs,
    crawl_depth: u32,
    primary_domain: String,
    schemes: Vec<String>,
    chanman: ChannelManager,
    dl_pool: Pool<PageDownloader>,
    analyzer_pool: Pool<Analyzer>,
    item_pipeline: ItemPipeline,
    req_cache: RequestCache,
    url_set: DashSet<String>,
    stop_sign: Arc<StopSign>,
}

// Releases the start slot again if setup fails partway through.
struct StartGuard<'a> {
    running: &'a AtomicU32,
    prev: u32,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.running.store(self.prev, Ordering::SeqCst);
        }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            running: AtomicU32::new(RUN_INITIAL),
            stop_sign: Arc::new(StopSign::new()),
            accepted_schemes: Mutex::new(vec!["http".to_string()]),
            inner: RwLock::new(None),
        }
    }

    /// Replaces the scheme whitelist consulted at admission time.
    ///
    /// The default accepts `http` only; pass `["http", "https"]` to follow
    /// secure links as well. Must be called before `start`; an empty list is
    /// ignored.
    pub fn accept_schemes<I, S>(&self, schemes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<String> = schemes
            .into_iter()
            .map(|s| s.into().to_ascii_lowercase())
            .collect();
        if !list.is_empty() {
            *self.accepted_schemes.lock() = list;
        }
    }

    /// Builds the components and starts the crawl from `first_request`.
    ///
    /// Fails synchronously on invalid configuration, on a seed whose primary
    /// domain cannot be derived, and when the scheduler is already started.
    /// Must be called from within a tokio runtime.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &self,
        channel_args: ChannelArgs,
        pool_args: PoolArgs,
        crawl_depth: u32,
        client_factory: GenHttpClient,
        parsers: Vec<ParseResponse>,
        processors: Vec<ProcessItem>,
        first_request: Request,
    ) -> Result<(), Error> {
        let prev = self.running.load(Ordering::SeqCst);
        if prev == RUN_STARTED
            || self
                .running
                .compare_exchange(prev, RUN_STARTED, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(Error::AlreadyStarted);
        }
        let guard = StartGuard {
            running: &self.running,
            prev,
            armed: true,
        };

        channel_args.validate()?;
        pool_args.validate()?;
        if parsers.is_empty() {
            return Err(Error::Configuration(
                "the response parser list is empty".into(),
            ));
        }
        if processors.is_empty() {
            return Err(Error::Configuration(
                "the item processor list is empty".into(),
            ));
        }
        let seed_host = first_request
            .url()
            .host_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::PrimaryDomain(first_request.url().to_string()))?;
        let primary_domain = domain::primary_domain(&seed_host)?;

        self.stop_sign.reset();
        let chanman = ChannelManager::new(channel_args);
        let dl_pool = downloader_pool(pool_args.downloader_pool_size, &client_factory)?;
        let analyzer_pool = analyzer_pool(pool_args.analyzer_pool_size)?;
        let item_pipeline = ItemPipeline::new(processors);

        let inner = Arc::new(Inner {
            channel_args,
            pool_args,
            crawl_depth,
            primary_domain,
            schemes: self.accepted_schemes.lock().clone(),
            chanman,
            dl_pool,
            analyzer_pool,
            item_pipeline,
            req_cache: RequestCache::new(),
            url_set: DashSet::new(),
            stop_sign: Arc::clone(&self.stop_sign),
        });

        spawn_download_dispatcher(Arc::clone(&inner))?;
        spawn_analyze_dispatcher(Arc::clone(&inner), Arc::new(parsers))?;
        spawn_item_dispatcher(Arc::clone(&inner))?;
        spawn_pump(Arc::clone(&inner), PUMP_INTERVAL)?;

        let seed = first_request.at_depth(0);
        inner.url_set.insert(seed.url().to_string());
        inner.req_cache.put(seed);

        *self.inner.write() = Some(inner);
        guard.disarm();
        Ok(())
    }

    /// Stops the crawl: signs the stop sign, seals the pipeline queues and
    /// the request cache.
    ///
    /// Returns true on the first call after a start, false otherwise.
    /// In-flight workers finish cooperatively; their late results are
    /// dropped at the guarded sends.
    pub fn stop(&self) -> bool {
        if self
            .running
            .compare_exchange(RUN_STARTED, RUN_STOPPED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.stop_sign.sign();
        if let Some(inner) = self.inner.read().as_ref() {
            inner.chanman.close();
            inner.req_cache.close();
        }
        true
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst) == RUN_STARTED
    }

    pub fn run_state(&self) -> RunState {
        match self.running.load(Ordering::SeqCst) {
            RUN_STARTED => RunState::Started,
            RUN_STOPPED => RunState::Stopped,
            _ => RunState::Initial,
        }
    }

    /// The receiving side of the error queue, or `None` when the scheduler
    /// has not started or has been stopped.
    pub fn error_chan(&self) -> Option<kanal::AsyncReceiver<CrawlerError>> {
        let guard = self.inner.read();
        guard.as_ref()?.chanman.error_receiver().ok()
    }

    /// Whether all pools are unused and no item is in flight.
    pub fn idle(&self) -> bool {
        let guard = self.inner.read();
        match guard.as_ref() {
            Some(inner) => inner.idle(),
            None => false,
        }
    }

    /// Captures a value snapshot of the scheduler state, or `None` before
    /// the first start.
    pub fn summary(&self, prefix: &str) -> Option<SchedSummary> {
        let guard = self.inner.read();
        guard
            .as_ref()
            .map(|inner| SchedSummary::capture(prefix, self.run_state(), inner))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn idle(&self) -> bool {
        self.dl_pool.used() == 0
            && self.analyzer_pool.used() == 0
            && self.item_pipeline.processing_number() == 0
    }

    /// Admission policy for analyzer-emitted requests.
    ///
    /// A request is admitted iff its scheme is whitelisted, its canonical
    /// URL has not been seen, its primary domain matches the seed's, its
    /// depth is within bounds, and the stop sign is not set.
    fn save_request_to_cache(&self, request: Request, code: &str) -> bool {
        let url = request.url();
        let scheme = url.scheme().to_ascii_lowercase();
        if !self.schemes.iter().any(|s| *s == scheme) {
            warn!(
                "ignoring the request: scheme '{}' is not accepted (url={})",
                scheme, url
            );
            return false;
        }
        let canonical = url.to_string();
        if self.url_set.contains(&canonical) {
            warn!("ignoring the request: repeated url (url={})", canonical);
            return false;
        }
        let host = url.host_str().unwrap_or("");
        match domain::primary_domain(host) {
            Ok(pd) if pd == self.primary_domain => {}
            Ok(_) => {
                warn!(
                    "ignoring the request: host '{}' is outside primary domain '{}' (url={})",
                    host, self.primary_domain, canonical
                );
                return false;
            }
            Err(_) => {
                warn!(
                    "ignoring the request: no primary domain for host '{}' (url={})",
                    host, canonical
                );
                return false;
            }
        }
        if request.depth() > self.crawl_depth {
            warn!(
                "ignoring the request: depth {} exceeds {} (url={})",
                request.depth(),
                self.crawl_depth,
                canonical
            );
            return false;
        }
        if self.stop_sign.signed() {
            self.stop_sign.deal(code);
            return false;
        }
        if !self.url_set.insert(canonical) {
            // lost the admission race to an identical request
            return false;
        }
        self.req_cache.put(request);
        true
    }

    async fn send_response(
        &self,
        tx: &kanal::AsyncSender<Response>,
        response: Response,
        code: &str,
    ) -> bool {
        if self.stop_sign.signed() {
            self.stop_sign.deal(code);
            return false;
        }
        if tx.send(response).await.is_err() {
            debug!("the response queue is sealed (code={})", code);
            return false;
        }
        true
    }

    async fn send_item(&self, tx: &kanal::AsyncSender<Item>, item: Item, code: &str) -> bool {
        if self.stop_sign.signed() {
            self.stop_sign.deal(code);
            return false;
        }
        if tx.send(item).await.is_err() {
            debug!("the item queue is sealed (code={})", code);
            return false;
        }
        true
    }

    /// Wraps a stage error and dispatches it to the error queue from a
    /// detached task, so stages never block on a full error queue.
    fn report_error(&self, kind: ErrorKind, err: anyhow::Error, code: &str) -> bool {
        if self.stop_sign.signed() {
            self.stop_sign.deal(code);
            return false;
        }
        let Ok(tx) = self.chanman.error_sender() else {
            return false;
        };
        let crawler_error = CrawlerError::new(kind, err.to_string());
        tokio::spawn(async move {
            let _ = tx.send(crawler_error).await;
        });
        true
    }
}

fn reap_finished(workers: &mut JoinSet<()>, stage: &str) {
    while let Some(result) = workers.try_join_next() {
        if let Err(err) = result {
            error!("a {} worker task failed: {}", stage, err);
        }
    }
}

async fn drain_workers(mut workers: JoinSet<()>, stage: &str) {
    while let Some(result) = workers.join_next().await {
        if let Err(err) = result {
            error!("a {} worker task failed: {}", stage, err);
        }
    }
}

fn spawn_download_dispatcher(inner: Arc<Inner>) -> Result<(), Error> {
    let req_rx = inner.chanman.request_receiver()?;
    let resp_tx = inner.chanman.response_sender()?;
    tokio::spawn(async move {
        trace!("download dispatcher started");
        let mut workers = JoinSet::new();
        while let Ok(request) = req_rx.recv().await {
            reap_finished(&mut workers, "download");
            let inner = Arc::clone(&inner);
            let resp_tx = resp_tx.clone();
            workers.spawn(async move {
                download_one(inner, resp_tx, request).await;
            });
        }
        drain_workers(workers, "download").await;
        trace!("download dispatcher finished");
    });
    Ok(())
}

async fn download_one(inner: Arc<Inner>, resp_tx: kanal::AsyncSender<Response>, request: Request) {
    let downloader = match inner.dl_pool.take().await {
        Ok(downloader) => downloader,
        Err(err) => {
            inner.report_error(
                ErrorKind::Downloader,
                anyhow!("downloader pool error: {err}"),
                SCHEDULER_CODE,
            );
            return;
        }
    };
    let code = entity_code(DOWNLOADER_CODE, downloader.id());
    match AssertUnwindSafe(downloader.download(&request))
        .catch_unwind()
        .await
    {
        Ok(Ok(response)) => {
            inner.send_response(&resp_tx, response, &code).await;
        }
        Ok(Err(err)) => {
            inner.report_error(ErrorKind::Downloader, err, &code);
        }
        Err(_) => {
            error!("fatal download error (url={})", request.url());
        }
    }
    if let Err(err) = inner.dl_pool.release(downloader).await {
        inner.report_error(
            ErrorKind::Downloader,
            anyhow!("downloader pool error: {err}"),
            SCHEDULER_CODE,
        );
    }
}

fn spawn_analyze_dispatcher(
    inner: Arc<Inner>,
    parsers: Arc<Vec<ParseResponse>>,
) -> Result<(), Error> {
    let resp_rx = inner.chanman.response_receiver()?;
    let item_tx = inner.chanman.item_sender()?;
    tokio::spawn(async move {
        trace!("analyze dispatcher started");
        let mut workers = JoinSet::new();
        while let Ok(response) = resp_rx.recv().await {
            reap_finished(&mut workers, "analyze");
            let inner = Arc::clone(&inner);
            let item_tx = item_tx.clone();
            let parsers = Arc::clone(&parsers);
            workers.spawn(async move {
                analyze_one(inner, item_tx, parsers, response).await;
            });
        }
        drain_workers(workers, "analyze").await;
        trace!("analyze dispatcher finished");
    });
    Ok(())
}

async fn analyze_one(
    inner: Arc<Inner>,
    item_tx: kanal::AsyncSender<Item>,
    parsers: Arc<Vec<ParseResponse>>,
    response: Response,
) {
    let analyzer = match inner.analyzer_pool.take().await {
        Ok(analyzer) => analyzer,
        Err(err) => {
            inner.report_error(
                ErrorKind::Analyzer,
                anyhow!("analyzer pool error: {err}"),
                SCHEDULER_CODE,
            );
            return;
        }
    };
    let code = entity_code(ANALYZER_CODE, analyzer.id());
    match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&parsers, &response))) {
        Ok((data_list, errors)) => {
            for data in data_list {
                match data {
                    Data::Request(request) => {
                        inner.save_request_to_cache(request, &code);
                    }
                    Data::Item(item) => {
                        inner.send_item(&item_tx, item, &code).await;
                    }
                }
            }
            for err in errors {
                inner.report_error(ErrorKind::Analyzer, err, &code);
            }
        }
        Err(_) => {
            error!("fatal analysis error (url={})", response.url());
        }
    }
    if let Err(err) = inner.analyzer_pool.release(analyzer).await {
        inner.report_error(
            ErrorKind::Analyzer,
            anyhow!("analyzer pool error: {err}"),
            SCHEDULER_CODE,
        );
    }
}

fn spawn_item_dispatcher(inner: Arc<Inner>) -> Result<(), Error> {
    let item_rx = inner.chanman.item_receiver()?;
    inner.item_pipeline.set_fail_fast(true);
    tokio::spawn(async move {
        trace!("item dispatcher started");
        let mut workers = JoinSet::new();
        while let Ok(item) = item_rx.recv().await {
            reap_finished(&mut workers, "item");
            let inner = Arc::clone(&inner);
            workers.spawn(async move {
                let errors = panic::catch_unwind(AssertUnwindSafe(|| {
                    inner.item_pipeline.send(item)
                }));
                match errors {
                    Ok(errors) => {
                        for err in errors {
                            inner.report_error(ErrorKind::ItemProcessor, err, ITEM_PIPELINE_CODE);
                        }
                    }
                    Err(_) => error!("fatal item processing error"),
                }
            });
        }
        drain_workers(workers, "item").await;
        trace!("item dispatcher finished");
    });
    Ok(())
}

/// The schedule pump: transfers requests from the cache into the bounded
/// request queue as capacity permits, observing the stop sign between
/// moves. The timed sleep keeps the pump off blocking writes so it notices
/// a stop promptly.
fn spawn_pump(inner: Arc<Inner>, interval: Duration) -> Result<(), Error> {
    let req_tx = inner.chanman.request_sender()?;
    let queue_cap = inner.channel_args.request_queue_cap;
    tokio::spawn(async move {
        trace!("schedule pump started");
        loop {
            if inner.stop_sign.signed() {
                inner.stop_sign.deal(SCHEDULER_CODE);
                break;
            }
            let mut remainder = queue_cap.saturating_sub(req_tx.len());
            while remainder > 0 {
                let Some(request) = inner.req_cache.get() else {
                    break;
                };
                if inner.stop_sign.signed() {
                    inner.stop_sign.deal(SCHEDULER_CODE);
                    trace!("schedule pump finished");
                    return;
                }
                if req_tx.send(request).await.is_err() {
                    trace!("the request queue is sealed, pump exiting");
                    return;
                }
                remainder -= 1;
            }
            tokio::time::sleep(interval).await;
        }
        trace!("schedule pump finished");
    });
    Ok(())
}

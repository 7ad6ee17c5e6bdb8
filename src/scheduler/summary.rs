//! Value snapshots of the scheduler state.
//!
//! A summary is captured at construction and never reaches back into live
//! scheduler fields, so holding one cannot observe later mutation and
//! cannot keep components alive.

use super::{Inner, RunState};
use crate::args::{ChannelArgs, PoolArgs};
use crate::chanman::ChannelManagerSnapshot;
use crate::pipeline::PipelineSnapshot;
use crate::scheduler::cache::CacheSnapshot;
use serde::Serialize;
use std::fmt;

/// Occupancy of one worker pool at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStat {
    pub used: u32,
    pub total: u32,
}

impl fmt::Display for PoolStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.used, self.total)
    }
}

/// A point-in-time description of a scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedSummary {
    #[serde(skip)]
    prefix: String,
    run_state: RunState,
    channel_args: ChannelArgs,
    pool_args: PoolArgs,
    crawl_depth: u32,
    chanman: ChannelManagerSnapshot,
    req_cache: CacheSnapshot,
    downloader_pool: PoolStat,
    analyzer_pool: PoolStat,
    item_pipeline: PipelineSnapshot,
    url_count: usize,
    #[serde(skip)]
    url_detail: Vec<String>,
    stop_sign: String,
}

impl SchedSummary {
    pub(crate) fn capture(prefix: &str, run_state: RunState, inner: &Inner) -> Self {
        let mut url_detail: Vec<String> =
            inner.url_set.iter().map(|entry| entry.key().clone()).collect();
        url_detail.sort_unstable();
        SchedSummary {
            prefix: prefix.to_string(),
            run_state,
            channel_args: inner.channel_args,
            pool_args: inner.pool_args,
            crawl_depth: inner.crawl_depth,
            chanman: inner.chanman.snapshot(),
            req_cache: inner.req_cache.snapshot(),
            downloader_pool: PoolStat {
                used: inner.dl_pool.used(),
                total: inner.dl_pool.total(),
            },
            analyzer_pool: PoolStat {
                used: inner.analyzer_pool.used(),
                total: inner.analyzer_pool.total(),
            },
            item_pipeline: inner.item_pipeline.snapshot(),
            url_count: url_detail.len(),
            url_detail,
            stop_sign: inner.stop_sign.summary(),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn crawl_depth(&self) -> u32 {
        self.crawl_depth
    }

    pub fn downloader_pool(&self) -> PoolStat {
        self.downloader_pool
    }

    pub fn analyzer_pool(&self) -> PoolStat {
        self.analyzer_pool
    }

    pub fn item_pipeline(&self) -> &PipelineSnapshot {
        &self.item_pipeline
    }

    pub fn req_cache(&self) -> CacheSnapshot {
        self.req_cache
    }

    pub fn chanman(&self) -> &ChannelManagerSnapshot {
        &self.chanman
    }

    pub fn url_count(&self) -> usize {
        self.url_count
    }

    pub fn urls(&self) -> &[String] {
        &self.url_detail
    }

    pub fn stop_sign(&self) -> &str {
        &self.stop_sign
    }

    /// Whether two summaries describe the same observable state. The prefix
    /// and the URL listing do not take part in the comparison.
    pub fn same(&self, other: &SchedSummary) -> bool {
        self.run_state == other.run_state
            && self.channel_args == other.channel_args
            && self.pool_args == other.pool_args
            && self.crawl_depth == other.crawl_depth
            && self.chanman == other.chanman
            && self.req_cache == other.req_cache
            && self.downloader_pool == other.downloader_pool
            && self.analyzer_pool == other.analyzer_pool
            && self.item_pipeline == other.item_pipeline
            && self.url_count == other.url_count
            && self.stop_sign == other.stop_sign
    }

    /// The full rendering, URL list included.
    pub fn detail(&self) -> String {
        self.render(true)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn render(&self, detail: bool) -> String {
        let p = &self.prefix;
        let urls = if detail {
            if self.url_detail.is_empty() {
                "\n".to_string()
            } else {
                let mut listing = String::from("\n");
                for url in &self.url_detail {
                    listing.push_str(p);
                    listing.push_str(p);
                    listing.push_str(url);
                    listing.push('\n');
                }
                listing
            }
        } else {
            "<concealed>\n".to_string()
        };
        format!(
            "{p}Running: {}\n\
             {p}Channel args: {}\n\
             {p}Pool args: {}\n\
             {p}Crawl depth: {}\n\
             {p}Channel manager: {}\n\
             {p}Request cache: {}\n\
             {p}Downloader pool: {}\n\
             {p}Analyzer pool: {}\n\
             {p}Item pipeline: {}\n\
             {p}Urls({}): {}\
             {p}Stop sign: {}\n",
            self.run_state == RunState::Started,
            self.channel_args,
            self.pool_args,
            self.crawl_depth,
            self.chanman,
            self.req_cache,
            self.downloader_pool,
            self.analyzer_pool,
            self.item_pipeline,
            self.url_count,
            urls,
            self.stop_sign,
        )
    }
}

impl fmt::Display for SchedSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

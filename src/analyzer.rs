//! The analyze stage: pooled analyzers running user-supplied parsers.

use crate::data::{Data, Response};
use crate::error::PoolError;
use crate::id::IdGenerator;
use crate::pool::{Entity, Pool};
use anyhow::anyhow;
use std::sync::Arc;
use tracing::info;

/// A user-supplied response parser.
///
/// Invoked with the response and its depth; returns parsed data and any
/// per-fragment errors encountered along the way.
pub type ParseResponse =
    Arc<dyn Fn(&Response, u32) -> (Vec<Data>, Vec<anyhow::Error>) + Send + Sync>;

/// A pooled worker that runs every parser over one response.
pub struct Analyzer {
    id: u32,
}

impl Entity for Analyzer {
    fn id(&self) -> u32 {
        self.id
    }
}

impl Analyzer {
    pub fn new(id: u32) -> Self {
        Analyzer { id }
    }

    /// Invokes each parser in order and concatenates their outputs.
    ///
    /// Requests emitted at a depth other than `response.depth() + 1` are
    /// rewritten; depth is derived from the crawl structure, never trusted
    /// from parsers.
    pub fn analyze(
        &self,
        parsers: &[ParseResponse],
        response: &Response,
    ) -> (Vec<Data>, Vec<anyhow::Error>) {
        if parsers.is_empty() {
            return (Vec::new(), vec![anyhow!("the response parser list is empty")]);
        }
        info!("parsing the response (url={})", response.url());
        let response_depth = response.depth();
        let mut data_list = Vec::new();
        let mut errors = Vec::new();
        for parser in parsers {
            let (data, errs) = parser(response, response_depth);
            data_list.extend(data.into_iter().map(|d| align_depth(d, response_depth)));
            errors.extend(errs);
        }
        (data_list, errors)
    }
}

fn align_depth(data: Data, response_depth: u32) -> Data {
    match data {
        Data::Request(request) => {
            let expected = response_depth.saturating_add(1);
            if request.depth() == expected {
                Data::Request(request)
            } else {
                Data::Request(request.at_depth(expected))
            }
        }
        other => other,
    }
}

/// Builds the analyzer pool with ids scoped to this pool.
pub fn analyzer_pool(size: u32) -> Result<Pool<Analyzer>, PoolError> {
    let ids = IdGenerator::new();
    Pool::new(size, || Analyzer::new(ids.next()))
}

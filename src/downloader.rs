//! The download stage: pooled page downloaders over injected HTTP clients.

use crate::client::{GenHttpClient, HttpClient};
use crate::data::{Request, Response};
use crate::error::PoolError;
use crate::id::IdGenerator;
use crate::pool::{Entity, Pool};
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// A pooled worker that serves one request at a time.
pub struct PageDownloader {
    id: u32,
    client: Arc<dyn HttpClient>,
}

impl Entity for PageDownloader {
    fn id(&self) -> u32 {
        self.id
    }
}

impl PageDownloader {
    pub fn new(id: u32, client: Arc<dyn HttpClient>) -> Self {
        PageDownloader { id, client }
    }

    /// Fetches the page behind `request` through the injected client.
    ///
    /// The response depth always equals the request depth; the crawl
    /// structure is authoritative, not the client.
    pub async fn download(&self, request: &Request) -> Result<Response> {
        debug!("performing the request (url={})", request.url());
        let response = self.client.fetch(request).await?;
        if response.depth() == request.depth() {
            Ok(response)
        } else {
            Ok(response.at_depth(request.depth()))
        }
    }
}

/// Builds the downloader pool, one client per entity, ids scoped to this
/// pool.
pub fn downloader_pool(
    size: u32,
    gen_client: &GenHttpClient,
) -> Result<Pool<PageDownloader>, PoolError> {
    let ids = IdGenerator::new();
    Pool::new(size, || PageDownloader::new(ids.next(), gen_client()))
}

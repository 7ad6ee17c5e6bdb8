//! The HTTP client contract and a default `reqwest`-backed implementation.
//!
//! The engine never fetches on its own. `Scheduler::start` receives a
//! factory and hands every pooled downloader its own client instance, so
//! timeouts, proxies and redirect policies are entirely the caller's
//! business.

use crate::data::{Request, Response};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A user-supplied HTTP client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Performs the request and returns the downloaded response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// A factory producing one client per pooled downloader.
pub type GenHttpClient = Arc<dyn Fn() -> Arc<dyn HttpClient> + Send + Sync>;

/// The default client, a thin adapter over [`reqwest::Client`].
#[derive(Clone, Default)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_client(inner: reqwest::Client) -> Self {
        ReqwestClient { inner }
    }

    /// A factory closing over one shared connection pool.
    pub fn factory() -> GenHttpClient {
        Arc::new(|| Arc::new(ReqwestClient::new()) as Arc<dyn HttpClient>)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let outcome = self
            .inner
            .request(request.method().clone(), request.url().clone())
            .send()
            .await?;
        let url = outcome.url().clone();
        let status = outcome.status();
        let body = outcome.bytes().await?;
        Ok(Response::new(url, status, body, request.depth()))
    }
}

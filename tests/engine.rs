//! End-to-end crawl scenarios driven through stub HTTP clients.
//!
//! Pages are plain-text documents in a tiny line format: `link <url>` lines
//! become follow-up requests, `item <text>` lines become scraped items.
//! No network and no HTML parsing are involved.

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use trawler::{
    monitoring, ChannelArgs, Data, ErrorKind, GenHttpClient, HttpClient, Item, MonitorArgs,
    ParseResponse, PoolArgs, ProcessItem, Request, Response, RunState, Scheduler,
};
use url::Url;

const CONVERGE_LIMIT: Duration = Duration::from_secs(30);

struct StubClient {
    pages: HashMap<String, String>,
    fetched: Mutex<Vec<String>>,
}

impl StubClient {
    fn new(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(StubClient {
            pages: pages
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            fetched: Mutex::new(Vec::new()),
        })
    }

    fn factory(client: &Arc<Self>) -> GenHttpClient {
        let client = Arc::clone(client);
        Arc::new(move || Arc::clone(&client) as Arc<dyn HttpClient>)
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl HttpClient for StubClient {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Response> {
        let url = request.url().to_string();
        self.fetched.lock().push(url.clone());
        match self.pages.get(&url) {
            Some(body) => Ok(Response::new(
                request.url().clone(),
                StatusCode::OK,
                Bytes::from(body.clone()),
                request.depth(),
            )),
            None => Err(anyhow!("no page behind {url}")),
        }
    }
}

fn line_parser() -> ParseResponse {
    Arc::new(|response: &Response, response_depth: u32| {
        let mut data = Vec::new();
        let mut errors = Vec::new();
        for line in response.text().lines() {
            let line = line.trim();
            if let Some(href) = line.strip_prefix("link ") {
                let href = href.trim();
                if href.is_empty() || href == "#" || href == "/" {
                    continue;
                }
                match Url::parse(href) {
                    Ok(url) => data.push(Data::Request(Request::with_depth(
                        url,
                        response_depth + 1,
                    ))),
                    Err(err) => errors.push(err.into()),
                }
            } else if let Some(text) = line.strip_prefix("item ") {
                let mut item = Item::new();
                item.insert("text", text.trim());
                data.push(Data::Item(item));
            }
        }
        (data, errors)
    })
}

fn collecting_processor(sink: Arc<Mutex<Vec<Item>>>) -> ProcessItem {
    Arc::new(move |item| {
        sink.lock().push(item.clone());
        (None, None)
    })
}

fn discarding_processor() -> ProcessItem {
    Arc::new(|_| (None, None))
}

fn failing_processor() -> ProcessItem {
    Arc::new(|_| (None, Some(anyhow!("processor rejected the item"))))
}

fn fast_monitor() -> MonitorArgs {
    MonitorArgs {
        interval: Duration::from_millis(1),
        max_idle_count: 1000,
        auto_stop: true,
        detail_summary: false,
    }
}

fn channel_args() -> ChannelArgs {
    ChannelArgs::new(10, 10, 10, 10)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn seed_only_crawl_converges_and_auto_stops() {
    let client = StubClient::new(&[("http://www.example.com/", "nothing here")]);
    let scheduler = Arc::new(Scheduler::new());
    let check_count_rx = monitoring(Arc::clone(&scheduler), fast_monitor());

    scheduler
        .start(
            channel_args(),
            PoolArgs::new(3, 3),
            0,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![discarding_processor()],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();

    let check_count = timeout(CONVERGE_LIMIT, check_count_rx.recv())
        .await
        .expect("monitor did not converge")
        .unwrap();
    // at least the idle window's worth of checks happened
    assert!(check_count >= 999, "check count was {check_count}");

    assert_eq!(scheduler.run_state(), RunState::Stopped);
    assert!(!scheduler.stop(), "auto-stop already stopped the scheduler");

    let summary = scheduler.summary("  ").unwrap();
    assert_eq!(summary.item_pipeline().sent, 0);
    assert_eq!(summary.item_pipeline().processed, 0);
    assert_eq!(client.fetched(), vec!["http://www.example.com/"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_domain_links_are_followed_within_the_depth_bound() {
    let client = StubClient::new(&[
        (
            "http://www.example.com/",
            "item seed-text\nlink http://sub.example.com/a",
        ),
        (
            "http://sub.example.com/a",
            "item a-text\nlink http://www.example.com/too-deep",
        ),
        ("http://www.example.com/too-deep", "never fetched"),
    ]);
    let items = Arc::new(Mutex::new(Vec::new()));
    let scheduler = Arc::new(Scheduler::new());
    let check_count_rx = monitoring(Arc::clone(&scheduler), fast_monitor());

    scheduler
        .start(
            channel_args(),
            PoolArgs::new(3, 3),
            1,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![collecting_processor(Arc::clone(&items))],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();

    timeout(CONVERGE_LIMIT, check_count_rx.recv())
        .await
        .expect("monitor did not converge")
        .unwrap();

    let mut fetched = client.fetched();
    fetched.sort_unstable();
    assert_eq!(
        fetched,
        vec!["http://sub.example.com/a", "http://www.example.com/"],
        "the depth-2 link must be rejected"
    );

    let summary = scheduler.summary("  ").unwrap();
    assert_eq!(summary.url_count(), 2);
    assert_eq!(summary.item_pipeline().sent, 2);
    assert_eq!(summary.item_pipeline().processed, 2);

    let mut texts: Vec<String> = items
        .lock()
        .iter()
        .map(|item| item.get("text").unwrap().as_str().unwrap().to_string())
        .collect();
    texts.sort_unstable();
    assert_eq!(texts, vec!["a-text", "seed-text"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn foreign_domain_links_are_rejected() {
    let client = StubClient::new(&[
        ("http://www.example.com/", "link http://www.other.org/x"),
        ("http://www.other.org/x", "never fetched"),
    ]);
    let scheduler = Arc::new(Scheduler::new());
    let check_count_rx = monitoring(Arc::clone(&scheduler), fast_monitor());

    scheduler
        .start(
            channel_args(),
            PoolArgs::new(3, 3),
            2,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![discarding_processor()],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();

    timeout(CONVERGE_LIMIT, check_count_rx.recv())
        .await
        .expect("monitor did not converge")
        .unwrap();

    assert_eq!(client.fetched(), vec!["http://www.example.com/"]);
    assert_eq!(scheduler.summary("  ").unwrap().url_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_and_degenerate_links_are_admitted_once() {
    let client = StubClient::new(&[
        (
            "http://www.example.com/",
            "link http://www.example.com/a\n\
             link http://www.example.com/a\n\
             link #\n\
             link /",
        ),
        ("http://www.example.com/a", "leaf"),
    ]);
    let scheduler = Arc::new(Scheduler::new());
    let check_count_rx = monitoring(Arc::clone(&scheduler), fast_monitor());

    scheduler
        .start(
            channel_args(),
            PoolArgs::new(3, 3),
            1,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![discarding_processor()],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();

    timeout(CONVERGE_LIMIT, check_count_rx.recv())
        .await
        .expect("monitor did not converge")
        .unwrap();

    let mut fetched = client.fetched();
    fetched.sort_unstable();
    assert_eq!(
        fetched,
        vec!["http://www.example.com/", "http://www.example.com/a"]
    );
    assert_eq!(scheduler.summary("  ").unwrap().url_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn https_links_are_rejected_unless_whitelisted() {
    let pages: &[(&str, &str)] = &[
        ("http://www.example.com/", "link https://www.example.com/s"),
        ("https://www.example.com/s", "leaf"),
    ];

    // default whitelist accepts http only
    let client = StubClient::new(pages);
    let scheduler = Arc::new(Scheduler::new());
    let check_count_rx = monitoring(Arc::clone(&scheduler), fast_monitor());
    scheduler
        .start(
            channel_args(),
            PoolArgs::new(2, 2),
            1,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![discarding_processor()],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();
    timeout(CONVERGE_LIMIT, check_count_rx.recv())
        .await
        .expect("monitor did not converge")
        .unwrap();
    assert_eq!(client.fetched(), vec!["http://www.example.com/"]);

    // an explicit whitelist lets the secure link through
    let client = StubClient::new(pages);
    let scheduler = Arc::new(Scheduler::new());
    scheduler.accept_schemes(["http", "https"]);
    let check_count_rx = monitoring(Arc::clone(&scheduler), fast_monitor());
    scheduler
        .start(
            channel_args(),
            PoolArgs::new(2, 2),
            1,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![discarding_processor()],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();
    timeout(CONVERGE_LIMIT, check_count_rx.recv())
        .await
        .expect("monitor did not converge")
        .unwrap();
    assert_eq!(client.fetched().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn processor_failures_reach_the_error_channel() {
    let client = StubClient::new(&[("http://www.example.com/", "item doomed")]);
    let scheduler = Arc::new(Scheduler::new());

    scheduler
        .start(
            channel_args(),
            PoolArgs::new(2, 2),
            0,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![failing_processor()],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();

    let error_rx = scheduler.error_chan().expect("error channel available");
    let error = timeout(CONVERGE_LIMIT, error_rx.recv())
        .await
        .expect("no error arrived")
        .unwrap();
    assert_eq!(error.kind(), ErrorKind::ItemProcessor);

    // the failing item still counts as fully processed
    let deadline = tokio::time::Instant::now() + CONVERGE_LIMIT;
    loop {
        let snapshot = *scheduler.summary("  ").unwrap().item_pipeline();
        if snapshot.processed == 1 {
            assert_eq!(snapshot.sent, 1);
            assert_eq!(snapshot.accepted, 1);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "pipeline counters never settled: {snapshot}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(scheduler.stop());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn downloader_failures_reach_the_error_channel() {
    // the seed page is missing on purpose
    let client = StubClient::new(&[]);
    let scheduler = Arc::new(Scheduler::new());

    scheduler
        .start(
            channel_args(),
            PoolArgs::new(2, 2),
            0,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![discarding_processor()],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();

    let error_rx = scheduler.error_chan().expect("error channel available");
    let error = timeout(CONVERGE_LIMIT, error_rx.recv())
        .await
        .expect("no error arrived")
        .unwrap();
    assert_eq!(error.kind(), ErrorKind::Downloader);
    assert!(scheduler.stop());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_seals_the_pipeline() {
    let client = StubClient::new(&[("http://www.example.com/", "nothing")]);
    let scheduler = Arc::new(Scheduler::new());

    scheduler
        .start(
            channel_args(),
            PoolArgs::new(2, 2),
            0,
            StubClient::factory(&client),
            vec![line_parser()],
            vec![discarding_processor()],
            Request::new(Url::parse("http://www.example.com/").unwrap()),
        )
        .unwrap();

    assert!(scheduler.stop());
    assert!(!scheduler.stop());

    assert!(scheduler.error_chan().is_none());
    let summary = scheduler.summary("  ").unwrap();
    assert_eq!(summary.run_state(), RunState::Stopped);
    assert_eq!(
        summary.chanman().status,
        trawler::ChannelManagerStatus::Closed
    );
    assert_eq!(
        summary.req_cache().status,
        trawler::scheduler::CacheStatus::Closed
    );
    assert!(summary.stop_sign().starts_with("signed: true"));
}

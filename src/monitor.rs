//! # Monitor Module
//!
//! Observes a running scheduler from the outside: drains the error queue,
//! logs summary changes, and watches for sustained idleness. Because
//! `Scheduler::stop` does not wait for dispatchers, the monitor is the
//! component that decides when a crawl has converged and, with `auto_stop`
//! set, stops it.

use crate::scheduler::{SchedSummary, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info};

/// Floors below which monitoring would burn cycles without telling the
/// idle checker anything new.
const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MIN_IDLE_COUNT: usize = 1000;

/// Monitoring parameters.
#[derive(Debug, Clone, Copy)]
pub struct MonitorArgs {
    /// Poll interval of the idle checker and the summary logger.
    pub interval: Duration,
    /// Consecutive idle observations required before the crawl counts as
    /// converged.
    pub max_idle_count: usize,
    /// Whether to invoke `Scheduler::stop` once converged.
    pub auto_stop: bool,
    /// Whether summary records include the full URL listing.
    pub detail_summary: bool,
}

impl Default for MonitorArgs {
    fn default() -> Self {
        MonitorArgs {
            interval: Duration::from_millis(10),
            max_idle_count: MIN_IDLE_COUNT,
            auto_stop: true,
            detail_summary: false,
        }
    }
}

/// Starts the three monitor tasks and returns the channel on which the
/// idle checker emits its final check count when it exits.
///
/// All three tasks first wait until the scheduler is observed running.
pub fn monitoring(scheduler: Arc<Scheduler>, args: MonitorArgs) -> kanal::AsyncReceiver<u64> {
    let interval = args.interval.max(MIN_INTERVAL);
    let max_idle_count = args.max_idle_count.max(MIN_IDLE_COUNT);

    let (stop_tx, stop_rx) = watch::channel(false);
    let (count_tx, count_rx) = kanal::bounded_async::<u64>(2);

    spawn_error_drain(Arc::clone(&scheduler), stop_rx.clone());
    spawn_summary_logger(
        Arc::clone(&scheduler),
        interval,
        args.detail_summary,
        stop_rx,
    );
    spawn_idle_checker(
        scheduler,
        interval,
        max_idle_count,
        args.auto_stop,
        count_tx,
        stop_tx,
    );
    count_rx
}

async fn wait_for_scheduler_start(scheduler: &Scheduler) {
    while !scheduler.running() {
        tokio::time::sleep(MIN_INTERVAL).await;
    }
}

// Receives and reports errors until the error queue becomes unavailable or
// the idle checker notifies a stop.
fn spawn_error_drain(scheduler: Arc<Scheduler>, mut stop_rx: watch::Receiver<bool>) {
    tokio::spawn(async move {
        wait_for_scheduler_start(&scheduler).await;
        let Some(error_rx) = scheduler.error_chan() else {
            return;
        };
        loop {
            tokio::select! {
                _ = stop_rx.changed() => return,
                received = error_rx.recv() => match received {
                    Ok(err) => error!("error received from the error channel: {}", err),
                    Err(_) => return,
                },
            }
        }
    });
}

// Records the scheduler summary whenever it differs from the previously
// recorded one. Ticks at the monitor interval rather than spinning.
fn spawn_summary_logger(
    scheduler: Arc<Scheduler>,
    interval: Duration,
    detail: bool,
    mut stop_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        wait_for_scheduler_start(&scheduler).await;
        let start_time = Instant::now();
        let mut prev_summary: Option<SchedSummary> = None;
        let mut prev_task_count = 0usize;
        let mut record_count: u64 = 1;
        loop {
            tokio::select! {
                _ = stop_rx.changed() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            let task_count = tokio::runtime::Handle::current()
                .metrics()
                .num_alive_tasks();
            let Some(summary) = scheduler.summary("    ") else {
                continue;
            };
            let changed = task_count != prev_task_count
                || prev_summary
                    .as_ref()
                    .map_or(true, |prev| !prev.same(&summary));
            if changed {
                let rendering = if detail {
                    summary.detail()
                } else {
                    summary.to_string()
                };
                info!(
                    "monitor record [{}], alive tasks: {}, elapsed: {:?}\n{}",
                    record_count,
                    task_count,
                    start_time.elapsed(),
                    rendering
                );
                prev_task_count = task_count;
                prev_summary = Some(summary);
                record_count += 1;
            }
        }
    });
}

// Counts consecutive idle observations; once the threshold holds up under a
// re-check, optionally stops the scheduler, then notifies the sibling tasks
// and reports the number of checks performed.
fn spawn_idle_checker(
    scheduler: Arc<Scheduler>,
    interval: Duration,
    max_idle_count: usize,
    auto_stop: bool,
    count_tx: kanal::AsyncSender<u64>,
    stop_tx: watch::Sender<bool>,
) {
    tokio::spawn(async move {
        let mut check_count: u64 = 0;
        wait_for_scheduler_start(&scheduler).await;
        let mut idle_count = 0usize;
        let mut first_idle = Instant::now();
        loop {
            if scheduler.idle() {
                idle_count += 1;
                if idle_count == 1 {
                    first_idle = Instant::now();
                }
                if idle_count >= max_idle_count {
                    info!(
                        "the scheduler has been idle for about {:?}, considering a stop",
                        first_idle.elapsed()
                    );
                    if scheduler.idle() {
                        if auto_stop {
                            let outcome = if scheduler.stop() { "success" } else { "failing" };
                            info!("stop scheduler...{}", outcome);
                        }
                        break;
                    }
                    idle_count = 0;
                }
            } else {
                idle_count = 0;
            }
            check_count += 1;
            tokio::time::sleep(interval).await;
        }
        let _ = stop_tx.send(true);
        let _ = count_tx.send(check_count).await;
    });
}

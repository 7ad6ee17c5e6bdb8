//! The item pipeline: an ordered chain of user-supplied item processors
//! with atomic throughput counters.

use crate::data::Item;
use anyhow::anyhow;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A user-supplied item processor.
///
/// Returns the transformed item, or `None` to pass the input through
/// unchanged, plus an optional error.
pub type ProcessItem =
    Arc<dyn Fn(&Item) -> (Option<Item>, Option<anyhow::Error>) + Send + Sync>;

/// Counter snapshot of the pipeline, for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub fail_fast: bool,
    pub processors: usize,
    pub sent: u64,
    pub accepted: u64,
    pub processed: u64,
    pub processing_number: u64,
}

impl fmt::Display for PipelineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fail_fast: {}, processors: {}, sent: {}, accepted: {}, processed: {}, processing: {}",
            self.fail_fast,
            self.processors,
            self.sent,
            self.accepted,
            self.processed,
            self.processing_number
        )
    }
}

// Decrements the in-flight gauge on every exit path out of `send`.
struct InFlightGuard<'a>(&'a AtomicU64);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The ordered processor chain.
///
/// `sent >= accepted >= processed` holds at every observation; `processed`
/// advances exactly once per sent item, including items whose processors
/// failed or panicked.
pub struct ItemPipeline {
    processors: Vec<ProcessItem>,
    fail_fast: AtomicBool,
    sent: AtomicU64,
    accepted: AtomicU64,
    processed: AtomicU64,
    processing_number: AtomicU64,
}

impl ItemPipeline {
    pub fn new(processors: Vec<ProcessItem>) -> Self {
        ItemPipeline {
            processors,
            fail_fast: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            processing_number: AtomicU64::new(0),
        }
    }

    /// Whether processing short-circuits on the first processor error.
    pub fn fail_fast(&self) -> bool {
        self.fail_fast.load(Ordering::SeqCst)
    }

    pub fn set_fail_fast(&self, fail_fast: bool) {
        self.fail_fast.store(fail_fast, Ordering::SeqCst);
    }

    /// Sends one item through the processor chain and collects the errors.
    ///
    /// Each processor's non-`None` result becomes the next processor's
    /// input. A panicking processor is treated as a failing one.
    pub fn send(&self, item: Item) -> Vec<anyhow::Error> {
        self.processing_number.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.processing_number);
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.accepted.fetch_add(1, Ordering::SeqCst);

        let mut errors = Vec::new();
        let mut current = item;
        for processor in &self.processors {
            let (next, error) = match panic::catch_unwind(AssertUnwindSafe(|| processor(&current)))
            {
                Ok(outcome) => outcome,
                Err(_) => (None, Some(anyhow!("an item processor panicked"))),
            };
            let failed = error.is_some();
            if let Some(error) = error {
                errors.push(error);
            }
            if failed && self.fail_fast() {
                break;
            }
            if let Some(next) = next {
                current = next;
            }
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        errors
    }

    /// The `[sent, accepted, processed]` counters.
    pub fn counts(&self) -> [u64; 3] {
        [
            self.sent.load(Ordering::SeqCst),
            self.accepted.load(Ordering::SeqCst),
            self.processed.load(Ordering::SeqCst),
        ]
    }

    /// The number of items currently inside `send`.
    pub fn processing_number(&self) -> u64 {
        self.processing_number.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let [sent, accepted, processed] = self.counts();
        PipelineSnapshot {
            fail_fast: self.fail_fast(),
            processors: self.processors.len(),
            sent,
            accepted,
            processed,
            processing_number: self.processing_number(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tagging(tag: &'static str) -> ProcessItem {
        Arc::new(move |item| {
            let mut next = item.clone();
            next.insert(tag, json!(true));
            (Some(next), None)
        })
    }

    fn failing(message: &'static str) -> ProcessItem {
        Arc::new(move |_| (None, Some(anyhow!(message))))
    }

    fn pass_through() -> ProcessItem {
        Arc::new(|_| (None, None))
    }

    #[test]
    fn processors_chain_in_order() {
        let pipeline = ItemPipeline::new(vec![tagging("first"), tagging("second")]);
        let errors = pipeline.send(Item::new());
        assert!(errors.is_empty());
        assert_eq!(pipeline.counts(), [1, 1, 1]);
    }

    #[test]
    fn a_none_result_passes_the_item_through() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let recorder: ProcessItem = {
            let seen = Arc::clone(&seen);
            Arc::new(move |item| {
                seen.lock().push(item.len());
                (None, None)
            })
        };
        let pipeline = ItemPipeline::new(vec![tagging("a"), pass_through(), recorder]);
        pipeline.send(Item::new());
        // the tag added by the first processor survives the pass-through
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn fail_fast_short_circuits_but_still_counts_processed() {
        let pipeline = ItemPipeline::new(vec![failing("boom"), tagging("unreached")]);
        pipeline.set_fail_fast(true);
        let errors = pipeline.send(Item::new());
        assert_eq!(errors.len(), 1);
        assert_eq!(pipeline.counts(), [1, 1, 1]);
    }

    #[test]
    fn without_fail_fast_every_processor_runs() {
        let pipeline = ItemPipeline::new(vec![failing("one"), failing("two")]);
        let errors = pipeline.send(Item::new());
        assert_eq!(errors.len(), 2);
        assert_eq!(pipeline.counts(), [1, 1, 1]);
    }

    #[test]
    fn a_panicking_processor_becomes_an_error() {
        let panicking: ProcessItem = Arc::new(|_| panic!("bad processor"));
        let pipeline = ItemPipeline::new(vec![panicking, tagging("after")]);
        let errors = pipeline.send(Item::new());
        assert_eq!(errors.len(), 1);
        assert_eq!(pipeline.counts(), [1, 1, 1]);
        assert_eq!(pipeline.processing_number(), 0);
    }

    #[test]
    fn counters_stay_monotonic_across_sends() {
        let pipeline = ItemPipeline::new(vec![pass_through()]);
        for _ in 0..5 {
            pipeline.send(Item::new());
            let [sent, accepted, processed] = pipeline.counts();
            assert!(sent >= accepted && accepted >= processed);
        }
        assert_eq!(pipeline.counts(), [5, 5, 5]);
    }
}

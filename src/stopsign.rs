//! One-shot broadcast stop flag with per-party acknowledgement counters.
//!
//! Every stage guards its outbound channel writes on the sign; when the sign
//! is set the write is dropped and the stage records the deal under its own
//! code, so a summary can show which parties cooperated with the stop.

use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct SignState {
    signed: bool,
    deal_counts: BTreeMap<String, u32>,
}

/// A cooperative cancellation flag.
///
/// The flag and the acknowledgement counters share one reader-writer lock;
/// all reads take the read lock, so a `sign` on one thread is immediately
/// visible to `signed` on another.
#[derive(Debug, Default)]
pub struct StopSign {
    state: RwLock<SignState>,
}

impl StopSign {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sign. Returns false if it was already set.
    pub fn sign(&self) -> bool {
        let mut state = self.state.write();
        if state.signed {
            return false;
        }
        state.signed = true;
        true
    }

    pub fn signed(&self) -> bool {
        self.state.read().signed
    }

    /// Withdraws the sign and clears all acknowledgement records.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.signed = false;
        state.deal_counts.clear();
    }

    /// Records that the party identified by `code` observed the sign and
    /// dropped its work. A no-op while the sign is not set.
    pub fn deal(&self, code: &str) {
        let mut state = self.state.write();
        if !state.signed {
            return;
        }
        *state.deal_counts.entry(code.to_string()).or_insert(0) += 1;
    }

    pub fn deal_count(&self, code: &str) -> u32 {
        self.state
            .read()
            .deal_counts
            .get(code)
            .copied()
            .unwrap_or(0)
    }

    pub fn deal_total(&self) -> u32 {
        self.state.read().deal_counts.values().sum()
    }

    pub fn summary(&self) -> String {
        let state = self.state.read();
        if state.signed {
            let counts: Vec<String> = state
                .deal_counts
                .iter()
                .map(|(code, count)| format!("{code}: {count}"))
                .collect();
            format!("signed: true, deal_counts: {{{}}}", counts.join(", "))
        } else {
            "signed: false".to_string()
        }
    }
}

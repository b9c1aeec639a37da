// src/failure_counters.rs

//! Per-url failure counting.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

/// Tracks how many times each node url has recently failed. Counts never
/// decrement except via [`FailureCounters::reset`]; there is no eviction,
/// the set of urls is bounded by cluster size.
#[derive(Default)]
pub struct FailureCounters {
    counts: DashMap<String, AtomicU32>,
}

impl FailureCounters {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
        }
    }

    pub fn get(&self, url: &str) -> u32 {
        self.counts
            .get(url)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn increment(&self, url: &str) -> u32 {
        let entry = self
            .counts
            .entry(url.to_string())
            .or_insert_with(|| AtomicU32::new(0));
        entry.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset(&self, url: &str) {
        if let Some(entry) = self.counts.get(url) {
            entry.store(0, Ordering::Relaxed);
        }
    }

    /// A node may fail once before being skipped by the router.
    pub fn eligible(&self, url: &str) -> bool {
        self.get(url) <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_url_is_eligible() {
        let fc = FailureCounters::new();
        assert_eq!(fc.get("http://a"), 0);
        assert!(fc.eligible("http://a"));
    }

    #[test]
    fn increment_then_reset() {
        let fc = FailureCounters::new();
        fc.increment("http://a");
        assert!(fc.eligible("http://a"));
        fc.increment("http://a");
        assert!(!fc.eligible("http://a"));
        fc.reset("http://a");
        assert_eq!(fc.get("http://a"), 0);
        assert!(fc.eligible("http://a"));
    }
}

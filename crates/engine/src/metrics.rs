//! Engine-level counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for query-side behavior.
#[derive(Debug, Default)]
pub struct EngineMetrics {
	cache_hits: AtomicU64,
	cache_misses: AtomicU64,
	evaluations: AtomicU64,
	evaluation_failures: AtomicU64,
}

impl EngineMetrics {
	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_miss(&self) {
		self.cache_misses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_evaluation(&self) {
		self.evaluations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_evaluation_failure(&self) {
		self.evaluation_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> EngineMetricsSnapshot {
		EngineMetricsSnapshot {
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			cache_misses: self.cache_misses.load(Ordering::Relaxed),
			evaluations: self.evaluations.load(Ordering::Relaxed),
			evaluation_failures: self.evaluation_failures.load(Ordering::Relaxed),
		}
	}
}

/// Point-in-time view of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineMetricsSnapshot {
	pub cache_hits: u64,
	pub cache_misses: u64,
	/// Completed rule-list evaluations (cache misses that ran to the end).
	pub evaluations: u64,
	/// Evaluations that panicked and disabled their file.
	pub evaluation_failures: u64,
}

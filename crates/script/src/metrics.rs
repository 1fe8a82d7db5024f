//! Coordinator counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for coordinator behavior; cheap enough to keep on always.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
	entry_hits: AtomicU64,
	compiles_started: AtomicU64,
	compiles_succeeded: AtomicU64,
	compiles_failed: AtomicU64,
	coalesced_waits: AtomicU64,
	queue_rejections: AtomicU64,
	fatal_stops: AtomicU64,
}

macro_rules! bump {
	($($name:ident => $field:ident),* $(,)?) => {
		$(pub(crate) fn $name(&self) {
			self.$field.fetch_add(1, Ordering::Relaxed);
		})*
	};
}

impl CoordinatorMetrics {
	bump! {
		record_entry_hit => entry_hits,
		record_compile_started => compiles_started,
		record_compile_succeeded => compiles_succeeded,
		record_compile_failed => compiles_failed,
		record_coalesced_wait => coalesced_waits,
		record_queue_rejection => queue_rejections,
		record_fatal_stop => fatal_stops,
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			entry_hits: self.entry_hits.load(Ordering::Relaxed),
			compiles_started: self.compiles_started.load(Ordering::Relaxed),
			compiles_succeeded: self.compiles_succeeded.load(Ordering::Relaxed),
			compiles_failed: self.compiles_failed.load(Ordering::Relaxed),
			coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
			queue_rejections: self.queue_rejections.load(Ordering::Relaxed),
			fatal_stops: self.fatal_stops.load(Ordering::Relaxed),
		}
	}
}

/// Point-in-time view of [`CoordinatorMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
	/// `get_or_compile` calls answered synchronously from a fresh entry.
	pub entry_hits: u64,
	pub compiles_started: u64,
	pub compiles_succeeded: u64,
	pub compiles_failed: u64,
	/// Callers that joined an already in-flight compilation.
	pub coalesced_waits: u64,
	/// Submissions dropped because the compile queue was full.
	pub queue_rejections: u64,
	pub fatal_stops: u64,
}

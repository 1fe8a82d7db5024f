//! The query orchestrator.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use lore_cache::{ModificationClock, QueryDescriptor};
use lore_pointcut::{Action, CompiledContributor, MatchContext, MemberSpec, QueryFacts, SubjectRef};
use lore_script::{ActivationRegistry, CompilationCoordinator, CoordinatorConfig, ErrorSink, FileKey, ScriptCompiler, TracingSink};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;
use crate::callbacks::CallbackTable;
use crate::holder::{ContributionHolder, FileContributions};
use crate::index::ScriptIndex;
use crate::metrics::{EngineMetrics, EngineMetricsSnapshot};

/// Engine construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineConfig {
	pub coordinator: CoordinatorConfig,
	/// When false, queries never park on in-flight compilations: the file is
	/// treated as temporarily absent and picked up by a later query.
	pub non_blocking: bool,
}

/// Views the query through the recording accessors, so the factors a pointcut
/// actually dereferences end up in the query's touched set.
struct RecordingFacts<'a> {
	query: &'a QueryDescriptor,
}

impl QueryFacts for RecordingFacts<'_> {
	fn current_type(&self) -> Option<SubjectRef> {
		Some(Arc::clone(self.query.subject_type()))
	}

	fn containing_unit(&self) -> Option<SubjectRef> {
		Some(Arc::clone(self.query.containing_unit()))
	}
}

enum Evaluation {
	Complete(Vec<MemberSpec>),
	Cancelled,
	Failed(String),
}

/// Orchestrates contributor scripts for member-augmentation queries.
///
/// `contribute` never raises: per-script failures disable the script and are
/// reported to the error sink, the query proceeds with the remaining files.
pub struct DslEngine {
	coordinator: CompilationCoordinator,
	activation: Arc<ActivationRegistry>,
	index: ScriptIndex,
	callbacks: CallbackTable,
	clock: Arc<ModificationClock>,
	sink: Arc<dyn ErrorSink>,
	non_blocking: bool,
	metrics: EngineMetrics,
}

impl DslEngine {
	/// Engine with a fresh activation registry and the tracing error sink.
	pub fn new(compiler: Arc<dyn ScriptCompiler>, config: EngineConfig) -> Result<Self> {
		Self::with_parts(compiler, Arc::new(ActivationRegistry::new()), Arc::new(TracingSink), config)
	}

	/// Engine over host-supplied activation state and error sink.
	pub fn with_parts(
		compiler: Arc<dyn ScriptCompiler>,
		activation: Arc<ActivationRegistry>,
		sink: Arc<dyn ErrorSink>,
		config: EngineConfig,
	) -> Result<Self> {
		let coordinator = CompilationCoordinator::new(compiler, Arc::clone(&activation), Arc::clone(&sink), config.coordinator)?;
		let clock = Arc::new(ModificationClock::new());
		Ok(Self {
			coordinator,
			activation,
			index: ScriptIndex::new(Arc::clone(&clock)),
			callbacks: CallbackTable::new(),
			clock,
			sink,
			non_blocking: config.non_blocking,
			metrics: EngineMetrics::default(),
		})
	}

	pub fn index(&self) -> &ScriptIndex {
		&self.index
	}

	pub fn callbacks(&self) -> &CallbackTable {
		&self.callbacks
	}

	pub fn activation(&self) -> &ActivationRegistry {
		&self.activation
	}

	/// The content-modification clock; hosts advance it for modifications
	/// outside the engine's own view (it already advances on script changes).
	pub fn clock(&self) -> &Arc<ModificationClock> {
		&self.clock
	}

	/// Content-change notification for one script file: marks it stale,
	/// drops its compiled object and caches.
	pub fn on_content_changed(&self, file: &FileKey) {
		if self.index.bump(file) {
			self.coordinator.invalidate(file);
			self.clock.advance();
			debug!(file = %file, "engine.content_changed");
		}
	}

	/// Removes a script from the discovery set entirely.
	pub fn remove_script(&self, file: &FileKey) {
		self.index.remove(file);
		self.coordinator.remove(file);
		self.clock.advance();
	}

	/// Explicit external reactivation of a disabled script.
	pub fn reactivate(&self, file: &FileKey) {
		self.activation.reactivate(file);
	}

	pub fn metrics(&self) -> EngineMetricsSnapshot {
		self.metrics.snapshot()
	}

	pub fn coordinator_metrics(&self) -> lore_script::MetricsSnapshot {
		self.coordinator.metrics()
	}

	/// Runs every applicable contributor against `query` and merges the
	/// origin-tagged results.
	pub fn contribute(&self, query: &QueryDescriptor, cancel: &CancellationToken) -> ContributionHolder {
		let mut holder = ContributionHolder::default();
		if self.coordinator.stopped() {
			return holder;
		}

		for file in self.index.files() {
			if cancel.is_cancelled() {
				break;
			}
			if !self.activation.is_eligible(&file) {
				continue;
			}
			let Some((source, version, cache)) = self.index.snapshot(&file) else {
				continue;
			};

			let outcome = if self.non_blocking {
				self.coordinator.try_get(&file, version, move || source())
			} else {
				self.coordinator.get_or_compile(&file, version, move || source())
			};
			let Some(contributor) = outcome.ready() else {
				continue;
			};

			if let Some(part) = cache.lookup(query) {
				self.metrics.record_cache_hit();
				holder.push(part);
				continue;
			}
			self.metrics.record_cache_miss();

			match self.evaluate_file(&contributor, query, cancel) {
				Evaluation::Complete(members) => {
					self.metrics.record_evaluation();
					let part = Arc::new(FileContributions::new(file.clone(), members));
					cache.store(query, Arc::clone(&part));
					holder.push(part);
				}
				Evaluation::Cancelled => break,
				Evaluation::Failed(message) => {
					self.metrics.record_evaluation_failure();
					if self.activation.disable(&file, &message) {
						self.sink.report_script_error(&file, &message);
					}
				}
			}
		}
		holder
	}

	/// Evaluates one contributor's rules in declaration order; all matching
	/// rules fire. Panics are caught here, at file granularity.
	fn evaluate_file(&self, contributor: &CompiledContributor, query: &QueryDescriptor, cancel: &CancellationToken) -> Evaluation {
		// Unknown callback ids are a load-time diagnostic for this engine.
		for (index, (_, action)) in contributor.rules().iter().enumerate() {
			if let Action::Callback(id) = action
				&& !self.callbacks.contains(*id)
			{
				return Evaluation::Failed(format!("rule {index}: unregistered callback {id:?}"));
			}
		}

		query.reset_factors();
		if contributor.rules().is_empty() {
			return Evaluation::Complete(Vec::new());
		}

		let facts = RecordingFacts { query };
		let result = panic::catch_unwind(AssertUnwindSafe(|| {
			let mut ctx = MatchContext::new(&facts);
			let place = Arc::clone(query.place());
			let mut members = Vec::new();
			for (pointcut, action) in contributor.rules() {
				if cancel.is_cancelled() {
					return None;
				}
				if pointcut.evaluate(&place, &mut ctx).is_some() {
					match action {
						Action::AddMember(spec) => members.push(spec.clone()),
						Action::Callback(id) => members.extend(self.callbacks.invoke(*id, &ctx)),
					}
				}
			}
			Some(members)
		}));

		match result {
			Ok(Some(members)) => Evaluation::Complete(members),
			Ok(None) => Evaluation::Cancelled,
			Err(payload) => Evaluation::Failed(panic_message(&payload)),
		}
	}
}

impl std::fmt::Debug for DslEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DslEngine")
			.field("index", &self.index)
			.field("stopped", &self.coordinator.stopped())
			.finish_non_exhaustive()
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"evaluation panicked".to_string()
	}
}

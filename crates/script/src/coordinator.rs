//! Compilation coordinator: bounded worker pool plus request coalescing.
//!
//! One coarse lock guards the compiled-entry table and the in-flight waiter
//! registry together, so "check entry, else join or register" and "store
//! result, fan out" are each atomic. Compilation itself only ever runs on the
//! fixed pool; query threads park on waiter channels or carry on without the
//! file.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use lore_pointcut::CompiledContributor;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::activation::ActivationRegistry;
use crate::compiler::{CompileFailure, ErrorSink, ScriptCompiler};
use crate::metrics::{CoordinatorMetrics, MetricsSnapshot};
use crate::{FileKey, Result};

/// Sizing of the compile worker pool.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
	/// Fixed worker count, independent of request volume.
	pub workers: usize,
	/// Bound on queued compile jobs; submissions beyond it are rejected.
	pub queue_depth: usize,
}

impl Default for CoordinatorConfig {
	fn default() -> Self {
		Self { workers: 2, queue_depth: 64 }
	}
}

/// What a caller gets for one script file.
#[derive(Debug, Clone)]
pub enum CompileOutcome {
	/// Compiled and eligible; all waiters of one job see the same object.
	Ready(Arc<CompiledContributor>),
	/// A compilation is in flight and the caller chose not to block.
	Pending,
	/// Disabled, rejected, or the engine is stopped; skip this file for this
	/// query and retry on a later one.
	Unavailable,
}

impl CompileOutcome {
	pub fn ready(self) -> Option<Arc<CompiledContributor>> {
		match self {
			Self::Ready(contributor) => Some(contributor),
			_ => None,
		}
	}
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of named compile workers draining one bounded queue.
struct CompilerPool {
	queue: Option<mpsc::SyncSender<Job>>,
	workers: Vec<thread::JoinHandle<()>>,
}

impl CompilerPool {
	fn new(workers: usize, queue_depth: usize) -> Result<Self> {
		let (tx, rx) = mpsc::sync_channel::<Job>(queue_depth.max(1));
		let rx = Arc::new(Mutex::new(rx));
		let workers = (0..workers.max(1))
			.map(|i| {
				let rx = Arc::clone(&rx);
				thread::Builder::new().name(format!("lore-compile-{i}")).spawn(move || {
					loop {
						// Holding the lock across recv serializes dequeues
						// only; jobs run after it is released.
						let job = { rx.lock().recv() };
						match job {
							Ok(job) => job(),
							Err(_) => break,
						}
					}
				})
			})
			.collect::<std::io::Result<Vec<_>>>()?;
		Ok(Self { queue: Some(tx), workers })
	}

	/// Submits without blocking; false when the queue is full or closed.
	fn submit(&self, job: Job) -> bool {
		match &self.queue {
			Some(queue) => queue.try_send(job).is_ok(),
			None => false,
		}
	}
}

impl Drop for CompilerPool {
	fn drop(&mut self) {
		self.queue.take();
		for worker in self.workers.drain(..) {
			let _ = worker.join();
		}
	}
}

#[derive(Debug)]
struct EntryState {
	version: u64,
	compiled: Arc<CompiledContributor>,
}

struct Inflight {
	version: u64,
	/// Result must not be stored when an invalidation raced the compile.
	stale: bool,
	waiters: Vec<mpsc::Sender<CompileOutcome>>,
}

#[derive(Default)]
struct State {
	entries: FxHashMap<FileKey, EntryState>,
	inflight: FxHashMap<FileKey, Inflight>,
}

struct Inner {
	compiler: Arc<dyn ScriptCompiler>,
	activation: Arc<ActivationRegistry>,
	sink: Arc<dyn ErrorSink>,
	state: Mutex<State>,
	stopped: AtomicBool,
	fatal_reported: AtomicBool,
	metrics: CoordinatorMetrics,
}

/// Turns `(file key, source)` into a cached compiled contributor with at most
/// one compilation in flight per file key.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct CompilationCoordinator {
	inner: Arc<Inner>,
	pool: Arc<CompilerPool>,
}

impl CompilationCoordinator {
	pub fn new(compiler: Arc<dyn ScriptCompiler>, activation: Arc<ActivationRegistry>, sink: Arc<dyn ErrorSink>, config: CoordinatorConfig) -> Result<Self> {
		Ok(Self {
			inner: Arc::new(Inner {
				compiler,
				activation,
				sink,
				state: Mutex::new(State::default()),
				stopped: AtomicBool::new(false),
				fatal_reported: AtomicBool::new(false),
				metrics: CoordinatorMetrics::default(),
			}),
			pool: Arc::new(CompilerPool::new(config.workers, config.queue_depth)?),
		})
	}

	/// Blocking variant: parks on a waiter channel until the in-flight
	/// compilation (ours or another caller's) completes.
	///
	/// The source supplier runs on the compile worker; a read failure is a
	/// script-scoped error like any other compile failure.
	pub fn get_or_compile(&self, file: &FileKey, version: u64, source: impl FnOnce() -> std::io::Result<String> + Send + 'static) -> CompileOutcome {
		self.request(file, version, source, true)
	}

	/// Non-blocking variant: returns [`CompileOutcome::Pending`] while a
	/// compilation is in flight; the caller retries on a later query.
	pub fn try_get(&self, file: &FileKey, version: u64, source: impl FnOnce() -> std::io::Result<String> + Send + 'static) -> CompileOutcome {
		self.request(file, version, source, false)
	}

	fn request(&self, file: &FileKey, version: u64, source: impl FnOnce() -> std::io::Result<String> + Send + 'static, wait: bool) -> CompileOutcome {
		let inner = &self.inner;
		if inner.stopped.load(Ordering::Acquire) {
			return CompileOutcome::Unavailable;
		}
		if !inner.activation.is_eligible(file) {
			return CompileOutcome::Unavailable;
		}

		let rx = {
			let mut state = inner.state.lock();

			if let Some(entry) = state.entries.get(file)
				&& entry.version == version
			{
				inner.metrics.record_entry_hit();
				return CompileOutcome::Ready(Arc::clone(&entry.compiled));
			}

			if let Some(inflight) = state.inflight.get_mut(file) {
				if inflight.version != version {
					// The in-flight job compiles other content; its result is
					// useless here. Mark it stale and skip this query.
					inflight.stale = true;
					return CompileOutcome::Unavailable;
				}
				inner.metrics.record_coalesced_wait();
				if !wait {
					return CompileOutcome::Pending;
				}
				let (tx, rx) = mpsc::channel();
				inflight.waiters.push(tx);
				rx
			} else {
				let (tx, rx) = mpsc::channel();
				let waiters = if wait { vec![tx] } else { Vec::new() };
				state.inflight.insert(
					file.clone(),
					Inflight {
						version,
						stale: false,
						waiters,
					},
				);

				let job_inner = Arc::clone(inner);
				let job_file = file.clone();
				let job: Job = Box::new(move || run_compile(&job_inner, job_file, version, source));
				if !self.pool.submit(job) {
					state.inflight.remove(file);
					inner.metrics.record_queue_rejection();
					warn!(file = %file, "compile.queue_full");
					return CompileOutcome::Unavailable;
				}
				inner.metrics.record_compile_started();
				if !wait {
					return CompileOutcome::Pending;
				}
				rx
			}
		};

		// A dropped sender without a message is a coordination defect; degrade
		// to Unavailable rather than wedging the query.
		rx.recv().unwrap_or(CompileOutcome::Unavailable)
	}

	/// Content-change notification: drops the compiled entry, marks the file
	/// stale, and poisons any in-flight compilation of the old content.
	pub fn invalidate(&self, file: &FileKey) {
		let mut state = self.inner.state.lock();
		state.entries.remove(file);
		if let Some(inflight) = state.inflight.get_mut(file) {
			inflight.stale = true;
		}
		self.inner.activation.mark_modified(file);
		debug!(file = %file, "compile.invalidate");
	}

	/// Removes a file that left the discovery set.
	pub fn remove(&self, file: &FileKey) {
		let mut state = self.inner.state.lock();
		state.entries.remove(file);
		if let Some(inflight) = state.inflight.get_mut(file) {
			inflight.stale = true;
		}
		self.inner.activation.forget(file);
	}

	/// Whether the process-wide fatal-stop flag is set.
	pub fn stopped(&self) -> bool {
		self.inner.stopped.load(Ordering::Acquire)
	}

	pub fn metrics(&self) -> MetricsSnapshot {
		self.inner.metrics.snapshot()
	}
}

impl std::fmt::Debug for CompilationCoordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CompilationCoordinator").field("stopped", &self.stopped()).finish_non_exhaustive()
	}
}

/// Runs on a pool worker: compiles, records the outcome, fans out to waiters.
fn run_compile(inner: &Arc<Inner>, file: FileKey, version: u64, source: impl FnOnce() -> std::io::Result<String>) {
	if inner.stopped.load(Ordering::Acquire) {
		finish(inner, &file, CompileOutcome::Unavailable);
		return;
	}

	debug!(file = %file, version, "compile.start");
	let result = match source() {
		Ok(text) => inner.compiler.compile(&text, file.as_str()),
		Err(e) => Err(CompileFailure::Script(format!("cannot read source: {e}"))),
	};
	let mut script_error = None;
	let outcome = match result {
		Ok(contributor) => {
			inner.metrics.record_compile_succeeded();
			debug!(file = %file, rules = contributor.rules().len(), "compile.done");
			CompileOutcome::Ready(Arc::new(contributor))
		}
		Err(CompileFailure::Script(message)) => {
			inner.metrics.record_compile_failed();
			warn!(file = %file, error = %message, "compile.failed");
			script_error = Some(message);
			CompileOutcome::Unavailable
		}
		Err(CompileFailure::Fatal(message)) => {
			inner.metrics.record_fatal_stop();
			inner.stopped.store(true, Ordering::Release);
			if !inner.fatal_reported.swap(true, Ordering::AcqRel) {
				inner.sink.report_fatal_stop(&message);
			}
			error!(file = %file, error = %message, "compile.fatal_stop");
			CompileOutcome::Unavailable
		}
	};

	// Storing the entry, acting on the activation status, and removing the
	// in-flight record happen under one lock: a caller arriving now either
	// joins the waiter list before the removal or sees the completed entry
	// after it, never neither. The freshness check guards both directions: a
	// stale result is not stored, and a stale failure does not disable the
	// file, whose edited content still compiles on the next attempt.
	let (waiters, report) = {
		let mut state = inner.state.lock();
		let fresh = state.inflight.get(&file).is_some_and(|inflight| !inflight.stale && inflight.version == version);
		let mut report = None;
		if fresh {
			if let CompileOutcome::Ready(contributor) = &outcome {
				state.entries.insert(
					file.clone(),
					EntryState {
						version,
						compiled: Arc::clone(contributor),
					},
				);
				inner.activation.mark_active(&file);
			} else if let Some(message) = script_error
				&& inner.activation.disable(&file, message.as_str())
			{
				report = Some(message);
			}
		}
		let waiters = state.inflight.remove(&file).map(|inflight| inflight.waiters).unwrap_or_default();
		(waiters, report)
	};
	if let Some(message) = report {
		inner.sink.report_script_error(&file, &message);
	}
	for waiter in waiters {
		let _ = waiter.send(outcome.clone());
	}
}

fn finish(inner: &Arc<Inner>, file: &FileKey, outcome: CompileOutcome) {
	let waiters = {
		let mut state = inner.state.lock();
		state.inflight.remove(file).map(|inflight| inflight.waiters).unwrap_or_default()
	};
	for waiter in waiters {
		let _ = waiter.send(outcome.clone());
	}
}

//! Shared fixtures: a directive-based test compiler and a mock symbol model.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lore_cache::{QueryDescriptor, QueryInputs, ScopedStore};
use lore_engine::{DslEngine, EngineConfig};
use lore_pointcut::{
	Action, CallbackId, CompiledContributor, CurrentType, MatchContext, MatchList, MemberSpec, Pointcut, PointcutRef, Rule, Subject, SubjectId,
	SubjectKind, SubjectRef, SubtypePointcut,
};
use lore_script::{CompileFailure, ErrorSink, FileKey, ScriptCompiler};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Mock symbol-model value with explicit identity.
#[derive(Debug)]
pub struct Node {
	pub id: u64,
	pub kind: SubjectKind,
	pub name: String,
	pub supertypes: Vec<String>,
	pub enclosing: Option<SubjectRef>,
}

impl Subject for Node {
	fn id(&self) -> SubjectId {
		SubjectId::from_raw(self.id)
	}

	fn kind(&self) -> SubjectKind {
		self.kind
	}

	fn name(&self) -> Option<&str> {
		Some(&self.name)
	}

	fn is_subtype_of(&self, type_name: &str) -> bool {
		self.supertypes.iter().any(|s| s == type_name)
	}

	fn enclosing(&self) -> Option<SubjectRef> {
		self.enclosing.clone()
	}
}

pub fn type_subject(id: u64, name: &str, supertypes: &[&str]) -> SubjectRef {
	Arc::new(Node {
		id,
		kind: SubjectKind::Type,
		name: name.to_string(),
		supertypes: supertypes.iter().map(|s| s.to_string()).collect(),
		enclosing: None,
	})
}

pub fn place_subject(id: u64) -> SubjectRef {
	Arc::new(Node {
		id,
		kind: SubjectKind::Expression,
		name: "call".to_string(),
		supertypes: Vec::new(),
		enclosing: None,
	})
}

pub fn unit_subject(id: u64) -> SubjectRef {
	Arc::new(Node {
		id,
		kind: SubjectKind::Unit,
		name: "unit".to_string(),
		supertypes: Vec::new(),
		enclosing: None,
	})
}

/// Query builder over the mock model.
pub struct QueryBuilder {
	place: SubjectRef,
	subject_type: SubjectRef,
	unit: SubjectRef,
	type_store: Option<Arc<ScopedStore>>,
}

impl QueryBuilder {
	pub fn new(place_id: u64, subject_type: &SubjectRef) -> Self {
		Self {
			place: place_subject(place_id),
			subject_type: Arc::clone(subject_type),
			unit: unit_subject(1000),
			type_store: None,
		}
	}

	pub fn unit(mut self, unit: &SubjectRef) -> Self {
		self.unit = Arc::clone(unit);
		self
	}

	pub fn type_store(mut self, store: &Arc<ScopedStore>) -> Self {
		self.type_store = Some(Arc::clone(store));
		self
	}

	pub fn build(self) -> QueryDescriptor {
		QueryDescriptor::new(QueryInputs {
			place: self.place,
			subject_type: self.subject_type,
			declaring_class: None,
			containing_unit: self.unit,
			type_store: self.type_store,
			unit_store: None,
		})
	}
}

/// Compiles a one-directive-per-line script language:
///
/// ```text
/// property NAME                 contribute NAME unconditionally
/// property NAME when-subtype T  contribute NAME when the subject type is a T
/// callback N                    fire registered callback N unconditionally
/// explode                       rule that panics when evaluated
/// fail MSG                      script-scoped compile failure
/// fatal MSG                     resource-fatal compile failure
/// ```
pub struct DirectiveCompiler {
	counts: Mutex<FxHashMap<String, usize>>,
}

impl DirectiveCompiler {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			counts: Mutex::new(FxHashMap::default()),
		})
	}

	/// Times `file` was handed to the compiler.
	pub fn count(&self, file: &str) -> usize {
		self.counts.lock().get(file).copied().unwrap_or(0)
	}
}

/// Matches any subject, contributing the subject itself.
#[derive(Debug)]
struct Always;

impl Pointcut for Always {
	fn evaluate(&self, subject: &SubjectRef, _ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		Some(vec![Arc::clone(subject)])
	}

	fn operates_on(&self, _kind: SubjectKind) -> bool {
		true
	}
}

/// Simulates a rule runtime error.
#[derive(Debug)]
struct Explode;

impl Pointcut for Explode {
	fn evaluate(&self, _subject: &SubjectRef, _ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		panic!("script exploded");
	}

	fn operates_on(&self, _kind: SubjectKind) -> bool {
		true
	}
}

impl ScriptCompiler for DirectiveCompiler {
	fn compile(&self, source: &str, file_name: &str) -> Result<CompiledContributor, CompileFailure> {
		*self.counts.lock().entry(file_name.to_string()).or_insert(0) += 1;

		let mut rules: Vec<Rule> = Vec::new();
		for line in source.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
			let words: Vec<&str> = line.split_whitespace().collect();
			match words.as_slice() {
				["property", name] => {
					rules.push((Arc::new(Always) as PointcutRef, Action::AddMember(MemberSpec::property(*name, "Object"))));
				}
				["property", name, "when-subtype", ty] => {
					let pointcut = Arc::new(CurrentType::new(Arc::new(SubtypePointcut::new(*ty)))) as PointcutRef;
					rules.push((pointcut, Action::AddMember(MemberSpec::property(*name, "Object"))));
				}
				["callback", id] => {
					let id: u32 = id.parse().map_err(|_| CompileFailure::Script(format!("bad callback id in {line:?}")))?;
					rules.push((Arc::new(Always) as PointcutRef, Action::Callback(CallbackId::from_raw(id))));
				}
				["explode"] => {
					rules.push((Arc::new(Explode) as PointcutRef, Action::AddMember(MemberSpec::property("never", "Object"))));
				}
				["fail", ..] => return Err(CompileFailure::Script(line["fail".len()..].trim().to_string())),
				["fatal", ..] => return Err(CompileFailure::Fatal(line["fatal".len()..].trim().to_string())),
				_ => return Err(CompileFailure::Script(format!("unknown directive {line:?}"))),
			}
		}
		CompiledContributor::from_rules(rules).map_err(|e| CompileFailure::Script(e.to_string()))
	}
}

/// Sink that records reports for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
	pub script_errors: Mutex<Vec<String>>,
	pub fatal_stops: AtomicUsize,
}

impl ErrorSink for RecordingSink {
	fn report_script_error(&self, file: &FileKey, _error: &str) {
		self.script_errors.lock().push(file.as_str().to_string());
	}

	fn report_fatal_stop(&self, _error: &str) {
		self.fatal_stops.fetch_add(1, Ordering::Relaxed);
	}
}

pub struct World {
	pub engine: DslEngine,
	pub compiler: Arc<DirectiveCompiler>,
	pub sink: Arc<RecordingSink>,
}

/// Engine wired to the directive compiler and a recording sink.
pub fn world() -> World {
	let compiler = DirectiveCompiler::new();
	let sink = Arc::new(RecordingSink::default());
	let engine = DslEngine::with_parts(
		Arc::clone(&compiler) as Arc<dyn ScriptCompiler>,
		Arc::new(lore_script::ActivationRegistry::new()),
		Arc::clone(&sink) as Arc<dyn ErrorSink>,
		EngineConfig::default(),
	)
	.unwrap();
	World { engine, compiler, sink }
}

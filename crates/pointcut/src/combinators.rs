//! Pointcut contract and the algebraic combinators.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::subject::{MatchList, SubjectKind, SubjectRef, intersect, union};

/// Lazily answered facts about the query under evaluation.
///
/// Host pointcuts pull query attributes through this seam instead of touching
/// the query object directly, so the caller can observe which attributes an
/// evaluation actually dereferenced.
pub trait QueryFacts {
	/// Type of the expression the query is about.
	fn current_type(&self) -> Option<SubjectRef>;

	/// Unit containing the call site, anchor of the enclosing-context chain.
	fn containing_unit(&self) -> Option<SubjectRef>;
}

/// Per-evaluation state: query facts plus the named-capture map.
///
/// Fresh for every `(script, query)` evaluation; captures recorded by
/// [`Bind`] are visible to the actions of rules that fire later in the same
/// evaluation.
pub struct MatchContext<'a> {
	facts: &'a dyn QueryFacts,
	captures: FxHashMap<Box<str>, MatchList>,
}

impl<'a> MatchContext<'a> {
	pub fn new(facts: &'a dyn QueryFacts) -> Self {
		Self {
			facts,
			captures: FxHashMap::default(),
		}
	}

	/// Type of the expression the query is about.
	pub fn current_type(&self) -> Option<SubjectRef> {
		self.facts.current_type()
	}

	/// Unit containing the call site.
	pub fn containing_unit(&self) -> Option<SubjectRef> {
		self.facts.containing_unit()
	}

	/// Results recorded under `name`, if a [`Bind`] matched.
	pub fn capture(&self, name: &str) -> Option<&MatchList> {
		self.captures.get(name)
	}

	/// Names with recorded captures, in no particular order.
	pub fn capture_names(&self) -> impl Iterator<Item = &str> {
		self.captures.keys().map(|k| k.as_ref())
	}

	fn bind(&mut self, name: &str, results: MatchList) {
		self.captures.insert(name.into(), results);
	}
}

impl fmt::Debug for MatchContext<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MatchContext").field("captures", &self.captures.len()).finish_non_exhaustive()
	}
}

/// A composable predicate over a typed subject.
///
/// `evaluate` must never panic for a well-typed subject; a kind mismatch is a
/// composition error caught at script-load time via [`Pointcut::operates_on`],
/// not a runtime fault.
pub trait Pointcut: fmt::Debug + Send + Sync {
	/// Tests `subject`; `Some` carries the matched sub-results (possibly empty).
	fn evaluate(&self, subject: &SubjectRef, ctx: &mut MatchContext<'_>) -> Option<MatchList>;

	/// Whether this pointcut accepts subjects of `kind`.
	fn operates_on(&self, kind: SubjectKind) -> bool;
}

/// Shared handle to a pointcut.
pub type PointcutRef = Arc<dyn Pointcut>;

/// Matches iff both operands match; result is the identity-intersection of
/// the two result lists.
#[derive(Debug, Clone)]
pub struct And {
	left: PointcutRef,
	right: PointcutRef,
}

impl And {
	pub fn new(left: PointcutRef, right: PointcutRef) -> Self {
		Self { left, right }
	}
}

impl Pointcut for And {
	fn evaluate(&self, subject: &SubjectRef, ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		let a = self.left.evaluate(subject, ctx)?;
		let b = self.right.evaluate(subject, ctx)?;
		Some(intersect(&a, &b))
	}

	fn operates_on(&self, kind: SubjectKind) -> bool {
		self.left.operates_on(kind) && self.right.operates_on(kind)
	}
}

/// Matches iff either operand matches; result is the ordered union.
///
/// Both operands are always evaluated, even when the first already matched:
/// captures recorded by the non-deciding operand must still take effect.
#[derive(Debug, Clone)]
pub struct Or {
	left: PointcutRef,
	right: PointcutRef,
}

impl Or {
	pub fn new(left: PointcutRef, right: PointcutRef) -> Self {
		Self { left, right }
	}
}

impl Pointcut for Or {
	fn evaluate(&self, subject: &SubjectRef, ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		let a = self.left.evaluate(subject, ctx);
		let b = self.right.evaluate(subject, ctx);
		match (a, b) {
			(Some(a), Some(b)) => Some(union(&a, &b)),
			(Some(a), None) => Some(union(&a, &MatchList::new())),
			(None, Some(b)) => Some(union(&MatchList::new(), &b)),
			(None, None) => None,
		}
	}

	fn operates_on(&self, kind: SubjectKind) -> bool {
		self.left.operates_on(kind) || self.right.operates_on(kind)
	}
}

/// Matches iff the operand does not; negation carries no payload.
#[derive(Debug, Clone)]
pub struct Not {
	inner: PointcutRef,
}

impl Not {
	pub fn new(inner: PointcutRef) -> Self {
		Self { inner }
	}
}

impl Pointcut for Not {
	fn evaluate(&self, subject: &SubjectRef, ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		match self.inner.evaluate(subject, ctx) {
			Some(_) => None,
			None => Some(MatchList::new()),
		}
	}

	fn operates_on(&self, kind: SubjectKind) -> bool {
		self.inner.operates_on(kind)
	}
}

/// Delegates to the operand; on match, records its results in the capture map.
#[derive(Debug, Clone)]
pub struct Bind {
	name: Box<str>,
	inner: PointcutRef,
}

impl Bind {
	pub fn new(name: impl Into<Box<str>>, inner: PointcutRef) -> Self {
		Self { name: name.into(), inner }
	}
}

impl Pointcut for Bind {
	fn evaluate(&self, subject: &SubjectRef, ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		let results = self.inner.evaluate(subject, ctx)?;
		ctx.bind(&self.name, results.clone());
		Some(results)
	}

	fn operates_on(&self, kind: SubjectKind) -> bool {
		self.inner.operates_on(kind)
	}
}

/// Shorthand for [`And::new`] behind a [`PointcutRef`].
pub fn and(left: PointcutRef, right: PointcutRef) -> PointcutRef {
	Arc::new(And::new(left, right))
}

/// Shorthand for [`Or::new`] behind a [`PointcutRef`].
pub fn or(left: PointcutRef, right: PointcutRef) -> PointcutRef {
	Arc::new(Or::new(left, right))
}

/// Shorthand for [`Not::new`] behind a [`PointcutRef`].
pub fn not(inner: PointcutRef) -> PointcutRef {
	Arc::new(Not::new(inner))
}

/// Shorthand for [`Bind::new`] behind a [`PointcutRef`].
pub fn bind(name: impl Into<Box<str>>, inner: PointcutRef) -> PointcutRef {
	Arc::new(Bind::new(name, inner))
}

//! Leaf and composite pointcuts over the host symbol model.
//!
//! These only use the [`Subject`](crate::Subject) accessors and the lazily
//! answered query facts; their full semantics live in the host adapter.

use std::sync::Arc;

use crate::combinators::{MatchContext, Pointcut, PointcutRef};
use crate::subject::{MatchList, SubjectKind, SubjectRef};

/// Matches a subject whose declared name equals the expected value.
#[derive(Debug, Clone)]
pub struct NamePointcut {
	value: Box<str>,
}

impl NamePointcut {
	pub fn new(value: impl Into<Box<str>>) -> Self {
		Self { value: value.into() }
	}
}

impl Pointcut for NamePointcut {
	fn evaluate(&self, subject: &SubjectRef, _ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		(subject.name() == Some(&*self.value)).then(|| vec![Arc::clone(subject)])
	}

	fn operates_on(&self, _kind: SubjectKind) -> bool {
		true
	}
}

/// Matches a type subject that names or inherits from the expected type.
#[derive(Debug, Clone)]
pub struct SubtypePointcut {
	type_name: Box<str>,
}

impl SubtypePointcut {
	pub fn new(type_name: impl Into<Box<str>>) -> Self {
		Self { type_name: type_name.into() }
	}
}

impl Pointcut for SubtypePointcut {
	fn evaluate(&self, subject: &SubjectRef, _ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		if subject.kind() != SubjectKind::Type {
			return None;
		}
		(subject.name() == Some(&*self.type_name) || subject.is_subtype_of(&self.type_name)).then(|| vec![Arc::clone(subject)])
	}

	fn operates_on(&self, kind: SubjectKind) -> bool {
		kind == SubjectKind::Type
	}
}

/// Applies the inner pointcut to the type of the queried expression.
#[derive(Debug, Clone)]
pub struct CurrentType {
	inner: PointcutRef,
}

impl CurrentType {
	pub fn new(inner: PointcutRef) -> Self {
		Self { inner }
	}
}

impl Pointcut for CurrentType {
	fn evaluate(&self, _subject: &SubjectRef, ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		let ty = ctx.current_type()?;
		self.inner.evaluate(&ty, ctx)
	}

	fn operates_on(&self, kind: SubjectKind) -> bool {
		kind == SubjectKind::Expression && self.inner.operates_on(SubjectKind::Type)
	}
}

/// Matches when some subject in the enclosing-context chain is a type that
/// names or inherits from the expected type.
///
/// The chain starts at the query's containing unit and walks outward via
/// [`Subject::enclosing`](crate::Subject::enclosing).
#[derive(Debug, Clone)]
pub struct EnclosingType {
	type_name: Box<str>,
}

impl EnclosingType {
	pub fn new(type_name: impl Into<Box<str>>) -> Self {
		Self { type_name: type_name.into() }
	}
}

impl Pointcut for EnclosingType {
	fn evaluate(&self, _subject: &SubjectRef, ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		let mut current = ctx.containing_unit();
		while let Some(s) = current {
			if s.kind() == SubjectKind::Type && (s.name() == Some(&*self.type_name) || s.is_subtype_of(&self.type_name)) {
				return Some(vec![s]);
			}
			current = s.enclosing();
		}
		None
	}

	fn operates_on(&self, _kind: SubjectKind) -> bool {
		true
	}
}

/// Matches when the inner pointcut matches some subject in the
/// enclosing-context chain; result is the inner result at the first match.
#[derive(Debug, Clone)]
pub struct EnclosingContext {
	inner: PointcutRef,
}

impl EnclosingContext {
	pub fn new(inner: PointcutRef) -> Self {
		Self { inner }
	}
}

impl Pointcut for EnclosingContext {
	fn evaluate(&self, _subject: &SubjectRef, ctx: &mut MatchContext<'_>) -> Option<MatchList> {
		let mut current = ctx.containing_unit();
		while let Some(s) = current {
			if self.inner.operates_on(s.kind())
				&& let Some(results) = self.inner.evaluate(&s, ctx)
			{
				return Some(results);
			}
			current = s.enclosing();
		}
		None
	}

	fn operates_on(&self, _kind: SubjectKind) -> bool {
		true
	}
}

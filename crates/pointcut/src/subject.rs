//! Host symbol-model boundary.
//!
//! The engine never interprets symbol-model values beyond the accessors on
//! [`Subject`]; everything else about them belongs to the host.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

/// Stable identity handle for one symbol-model value.
///
/// Identity is the only thing the engine relies on: it drives the set
/// semantics of combinator results and serves as an opaque cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(u64);

impl SubjectId {
	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn raw(self) -> u64 {
		self.0
	}
}

impl fmt::Debug for SubjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SubjectId({})", self.0)
	}
}

/// Categories of subject a pointcut can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
	/// A type in the host model (class, interface, trait).
	Type,
	/// An expression at a call site.
	Expression,
	/// A containing unit (file or module).
	Unit,
}

impl SubjectKind {
	/// Every kind, for load-time composition checks.
	pub const ALL: [SubjectKind; 3] = [SubjectKind::Type, SubjectKind::Expression, SubjectKind::Unit];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Type => "type",
			Self::Expression => "expression",
			Self::Unit => "unit",
		}
	}
}

/// Host-implemented view of one symbol-model value.
///
/// Implementations must be cheap to query; the engine calls these accessors
/// on the hot analysis path.
pub trait Subject: fmt::Debug + Send + Sync {
	/// Stable identity of this value.
	fn id(&self) -> SubjectId;

	/// Kind of the value.
	fn kind(&self) -> SubjectKind;

	/// Declared name, when the value has one.
	fn name(&self) -> Option<&str> {
		None
	}

	/// Whether this value names or inherits from `type_name`. Only meaningful
	/// for [`SubjectKind::Type`] subjects.
	fn is_subtype_of(&self, _type_name: &str) -> bool {
		false
	}

	/// Lexically enclosing value, walking outward.
	fn enclosing(&self) -> Option<SubjectRef> {
		None
	}
}

/// Shared handle to a subject.
pub type SubjectRef = Arc<dyn Subject>;

/// Matched subjects. Set semantics by [`SubjectId`]; declaration order is
/// preserved where the combinator defines one.
pub type MatchList = Vec<SubjectRef>;

/// Intersection of two match lists by subject identity, keeping `a`'s order.
pub fn intersect(a: &MatchList, b: &MatchList) -> MatchList {
	let ids: FxHashSet<SubjectId> = b.iter().map(|s| s.id()).collect();
	let mut seen = FxHashSet::default();
	a.iter().filter(|s| ids.contains(&s.id()) && seen.insert(s.id())).cloned().collect()
}

/// Union of two match lists: `a`'s results first, then `b`'s, duplicates removed.
pub fn union(a: &MatchList, b: &MatchList) -> MatchList {
	let mut seen = FxHashSet::default();
	a.iter().chain(b.iter()).filter(|s| seen.insert(s.id())).cloned().collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug)]
	struct Stub(u64);

	impl Subject for Stub {
		fn id(&self) -> SubjectId {
			SubjectId::from_raw(self.0)
		}

		fn kind(&self) -> SubjectKind {
			SubjectKind::Type
		}
	}

	fn subjects(ids: &[u64]) -> MatchList {
		ids.iter().map(|&i| Arc::new(Stub(i)) as SubjectRef).collect()
	}

	#[test]
	fn intersect_keeps_left_order_and_collapses_duplicates() {
		let got = intersect(&subjects(&[3, 1, 3, 2]), &subjects(&[2, 3]));
		assert_eq!(got.iter().map(|s| s.id().raw()).collect::<Vec<_>>(), vec![3, 2]);
	}

	#[test]
	fn union_is_first_then_second_without_duplicates() {
		let got = union(&subjects(&[1, 2]), &subjects(&[2, 3]));
		assert_eq!(got.iter().map(|s| s.id().raw()).collect::<Vec<_>>(), vec![1, 2, 3]);
	}
}

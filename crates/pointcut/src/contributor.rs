//! Compiled contributor scripts as data.
//!
//! A script compiles to an ordered rule list plus a static-info side table.
//! Actions are structured values executed by the orchestrator (directly for
//! member specs, via a registered host callback otherwise); the compiled
//! object never embeds live script code.

use std::fmt;

use indexmap::IndexMap;

use crate::combinators::PointcutRef;
use crate::subject::SubjectKind;

/// Handle to a host callback registered for structured actions.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u32);

impl CallbackId {
	pub const fn from_raw(raw: u32) -> Self {
		Self(raw)
	}

	pub const fn raw(self) -> u32 {
		self.0
	}
}

impl fmt::Debug for CallbackId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "CallbackId({})", self.0)
	}
}

/// Kind of a contributed member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
	Method,
	Property,
}

/// One contributed member, host-model-opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSpec {
	pub name: String,
	pub kind: MemberKind,
	pub param_types: Vec<String>,
	pub return_type: String,
	pub doc: Option<String>,
}

impl MemberSpec {
	/// A method member with the given parameter and return types.
	pub fn method(name: impl Into<String>, param_types: Vec<String>, return_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind: MemberKind::Method,
			param_types,
			return_type: return_type.into(),
			doc: None,
		}
	}

	/// A property member of the given type.
	pub fn property(name: impl Into<String>, return_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind: MemberKind::Property,
			param_types: Vec::new(),
			return_type: return_type.into(),
			doc: None,
		}
	}

	pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
		self.doc = Some(doc.into());
		self
	}
}

/// What a matched rule contributes.
#[derive(Debug, Clone)]
pub enum Action {
	/// Contribute the member as-is.
	AddMember(MemberSpec),
	/// Dispatch to a registered host callback, which may read captures.
	Callback(CallbackId),
}

/// One script rule. Order is significant: rules are evaluated in
/// script-declaration order and all matching rules fire.
pub type Rule = (PointcutRef, Action);

/// Load-time composition diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompositionError {
	/// The rule's pointcut rejects every subject kind, e.g. an `And` of
	/// pointcuts over disjoint kinds.
	#[error("rule {index}: pointcut accepts no subject kind")]
	NoAcceptedKind { index: usize },
	/// The rule's pointcut does not accept any of the kinds declared for the
	/// script's evaluation subjects.
	#[error("rule {index}: pointcut does not operate on {} subjects", kind.as_str())]
	KindMismatch { index: usize, kind: SubjectKind },
}

/// The immutable result of compiling one contributor script.
///
/// Owned by the compilation coordinator's entry for the script's file key;
/// replaced wholesale on recompilation, never mutated in place.
#[derive(Debug)]
pub struct CompiledContributor {
	rules: Vec<Rule>,
	static_info: IndexMap<String, Vec<String>>,
}

impl CompiledContributor {
	/// Builds a contributor, rejecting rules whose pointcut accepts no
	/// subject kind at all.
	pub fn new(rules: Vec<Rule>, static_info: IndexMap<String, Vec<String>>) -> Result<Self, CompositionError> {
		for (index, (pointcut, _)) in rules.iter().enumerate() {
			if !SubjectKind::ALL.iter().any(|&k| pointcut.operates_on(k)) {
				return Err(CompositionError::NoAcceptedKind { index });
			}
		}
		Ok(Self { rules, static_info })
	}

	/// Builds a contributor with an empty static-info table.
	pub fn from_rules(rules: Vec<Rule>) -> Result<Self, CompositionError> {
		Self::new(rules, IndexMap::new())
	}

	/// Checks every rule against the subject kind the orchestrator will
	/// evaluate with.
	pub fn validate_for(&self, kind: SubjectKind) -> Result<(), CompositionError> {
		for (index, (pointcut, _)) in self.rules.iter().enumerate() {
			if !pointcut.operates_on(kind) {
				return Err(CompositionError::KindMismatch { index, kind });
			}
		}
		Ok(())
	}

	/// Rules in script-declaration order.
	pub fn rules(&self) -> &[Rule] {
		&self.rules
	}

	/// Static-info values declared under `key`, in declaration order.
	pub fn static_info(&self, key: &str) -> &[String] {
		self.static_info.get(key).map(Vec::as_slice).unwrap_or_default()
	}

	/// Static-info keys in declaration order.
	pub fn static_keys(&self) -> impl Iterator<Item = &str> {
		self.static_info.keys().map(String::as_str)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::combinators::and;
	use crate::host::{NamePointcut, SubtypePointcut};

	#[test]
	fn rejects_rules_accepting_no_kind() {
		// CurrentType is expression-only; SubtypePointcut is type-only.
		let dead = and(Arc::new(crate::host::CurrentType::new(Arc::new(SubtypePointcut::new("T")))), Arc::new(SubtypePointcut::new("T")));
		let err = CompiledContributor::from_rules(vec![(dead, Action::AddMember(MemberSpec::property("p", "T")))]).unwrap_err();
		assert!(matches!(err, CompositionError::NoAcceptedKind { index: 0 }));
	}

	#[test]
	fn validate_for_reports_the_first_mismatched_rule() {
		let rules: Vec<Rule> = vec![
			(Arc::new(NamePointcut::new("any")) as PointcutRef, Action::AddMember(MemberSpec::property("a", "T"))),
			(Arc::new(SubtypePointcut::new("T")) as PointcutRef, Action::AddMember(MemberSpec::property("b", "T"))),
		];
		let contributor = CompiledContributor::from_rules(rules).unwrap();
		assert!(contributor.validate_for(SubjectKind::Type).is_ok());
		let err = contributor.validate_for(SubjectKind::Expression).unwrap_err();
		assert!(matches!(err, CompositionError::KindMismatch { index: 1, kind: SubjectKind::Expression }));
	}

	#[test]
	fn static_info_preserves_declaration_order() {
		let mut info = IndexMap::new();
		info.insert("supertype".to_string(), vec!["A".to_string(), "B".to_string()]);
		info.insert("marker".to_string(), vec!["x".to_string()]);
		let contributor = CompiledContributor::new(Vec::new(), info).unwrap();
		assert_eq!(contributor.static_info("supertype"), ["A", "B"]);
		assert!(contributor.static_info("missing").is_empty());
		assert_eq!(contributor.static_keys().collect::<Vec<_>>(), vec!["supertype", "marker"]);
	}
}

//! Query descriptors and touched-factor tracking.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use lore_pointcut::SubjectRef;

use crate::factor_cache::ScopedStore;

/// One request attribute that can scope cache invalidation.
///
/// Declaration order is the canonical descent order shared by every cache
/// chain, so independent scripts naming the same factor set share shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Factor {
	/// The call-site location subject.
	Location = 0,
	/// The unit containing the call site.
	ContainingUnit = 1,
	/// The type of the queried expression.
	SubjectType = 2,
}

impl Factor {
	/// All factors in canonical descent order.
	pub const CANONICAL: [Factor; 3] = [Factor::Location, Factor::ContainingUnit, Factor::SubjectType];

	const fn bit(self) -> u8 {
		1 << (self as u8)
	}

	/// Factors present in `mask`, in canonical order.
	pub fn in_mask(mask: u8) -> impl Iterator<Item = Factor> {
		Self::CANONICAL.into_iter().filter(move |f| mask & f.bit() != 0)
	}
}

/// Monotone set of factors touched during one evaluation.
///
/// Grows as query accessors are called and never shrinks until the engine
/// resets it at the start of the next evaluation.
#[derive(Debug, Default)]
pub struct FactorSet(AtomicU8);

impl FactorSet {
	pub fn record(&self, factor: Factor) {
		self.0.fetch_or(factor.bit(), Ordering::Relaxed);
	}

	pub fn contains(&self, factor: Factor) -> bool {
		self.mask() & factor.bit() != 0
	}

	/// Bitmask of recorded factors; doubles as the chain-shape key.
	pub fn mask(&self) -> u8 {
		self.0.load(Ordering::Relaxed)
	}

	pub fn reset(&self) {
		self.0.store(0, Ordering::Relaxed);
	}
}

/// Stable cache-key identity of one factor value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FactorKey(u64);

impl FactorKey {
	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn raw(self) -> u64 {
		self.0
	}

	pub fn from_subject(subject: &SubjectRef) -> Self {
		Self(subject.id().raw())
	}
}

impl fmt::Debug for FactorKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "FactorKey({})", self.0)
	}
}

/// One factor value as the cache sees it: a stable key plus, when the host
/// object supports scoped-cache attachment, its side table.
#[derive(Clone)]
pub struct FactorValue {
	key: FactorKey,
	store: Option<Arc<ScopedStore>>,
}

impl FactorValue {
	pub fn new(key: FactorKey) -> Self {
		Self { key, store: None }
	}

	pub fn with_store(key: FactorKey, store: Arc<ScopedStore>) -> Self {
		Self { key, store: Some(store) }
	}

	pub fn key(&self) -> FactorKey {
		self.key
	}

	pub fn store(&self) -> Option<&Arc<ScopedStore>> {
		self.store.as_ref()
	}
}

impl fmt::Debug for FactorValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FactorValue")
			.field("key", &self.key)
			.field("scoped", &self.store.is_some())
			.finish()
	}
}

/// Immutable inputs of one query.
///
/// The scoped stores are the host's attachment points: `type_store` lives on
/// the declaring class of the subject type, `unit_store` on the containing
/// unit. Either may be absent when the host object does not support scoped
/// attachment; those chains then fall back to the clock-invalidated table.
#[derive(Clone)]
pub struct QueryInputs {
	/// Call-site subject.
	pub place: SubjectRef,
	/// Type of the queried expression.
	pub subject_type: SubjectRef,
	/// Class declaring the subject type, when the host distinguishes it.
	pub declaring_class: Option<SubjectRef>,
	/// Unit containing the call site.
	pub containing_unit: SubjectRef,
	/// Scoped store attached to the declaring class.
	pub type_store: Option<Arc<ScopedStore>>,
	/// Scoped store attached to the containing unit.
	pub unit_store: Option<Arc<ScopedStore>>,
}

/// The per-request value object.
///
/// Immutable except for the touched-factor set, which accumulates as the
/// recording accessors are called during one evaluation and is read back at
/// cache-store time. Created fresh per query and never shared across queries.
pub struct QueryDescriptor {
	inputs: QueryInputs,
	touched: FactorSet,
}

impl QueryDescriptor {
	pub fn new(inputs: QueryInputs) -> Self {
		Self {
			inputs,
			touched: FactorSet::default(),
		}
	}

	/// Call-site subject; records the [`Factor::Location`] dependency.
	pub fn place(&self) -> &SubjectRef {
		self.touched.record(Factor::Location);
		&self.inputs.place
	}

	/// Subject type; records the [`Factor::SubjectType`] dependency.
	pub fn subject_type(&self) -> &SubjectRef {
		self.touched.record(Factor::SubjectType);
		&self.inputs.subject_type
	}

	/// Declaring class of the subject type; records [`Factor::SubjectType`].
	pub fn declaring_class(&self) -> Option<&SubjectRef> {
		self.touched.record(Factor::SubjectType);
		self.inputs.declaring_class.as_ref()
	}

	/// Containing unit; records the [`Factor::ContainingUnit`] dependency.
	pub fn containing_unit(&self) -> &SubjectRef {
		self.touched.record(Factor::ContainingUnit);
		&self.inputs.containing_unit
	}

	/// Cache identity of `factor`'s value. Does not record a dependency.
	pub fn factor_value(&self, factor: Factor) -> FactorValue {
		match factor {
			Factor::Location => FactorValue::new(FactorKey::from_subject(&self.inputs.place)),
			Factor::ContainingUnit => {
				let key = FactorKey::from_subject(&self.inputs.containing_unit);
				match &self.inputs.unit_store {
					Some(store) => FactorValue::with_store(key, Arc::clone(store)),
					None => FactorValue::new(key),
				}
			}
			Factor::SubjectType => {
				let key = FactorKey::from_subject(&self.inputs.subject_type);
				match &self.inputs.type_store {
					Some(store) => FactorValue::with_store(key, Arc::clone(store)),
					None => FactorValue::new(key),
				}
			}
		}
	}

	/// Clears the touched set ahead of a fresh evaluation.
	pub fn reset_factors(&self) {
		self.touched.reset();
	}

	/// Bitmask of factors touched since the last reset.
	pub fn factors(&self) -> u8 {
		self.touched.mask()
	}
}

impl fmt::Debug for QueryDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("QueryDescriptor").field("touched", &self.touched.mask()).finish_non_exhaustive()
	}
}

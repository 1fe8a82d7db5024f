//! Hierarchical per-script caches keyed by touched factors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::query::{Factor, FactorKey, QueryDescriptor};

/// Process-global content-modification counter.
///
/// Advancing it lazily invalidates every chain anchored in a cache's own
/// table; chains anchored in host-scoped stores are untouched, their lifetime
/// belongs to the host object.
#[derive(Debug, Default)]
pub struct ModificationClock {
	tick: AtomicU64,
}

impl ModificationClock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Advances the counter, returning the new tick.
	pub fn advance(&self) -> u64 {
		self.tick.fetch_add(1, Ordering::AcqRel) + 1
	}

	pub fn now(&self) -> u64 {
		self.tick.load(Ordering::Acquire)
	}
}

/// Unique identity of one cache instance.
///
/// Namespaces slots inside scoped stores: replacing a script's cache instance
/// changes the id, orphaning the old slots until the host scope dies.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheId(u64);

impl CacheId {
	fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	pub const fn raw(self) -> u64 {
		self.0
	}
}

impl fmt::Debug for CacheId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "CacheId({})", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
	cache: CacheId,
	shape: u8,
}

/// Side table a host object exposes for scoped-cache attachment.
///
/// The host owns the table's lifetime: it drops or [`clear`](Self::clear)s it
/// when the underlying object is invalidated by the host's own lifecycle.
/// Slots are namespaced by cache instance and chain shape, so independent
/// scripts attach to one object without collisions.
#[derive(Default)]
pub struct ScopedStore {
	slots: Mutex<FxHashMap<SlotKey, Box<dyn Any + Send + Sync>>>,
}

impl ScopedStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Drops every attached slot. Called by the host when its scope token
	/// invalidates.
	pub fn clear(&self) {
		self.slots.lock().clear();
	}

	/// Number of attached slots; test and introspection aid.
	pub fn len(&self) -> usize {
		self.slots.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn update<V: Send + Sync + 'static>(&self, key: SlotKey, keys: &[FactorKey], value: Arc<V>) {
		let mut slots = self.slots.lock();
		let node = slots.entry(key).or_insert_with(|| Box::new(Node::<V>::empty_level()));
		if let Some(node) = node.downcast_mut::<Node<V>>() {
			node_insert(node, keys, value);
		}
	}

	fn get<V: Send + Sync + 'static>(&self, key: SlotKey, keys: &[FactorKey]) -> Option<Arc<V>> {
		let slots = self.slots.lock();
		let node = slots.get(&key)?.downcast_ref::<Node<V>>()?;
		node_get(node, keys).cloned()
	}
}

impl fmt::Debug for ScopedStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScopedStore").field("slots", &self.len()).finish()
	}
}

/// One chain position: either another key level or the cached leaf.
#[derive(Debug)]
enum Node<V> {
	Level(FxHashMap<FactorKey, Node<V>>),
	Leaf(Arc<V>),
}

impl<V> Node<V> {
	fn empty_level() -> Self {
		Node::Level(FxHashMap::default())
	}
}

fn node_insert<V>(node: &mut Node<V>, keys: &[FactorKey], value: Arc<V>) {
	let Some((key, rest)) = keys.split_first() else {
		*node = Node::Leaf(value);
		return;
	};
	if !matches!(node, Node::Level(_)) {
		*node = Node::empty_level();
	}
	if let Node::Level(map) = node {
		node_insert(map.entry(*key).or_insert_with(Node::empty_level), rest, value);
	}
}

fn node_get<'a, V>(mut node: &'a Node<V>, keys: &[FactorKey]) -> Option<&'a Arc<V>> {
	for key in keys {
		match node {
			Node::Level(map) => node = map.get(key)?,
			Node::Leaf(_) => return None,
		}
	}
	match node {
		Node::Leaf(value) => Some(value),
		Node::Level(_) => None,
	}
}

struct LocalState<V> {
	/// Clock tick the local chains were built at.
	stamp: u64,
	/// Chain shapes ever stored by this cache, local or scoped. Monotone.
	shapes: Vec<u8>,
	/// Clock-anchored chains by shape.
	chains: FxHashMap<u8, Node<V>>,
}

/// Per-script hierarchical result cache.
///
/// Entries are keyed by the ordered subset of query factors the script's
/// evaluation actually touched. A chain anchors in a host scoped store when
/// the first touched factor (canonical order) carries one; the anchor object's
/// identity is implied by the store itself, so only the remaining factors
/// become chain levels. Everything else lands in the local table, which is
/// dropped wholesale when the modification clock advances.
pub struct FactorCache<V> {
	id: CacheId,
	clock: Arc<ModificationClock>,
	state: Mutex<LocalState<V>>,
}

impl<V: Send + Sync + 'static> FactorCache<V> {
	pub fn new(clock: Arc<ModificationClock>) -> Self {
		let stamp = clock.now();
		Self {
			id: CacheId::next(),
			clock,
			state: Mutex::new(LocalState {
				stamp,
				shapes: Vec::new(),
				chains: FxHashMap::default(),
			}),
		}
	}

	pub fn id(&self) -> CacheId {
		self.id
	}

	/// Stores `value` under the factors recorded on `query`.
	///
	/// The shape of the chain is exactly the touched-factor set of the
	/// evaluation that produced `value`; differently shaped chains coexist.
	/// The leaf slot is overwritten on recomputation, last writer wins.
	pub fn store(&self, query: &QueryDescriptor, value: Arc<V>) {
		let shape = query.factors();
		let ordered: Vec<Factor> = Factor::in_mask(shape).collect();
		let values: Vec<_> = ordered.iter().map(|&f| query.factor_value(f)).collect();
		let anchor = values.iter().position(|v| v.store().is_some());

		{
			let mut state = self.state.lock();
			self.refresh(&mut state);
			if !state.shapes.contains(&shape) {
				state.shapes.push(shape);
			}
			if anchor.is_none() {
				let keys: Vec<FactorKey> = values.iter().map(|v| v.key()).collect();
				let node = state.chains.entry(shape).or_insert_with(Node::empty_level);
				node_insert(node, &keys, value);
				return;
			}
		}

		// Anchored chain: the store lives on the anchor object itself, so its
		// own key is implied and the remaining factors become the levels.
		if let Some(i) = anchor
			&& let Some(store) = values[i].store()
		{
			let keys: Vec<FactorKey> = values.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, v)| v.key()).collect();
			store.update(SlotKey { cache: self.id, shape }, &keys, value);
		}
	}

	/// Looks up a previously stored value for `query`.
	///
	/// Probes every shape this cache has stored, most specific first, and
	/// returns the first leaf found. Records nothing on the query.
	pub fn lookup(&self, query: &QueryDescriptor) -> Option<Arc<V>> {
		let shapes = {
			let mut state = self.state.lock();
			self.refresh(&mut state);
			let mut shapes = state.shapes.clone();
			shapes.sort_by_key(|s| std::cmp::Reverse(s.count_ones()));
			shapes
		};

		for shape in shapes {
			let ordered: Vec<Factor> = Factor::in_mask(shape).collect();
			let values: Vec<_> = ordered.iter().map(|&f| query.factor_value(f)).collect();
			let found = match values.iter().position(|v| v.store().is_some()) {
				Some(i) => {
					let keys: Vec<FactorKey> = values.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, v)| v.key()).collect();
					values[i].store().and_then(|store| store.get(SlotKey { cache: self.id, shape }, &keys))
				}
				None => {
					let keys: Vec<FactorKey> = values.iter().map(|v| v.key()).collect();
					let state = self.state.lock();
					state.chains.get(&shape).and_then(|node| node_get(node, &keys)).cloned()
				}
			};
			if found.is_some() {
				return found;
			}
		}
		None
	}

	/// Drops stale local chains when the modification clock has advanced.
	fn refresh(&self, state: &mut LocalState<V>) {
		let now = self.clock.now();
		if state.stamp != now {
			if !state.chains.is_empty() {
				tracing::trace!(cache = ?self.id, stamp = state.stamp, now, "factor_cache.drop_stale");
			}
			state.chains.clear();
			state.stamp = now;
		}
	}
}

impl<V> fmt::Debug for FactorCache<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FactorCache").field("id", &self.id).finish_non_exhaustive()
	}
}

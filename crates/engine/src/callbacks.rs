//! Host callback registry for structured actions.

use std::sync::Arc;

use lore_pointcut::{CallbackId, MatchContext, MemberSpec};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Callback invoked when a rule with [`Action::Callback`](lore_pointcut::Action)
/// fires; may read the evaluation's named captures.
pub type CallbackFn = dyn Fn(&MatchContext<'_>) -> Vec<MemberSpec> + Send + Sync;

/// Registered host callbacks, looked up by id at evaluation time.
///
/// Unknown ids are caught before a contributor's first evaluation and treated
/// as a script error, not a runtime fault.
#[derive(Default)]
pub struct CallbackTable {
	slots: RwLock<FxHashMap<CallbackId, Arc<CallbackFn>>>,
}

impl CallbackTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, id: CallbackId, callback: impl Fn(&MatchContext<'_>) -> Vec<MemberSpec> + Send + Sync + 'static) {
		self.slots.write().insert(id, Arc::new(callback));
	}

	pub fn contains(&self, id: CallbackId) -> bool {
		self.slots.read().contains_key(&id)
	}

	/// Runs the callback; unknown ids contribute nothing.
	pub fn invoke(&self, id: CallbackId, ctx: &MatchContext<'_>) -> Vec<MemberSpec> {
		let callback = self.slots.read().get(&id).cloned();
		match callback {
			Some(callback) => callback(ctx),
			None => Vec::new(),
		}
	}
}

impl std::fmt::Debug for CallbackTable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CallbackTable").field("registered", &self.slots.read().len()).finish()
	}
}

//! Registry of discovered contributor script files.

use std::io;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use lore_cache::{FactorCache, ModificationClock};
use lore_script::FileKey;
use parking_lot::RwLock;
use tracing::debug;

use crate::Result;
use crate::holder::FileContributions;

/// Supplies a script's current source text. Runs on a compile worker, so it
/// may block on I/O; a read failure disables the script like any other
/// compile failure.
pub type SourceSupplier = Arc<dyn Fn() -> io::Result<String> + Send + Sync>;

struct ScriptRecord {
	source: SourceSupplier,
	/// Content version stamp; bumped on every content change.
	version: u64,
	/// Per-file contribution cache; replaced wholesale on content change.
	cache: Arc<FactorCache<FileContributions>>,
}

/// Files the engine considers when answering queries, in registration order.
///
/// The index owns the per-file half of the script entry: the source supplier,
/// the content version, and the factor cache. The compiled half lives in the
/// compilation coordinator.
pub struct ScriptIndex {
	clock: Arc<ModificationClock>,
	files: RwLock<IndexMap<FileKey, ScriptRecord>>,
}

impl ScriptIndex {
	pub fn new(clock: Arc<ModificationClock>) -> Self {
		Self {
			clock,
			files: RwLock::new(IndexMap::new()),
		}
	}

	/// Registers a script with a source supplier. Re-registering an existing
	/// file keeps its version and cache.
	pub fn register(&self, file: FileKey, source: SourceSupplier) {
		let mut files = self.files.write();
		if let Some(record) = files.get_mut(&file) {
			record.source = source;
			return;
		}
		files.insert(
			file,
			ScriptRecord {
				source,
				version: 1,
				cache: Arc::new(FactorCache::new(Arc::clone(&self.clock))),
			},
		);
	}

	/// Registers a script from fixed source text.
	pub fn register_text(&self, file: FileKey, text: impl Into<String>) {
		let text = text.into();
		self.register(file, Arc::new(move || Ok(text.clone())));
	}

	/// Scans `dir` for files with the given extension (no leading dot) and
	/// registers each with a file-reading supplier. Returns how many were
	/// registered. Paths are sorted so registration order is stable.
	pub fn discover_dir(&self, dir: &Path, extension: &str) -> Result<usize> {
		let mut paths = Vec::new();
		for entry in std::fs::read_dir(dir)? {
			let path = entry?.path();
			if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(extension) {
				paths.push(path);
			}
		}
		paths.sort();

		let mut registered = 0;
		for path in paths {
			let file = FileKey::new(path.to_string_lossy());
			let supplier: SourceSupplier = Arc::new(move || std::fs::read_to_string(&path));
			self.register(file, supplier);
			registered += 1;
		}
		debug!(dir = %dir.display(), registered, "index.discover");
		Ok(registered)
	}

	/// Removes a file from the discovery set.
	pub fn remove(&self, file: &FileKey) {
		self.files.write().shift_remove(file);
	}

	/// Known files in registration order.
	pub fn files(&self) -> Vec<FileKey> {
		self.files.read().keys().cloned().collect()
	}

	/// Current content version of `file`.
	pub fn version(&self, file: &FileKey) -> Option<u64> {
		self.files.read().get(file).map(|r| r.version)
	}

	/// Bumps the content version and replaces the factor cache. Returns false
	/// for unknown files.
	pub(crate) fn bump(&self, file: &FileKey) -> bool {
		let mut files = self.files.write();
		let Some(record) = files.get_mut(file) else {
			return false;
		};
		record.version += 1;
		record.cache = Arc::new(FactorCache::new(Arc::clone(&self.clock)));
		true
	}

	pub(crate) fn snapshot(&self, file: &FileKey) -> Option<(SourceSupplier, u64, Arc<FactorCache<FileContributions>>)> {
		let files = self.files.read();
		let record = files.get(file)?;
		Some((Arc::clone(&record.source), record.version, Arc::clone(&record.cache)))
	}
}

impl std::fmt::Debug for ScriptIndex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ScriptIndex").field("files", &self.files.read().len()).finish()
	}
}

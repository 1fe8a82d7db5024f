//! Origin-tagged contribution results.

use std::sync::Arc;

use lore_pointcut::MemberSpec;
use lore_script::FileKey;

/// Members contributed by one script file for one query.
///
/// This is the unit the factor cache stores: immutable once built, shared
/// between the cache and every merged holder that includes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContributions {
	origin: FileKey,
	members: Vec<MemberSpec>,
}

impl FileContributions {
	pub fn new(origin: FileKey, members: Vec<MemberSpec>) -> Self {
		Self { origin, members }
	}

	/// File the members came from.
	pub fn origin(&self) -> &FileKey {
		&self.origin
	}

	pub fn members(&self) -> &[MemberSpec] {
		&self.members
	}

	pub fn is_empty(&self) -> bool {
		self.members.is_empty()
	}
}

/// Merged result of running the applicable contributors against one query.
///
/// Union of per-file contributions; members are never de-duplicated across
/// origin files, shadowing among them is the host model's concern.
#[derive(Debug, Clone, Default)]
pub struct ContributionHolder {
	files: Vec<Arc<FileContributions>>,
}

impl ContributionHolder {
	pub fn push(&mut self, part: Arc<FileContributions>) {
		self.files.push(part);
	}

	/// Per-file parts in evaluation order.
	pub fn files(&self) -> &[Arc<FileContributions>] {
		&self.files
	}

	/// All contributed members across files.
	pub fn members(&self) -> impl Iterator<Item = &MemberSpec> {
		self.files.iter().flat_map(|f| f.members().iter())
	}

	/// Total member count.
	pub fn len(&self) -> usize {
		self.files.iter().map(|f| f.members().len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Contributed member names in evaluation order; test and display aid.
	pub fn member_names(&self) -> Vec<&str> {
		self.members().map(|m| m.name.as_str()).collect()
	}
}

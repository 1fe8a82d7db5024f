//! Per-file activation status and its persistence.

use std::path::Path;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{FileKey, Result};

/// Eligibility of one script file for (re)compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
	/// Compiled (or never attempted) and eligible.
	Active,
	/// Content changed since the last compile; stale but still eligible, the
	/// next attempt recompiles.
	Modified,
	/// Disabled after a compile or evaluation error; skipped until explicitly
	/// reactivated.
	DisabledError,
}

/// Persisted form of one non-default status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRecord {
	pub file: String,
	pub status: ActivationStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct FileState {
	status: ActivationStatus,
	error: Option<String>,
}

/// Registry of per-file activation status.
///
/// Open-world default-allow: a file with no record is [`ActivationStatus::Active`].
/// Only non-default records (or Active records carrying a stale error) are
/// kept, which is also exactly what persists.
#[derive(Debug, Default)]
pub struct ActivationRegistry {
	files: RwLock<FxHashMap<FileKey, FileState>>,
}

impl ActivationRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Status of `file`; missing records default to Active.
	pub fn status(&self, file: &FileKey) -> ActivationStatus {
		self.files.read().get(file).map(|s| s.status).unwrap_or(ActivationStatus::Active)
	}

	/// Last recorded error text for `file`, if any.
	pub fn last_error(&self, file: &FileKey) -> Option<String> {
		self.files.read().get(file).and_then(|s| s.error.clone())
	}

	/// Whether a query may attempt (re)compilation of `file`.
	pub fn is_eligible(&self, file: &FileKey) -> bool {
		self.status(file) != ActivationStatus::DisabledError
	}

	/// Returns `file` to the default Active state, clearing any error.
	pub fn mark_active(&self, file: &FileKey) {
		self.files.write().remove(file);
	}

	/// Marks `file` stale after a content change. Disabled files stay
	/// disabled; their content change takes effect after reactivation.
	pub fn mark_modified(&self, file: &FileKey) {
		let mut files = self.files.write();
		match files.get_mut(file) {
			Some(state) if state.status == ActivationStatus::DisabledError => {}
			Some(state) => state.status = ActivationStatus::Modified,
			None => {
				files.insert(
					file.clone(),
					FileState {
						status: ActivationStatus::Modified,
						error: None,
					},
				);
			}
		}
	}

	/// Disables `file` with the given error. Returns true when the file was
	/// not already disabled, i.e. this is the report-worthy first failure.
	pub fn disable(&self, file: &FileKey, error: impl Into<String>) -> bool {
		let mut files = self.files.write();
		let state = files.entry(file.clone()).or_insert_with(|| FileState {
			status: ActivationStatus::Active,
			error: None,
		});
		let newly = state.status != ActivationStatus::DisabledError;
		state.status = ActivationStatus::DisabledError;
		state.error = Some(error.into());
		newly
	}

	/// Explicit external reactivation: clears a disabled file back to Active
	/// and re-enables recompilation on next use.
	pub fn reactivate(&self, file: &FileKey) {
		let removed = self.files.write().remove(file).is_some();
		if removed {
			debug!(file = %file, "activation.reactivate");
		}
	}

	/// Forgets `file` entirely (removed from the discovery set).
	pub fn forget(&self, file: &FileKey) {
		self.files.write().remove(file);
	}

	/// Non-default records, sorted by file for stable persistence.
	pub fn records(&self) -> Vec<ActivationRecord> {
		let mut records: Vec<ActivationRecord> = self
			.files
			.read()
			.iter()
			.map(|(file, state)| ActivationRecord {
				file: file.as_str().to_string(),
				status: state.status,
				error: state.error.clone(),
			})
			.collect();
		records.sort_by(|a, b| a.file.cmp(&b.file));
		records
	}

	/// Loads records from `path`; a missing file yields an empty registry.
	pub fn load(path: &Path) -> Result<Self> {
		let registry = Self::new();
		let text = match std::fs::read_to_string(path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(registry),
			Err(e) => return Err(e.into()),
		};
		let records: Vec<ActivationRecord> = serde_json::from_str(&text)?;
		{
			let mut files = registry.files.write();
			for record in records {
				files.insert(
					FileKey::new(&record.file),
					FileState {
						status: record.status,
						error: record.error,
					},
				);
			}
		}
		Ok(registry)
	}

	/// Saves non-default records to `path` as JSON.
	pub fn save(&self, path: &Path) -> Result<()> {
		let text = serde_json::to_string_pretty(&self.records())?;
		std::fs::write(path, text)?;
		Ok(())
	}
}

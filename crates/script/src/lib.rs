//! Script compilation plumbing.
//!
//! Turns discovered contributor script files into compiled contributor
//! objects: an activation registry decides which files are eligible, a
//! bounded worker pool compiles them, and a coalescing coordinator guarantees
//! at most one in-flight compilation per file. Catastrophic resource failures
//! trip a process-wide stop flag that shuts the subsystem off.

mod activation;
mod compiler;
mod coordinator;
mod metrics;

use std::fmt;
use std::sync::Arc;

pub use activation::{ActivationRecord, ActivationRegistry, ActivationStatus};
pub use compiler::{CompileFailure, ErrorSink, ScriptCompiler, TracingSink};
pub use coordinator::{CompilationCoordinator, CompileOutcome, CoordinatorConfig};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Input/output failure while spawning workers or touching disk.
	#[error("{0}")]
	Io(#[from] std::io::Error),
	/// The persisted activation store is unreadable.
	#[error("activation store corrupt: {0}")]
	Persist(#[from] serde_json::Error),
}

/// Identity of one contributor script file.
///
/// The content version is tracked separately by the script index; two keys
/// are the same file regardless of content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey(Arc<str>);

impl FileKey {
	pub fn new(path: impl AsRef<str>) -> Self {
		Self(Arc::from(path.as_ref()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for FileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "FileKey({})", self.0)
	}
}

impl fmt::Display for FileKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for FileKey {
	fn from(path: &str) -> Self {
		Self::new(path)
	}
}

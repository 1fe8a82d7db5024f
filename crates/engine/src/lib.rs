//! Query orchestration for contributor scripts.
//!
//! The engine enumerates candidate script files, asks the compilation
//! coordinator for each one's compiled contributor, evaluates its rules
//! against the query (or reuses a factor-cached result), and merges the
//! origin-tagged contributions. Failures in one script never cross file
//! boundaries; `contribute` always returns a (possibly partial) holder.

mod callbacks;
mod engine;
mod holder;
mod index;
mod metrics;

pub use callbacks::CallbackTable;
pub use engine::{DslEngine, EngineConfig};
pub use holder::{ContributionHolder, FileContributions};
pub use index::{ScriptIndex, SourceSupplier};
pub use metrics::{EngineMetrics, EngineMetricsSnapshot};
// The cancellation token type queries are expected to pass in.
pub use tokio_util::sync::CancellationToken;

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Input/output failure during discovery.
	#[error("{0}")]
	Io(#[from] std::io::Error),
	/// Failure from the script subsystem (worker spawn, persistence).
	#[error(transparent)]
	Script(#[from] lore_script::Error),
}

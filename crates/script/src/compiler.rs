//! External collaborator boundaries: the script compiler and the error sink.

use lore_pointcut::CompiledContributor;
use tracing::{error, warn};

use crate::FileKey;

/// Failure modes of one compilation attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileFailure {
	/// Script-scoped failure: a parse/compile error or an exception from the
	/// first-pass execution of top-level script code. Disables only this
	/// file; recoverable via reactivation.
	#[error("script error: {0}")]
	Script(String),
	/// Resource-catastrophic failure (out of memory, missing-class/link
	/// errors). The host environment itself is compromised; the whole
	/// compilation subsystem stops.
	#[error("fatal resource failure: {0}")]
	Fatal(String),
}

/// Turns script source text into a compiled contributor.
///
/// The core treats this as an opaque function; the script language runtime
/// behind it is the host's business.
pub trait ScriptCompiler: Send + Sync {
	fn compile(&self, source: &str, file_name: &str) -> Result<CompiledContributor, CompileFailure>;
}

/// Receives script-failure reports.
///
/// `report_script_error` fires once per newly disabled file, not on every
/// query; `report_fatal_stop` fires at most once per process.
pub trait ErrorSink: Send + Sync {
	fn report_script_error(&self, file: &FileKey, error: &str);

	fn report_fatal_stop(&self, error: &str);
}

/// Default sink that forwards reports to tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
	fn report_script_error(&self, file: &FileKey, error: &str) {
		warn!(file = %file, error, "script.disabled");
	}

	fn report_fatal_stop(&self, error: &str) {
		error!(error, "script.fatal_stop");
	}
}

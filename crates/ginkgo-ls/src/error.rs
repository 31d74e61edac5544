//
// error.rs
//
// Typed failures for the outline and runner subprocesses
//

use std::path::PathBuf;

use thiserror::Error;

/// Failure while producing an outline for one document.
///
/// Cloneable so a single failed computation can be handed to every caller
/// that was awaiting the same in-flight request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("ginkgo executable not found: {}", path.display())]
    ToolNotFound { path: PathBuf },

    #[error("{tool} exited abnormally ({status}): {stderr}")]
    ToolInvocation {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("could not decode outline output: {message}")]
    Decode { message: String },
}

impl OutlineError {
    pub fn is_tool_not_found(&self) -> bool {
        matches!(self, OutlineError::ToolNotFound { .. })
    }
}

/// Failure that prevents a test run from happening at all.
///
/// Reported once per run, never per node.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("ginkgo executable not found: {}", path.display())]
    ToolNotFound { path: PathBuf },

    #[error("test runner could not be started: {message}")]
    Unavailable { message: String },

    #[error("coverage report unavailable: {message}")]
    Coverage { message: String },
}

/// A streamed line that looked like a record but could not be decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed runner record: {message}")]
pub struct RecordError {
    pub message: String,
    pub line: String,
}

/// The configured executable could not be resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("executable not found: {}", path.display())]
pub struct ToolNotFound {
    pub path: PathBuf,
}

impl From<ToolNotFound> for OutlineError {
    fn from(err: ToolNotFound) -> Self {
        OutlineError::ToolNotFound { path: err.path }
    }
}

impl From<ToolNotFound> for RunnerError {
    fn from(err: ToolNotFound) -> Self {
        RunnerError::ToolNotFound { path: err.path }
    }
}

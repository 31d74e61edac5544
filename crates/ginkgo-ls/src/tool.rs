//
// tool.rs
//
// Resolution of the configured ginkgo executable
//

use std::path::{Path, PathBuf};

use crate::error::ToolNotFound;

/// Resolve a configured executable to an absolute path.
///
/// A bare name is looked up on `PATH`; anything containing a separator must
/// point at an existing executable file. Called on every invocation so a
/// reconfigured path takes effect on the next call.
pub fn resolve_executable(path: &Path) -> Result<PathBuf, ToolNotFound> {
    match which::which(path) {
        Ok(resolved) => {
            log::trace!("Resolved {} to {}", path.display(), resolved.display());
            Ok(resolved)
        }
        Err(e) => {
            log::trace!("Could not resolve {}: {}", path.display(), e);
            Err(ToolNotFound {
                path: path.to_path_buf(),
            })
        }
    }
}

/// Directory a Go test file belongs to, used as the runner's package argument
/// and as the working directory for subprocesses.
pub fn package_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Failure to bring the function up. Every variant aborts the launch.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to resolve absolute path to function {path}: {source}")]
    Resolve {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("function not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to stat function {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("function is a directory: {0}")]
    IsDirectory(PathBuf),

    #[error("function is not executable: {0}")]
    NotExecutable(PathBuf),

    #[error("failed to open runtime API listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to launch function {path}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("runtime API server failed: {0}")]
    Server(#[source] std::io::Error),
}

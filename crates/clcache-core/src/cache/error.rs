use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Could not create kernel cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read kernel binary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build program loaded from binary {path}: {message}")]
    Reload { path: PathBuf, message: String },

    #[error("Incorrect number of kernel binaries generated: expected 1, found {count}")]
    BinaryCount { count: usize },

    #[error("Failed to write kernel binary {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

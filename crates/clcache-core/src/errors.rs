use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheError;
use crate::compute::BackendError;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Cannot open file {path}: {source}")]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Kernel compilation failed for {file}: {log}")]
    Build { file: String, log: String },

    #[error("Failed to create compute kernel '{entry_point}' from {file}: {message}")]
    Handle {
        file: String,
        entry_point: String,
        message: String,
    },

    #[error("Failed to query argument info of kernel '{entry_point}': {message}")]
    Introspection { entry_point: String, message: String },

    #[error("Kernel {file} has no argument '{name}'")]
    UnknownArgument { file: String, name: String },

    #[error("Kernel {file} has not been built yet")]
    NotBuilt { file: String },

    #[error("Compute backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Coarse error category, one per failure class a caller may want to tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Build,
    Handle,
    Introspection,
    UnknownArgument,
    NotBuilt,
    Backend,
    Config,
    /// A stored binary could not be reloaded (bad cache, not bad source)
    CacheCorrupt,
    /// The cache directory or a cache file could not be written
    CacheUnusable,
}

impl KernelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::SourceIo { .. } => ErrorKind::Io,
            KernelError::Build { .. } => ErrorKind::Build,
            KernelError::Handle { .. } => ErrorKind::Handle,
            KernelError::Introspection { .. } => ErrorKind::Introspection,
            KernelError::UnknownArgument { .. } => ErrorKind::UnknownArgument,
            KernelError::NotBuilt { .. } => ErrorKind::NotBuilt,
            KernelError::Backend(_) => ErrorKind::Backend,
            KernelError::Config(_) => ErrorKind::Config,
            KernelError::Cache(err) => match err {
                CacheError::Reload { .. } | CacheError::BinaryCount { .. } => {
                    ErrorKind::CacheCorrupt
                }
                CacheError::Read { .. } => ErrorKind::Io,
                CacheError::CreateDir { .. } | CacheError::Write { .. } => {
                    ErrorKind::CacheUnusable
                }
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;

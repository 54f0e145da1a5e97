//! Binary cache for compiled kernels
//!
//! A compiled program is stored as `<file name>.<fingerprint>.bin` under the
//! cache directory, where the fingerprint covers the expanded source, build
//! options, platform name and device name. Entries are never evicted.

mod error;
mod hash;
mod store;

pub use error::CacheError;
pub use hash::{compute_hash, file_hash, fingerprint, format_fingerprint};
pub use store::{
    cache_file_name, ensure_cache_dir, CacheEntry, CacheOutcome, CachedProgram, KernelCache,
};

/// Default cache directory, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "cache/kernel_binaries";

/// Extension of stored kernel binaries
pub const BINARY_EXTENSION: &str = "bin";

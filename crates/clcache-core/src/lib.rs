//! Build cache for OpenCL compute kernels
//!
//! Turns a kernel source file (plus the chain of files it includes) into a
//! device-specific program, reusing compiled binaries across process runs and
//! skipping recompilation when nothing build-relevant changed within a run.

pub mod cache;
pub mod compute;
pub mod config;
pub mod errors;
pub mod kernel;
pub mod paths;
pub mod source;

pub use cache::{compute_hash, fingerprint, CacheOutcome, CachedProgram, KernelCache};
pub use compute::{BackendError, ComputeBackend, DeviceIdentity, DeviceKind};
#[cfg(any(test, feature = "mock"))]
pub use compute::MockBackend;
pub use config::BuildConfig;
pub use errors::{ErrorKind, KernelError, Result};
pub use kernel::{ArgBinder, BuildOutcome, Kernel, KernelHooks};
pub use source::expand_source;

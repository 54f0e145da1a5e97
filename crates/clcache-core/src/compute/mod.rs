//! Compute API seam
//!
//! The cache and the kernel build engine only need a handful of operations
//! from the underlying compute API. [`ComputeBackend`] names them; native
//! status codes and errors are translated into [`BackendError`] by each
//! implementation.

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "opencl")]
pub mod opencl;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockArg, MockBackend, MockDevice, MockKernel, MockProgram};

use std::fmt;
use thiserror::Error;

/// Failure reported by the compute API, with its diagnostic text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for BackendError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for BackendError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Device type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceKind {
    Cpu,
    #[default]
    Gpu,
    Accelerator,
    Other,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Cpu => "CPU",
            DeviceKind::Gpu => "GPU",
            DeviceKind::Accelerator => "ACCELERATOR",
            DeviceKind::Other => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Names that make a compiled binary specific to one platform and device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub platform: String,
    pub device: String,
}

/// Operations the build cache consumes from a compute API
///
/// An implementation plays the role of a context: it owns whatever native
/// state is needed to compile for, and create kernels on, its devices.
pub trait ComputeBackend {
    type Device: Clone;
    type Program;
    type Kernel;
    /// Value bound to a kernel argument
    type Arg<'a>;

    fn platform_name(&self, device: &Self::Device) -> Result<String, BackendError>;

    fn device_name(&self, device: &Self::Device) -> Result<String, BackendError>;

    fn device_kind(&self, device: &Self::Device) -> Result<DeviceKind, BackendError>;

    /// Compile flattened source text for one device
    fn compile_source(
        &self,
        device: &Self::Device,
        source: &str,
        options: &str,
    ) -> Result<Self::Program, BackendError>;

    /// Rebuild a program from a binary previously produced for `device`
    fn load_binary(
        &self,
        device: &Self::Device,
        binary: &[u8],
        options: &str,
    ) -> Result<Self::Program, BackendError>;

    fn build_log(
        &self,
        program: &Self::Program,
        device: &Self::Device,
    ) -> Result<String, BackendError>;

    /// Compiled payloads of a program, one per device it was built for
    fn binaries(&self, program: &Self::Program) -> Result<Vec<Vec<u8>>, BackendError>;

    fn create_kernel(
        &self,
        program: &Self::Program,
        entry_point: &str,
    ) -> Result<Self::Kernel, BackendError>;

    fn num_args(&self, kernel: &Self::Kernel) -> Result<u32, BackendError>;

    fn arg_name(&self, kernel: &Self::Kernel, index: u32) -> Result<String, BackendError>;

    fn set_arg(
        &self,
        kernel: &Self::Kernel,
        index: u32,
        value: Self::Arg<'_>,
    ) -> Result<(), BackendError>;

    fn device_identity(&self, device: &Self::Device) -> Result<DeviceIdentity, BackendError> {
        Ok(DeviceIdentity {
            platform: self.platform_name(device)?,
            device: self.device_name(device)?,
        })
    }
}

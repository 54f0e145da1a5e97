//! In-memory compute backend
//!
//! Compiles nothing: a "binary" is the source text behind a small header, and
//! kernel arguments are read off the entry point's parameter list. Every
//! compile, binary load and argument binding is recorded so callers can tell
//! which path a build took without real hardware.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BackendError, ComputeBackend, DeviceKind};

const BINARY_MAGIC: &str = "MOCKBIN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub platform: String,
    pub name: String,
    pub kind: DeviceKind,
}

impl MockDevice {
    pub fn gpu(name: impl Into<String>) -> Self {
        Self {
            platform: "Mock Platform".to_string(),
            name: name.into(),
            kind: DeviceKind::Gpu,
        }
    }

    pub fn cpu(name: impl Into<String>) -> Self {
        Self {
            platform: "Mock Platform".to_string(),
            name: name.into(),
            kind: DeviceKind::Cpu,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct MockProgram {
    pub source: String,
    pub options: String,
    pub device: String,
    pub from_binary: bool,
    log: String,
}

#[derive(Debug, Clone)]
pub struct MockKernel {
    pub entry_point: String,
    pub arg_names: Vec<String>,
    pub from_binary: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockArg {
    Int(i64),
    Float(f64),
    Buffer(String),
}

impl From<i64> for MockArg {
    fn from(value: i64) -> Self {
        MockArg::Int(value)
    }
}

impl From<f64> for MockArg {
    fn from(value: f64) -> Self {
        MockArg::Float(value)
    }
}

impl From<&str> for MockArg {
    fn from(name: &str) -> Self {
        MockArg::Buffer(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockBinding {
    pub entry_point: String,
    pub index: u32,
    pub value: MockArg,
}

#[derive(Debug, Default)]
struct MockRecord {
    compiles: Vec<MockProgram>,
    loads: usize,
    bindings: Vec<MockBinding>,
}

/// Recording compute backend for tests and dry runs
#[derive(Debug)]
pub struct MockBackend {
    record: Mutex<MockRecord>,
    binary_copies: usize,
    corrupt_binaries: bool,
    binary_arg_info: bool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            record: Mutex::new(MockRecord::default()),
            binary_copies: 1,
            corrupt_binaries: false,
            binary_arg_info: true,
        }
    }

    /// Report `copies` binaries per compiled program instead of one
    pub fn with_binary_copies(mut self, copies: usize) -> Self {
        self.binary_copies = copies;
        self
    }

    /// Refuse every stored binary handed back for loading
    pub fn with_corrupt_binaries(mut self) -> Self {
        self.corrupt_binaries = true;
        self
    }

    /// Drop argument names for kernels created from binaries, as some drivers do
    pub fn without_binary_arg_info(mut self) -> Self {
        self.binary_arg_info = false;
        self
    }

    pub fn compile_count(&self) -> usize {
        self.record().compiles.len()
    }

    pub fn load_count(&self) -> usize {
        self.record().loads
    }

    /// Options passed to each source compile, oldest first
    pub fn compiled_options(&self) -> Vec<String> {
        self.record()
            .compiles
            .iter()
            .map(|p| p.options.clone())
            .collect()
    }

    /// Source text passed to the most recent compile
    pub fn last_compiled_source(&self) -> Option<String> {
        self.record()
            .compiles
            .last()
            .map(|p| p.source.clone())
    }

    pub fn bindings(&self) -> Vec<MockBinding> {
        self.record().bindings.clone()
    }

    pub fn clear_bindings(&self) {
        self.record().bindings.clear();
    }

    // A panic while recording leaves the record readable
    fn record(&self) -> MutexGuard<'_, MockRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn encode(program: &MockProgram) -> Vec<u8> {
        format!("{} {}\n{}", BINARY_MAGIC, program.device, program.source).into_bytes()
    }
}

impl ComputeBackend for MockBackend {
    type Device = MockDevice;
    type Program = MockProgram;
    type Kernel = MockKernel;
    type Arg<'a> = MockArg;

    fn platform_name(&self, device: &MockDevice) -> Result<String, BackendError> {
        Ok(device.platform.clone())
    }

    fn device_name(&self, device: &MockDevice) -> Result<String, BackendError> {
        Ok(device.name.clone())
    }

    fn device_kind(&self, device: &MockDevice) -> Result<DeviceKind, BackendError> {
        Ok(device.kind)
    }

    fn compile_source(
        &self,
        device: &MockDevice,
        source: &str,
        options: &str,
    ) -> Result<MockProgram, BackendError> {
        if let Some(line) = source.lines().find(|l| l.trim_start().starts_with("#error")) {
            return Err(BackendError::new(format!("error: {}", line.trim())));
        }

        let log = source
            .lines()
            .filter(|l| l.trim_start().starts_with("#warning"))
            .map(|l| format!("warning: {}", l.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        let program = MockProgram {
            source: source.to_string(),
            options: options.to_string(),
            device: device.name.clone(),
            from_binary: false,
            log,
        };
        self.record().compiles.push(program.clone());
        Ok(program)
    }

    fn load_binary(
        &self,
        device: &MockDevice,
        binary: &[u8],
        options: &str,
    ) -> Result<MockProgram, BackendError> {
        self.record().loads += 1;

        if self.corrupt_binaries {
            return Err(BackendError::new("CL_INVALID_BINARY"));
        }

        let text = std::str::from_utf8(binary).map_err(|_| BackendError::new("CL_INVALID_BINARY"))?;
        let (header, source) = text
            .split_once('\n')
            .ok_or_else(|| BackendError::new("CL_INVALID_BINARY"))?;
        let built_for = header
            .strip_prefix(BINARY_MAGIC)
            .map(str::trim)
            .ok_or_else(|| BackendError::new("CL_INVALID_BINARY"))?;
        if built_for != device.name {
            return Err(BackendError::new(format!(
                "binary was built for '{}', not '{}'",
                built_for, device.name
            )));
        }

        Ok(MockProgram {
            source: source.to_string(),
            options: options.to_string(),
            device: device.name.clone(),
            from_binary: true,
            log: String::new(),
        })
    }

    fn build_log(&self, program: &MockProgram, _device: &MockDevice) -> Result<String, BackendError> {
        Ok(program.log.clone())
    }

    fn binaries(&self, program: &MockProgram) -> Result<Vec<Vec<u8>>, BackendError> {
        Ok(vec![Self::encode(program); self.binary_copies])
    }

    fn create_kernel(
        &self,
        program: &MockProgram,
        entry_point: &str,
    ) -> Result<MockKernel, BackendError> {
        let arg_names = parse_parameters(&program.source, entry_point)
            .ok_or_else(|| BackendError::new("CL_INVALID_KERNEL_NAME"))?;
        Ok(MockKernel {
            entry_point: entry_point.to_string(),
            arg_names,
            from_binary: program.from_binary,
        })
    }

    fn num_args(&self, kernel: &MockKernel) -> Result<u32, BackendError> {
        Ok(kernel.arg_names.len() as u32)
    }

    fn arg_name(&self, kernel: &MockKernel, index: u32) -> Result<String, BackendError> {
        if kernel.from_binary && !self.binary_arg_info {
            return Err(BackendError::new("CL_KERNEL_ARG_INFO_NOT_AVAILABLE"));
        }
        kernel
            .arg_names
            .get(index as usize)
            .cloned()
            .ok_or_else(|| BackendError::new("CL_INVALID_ARG_INDEX"))
    }

    fn set_arg(&self, kernel: &MockKernel, index: u32, value: MockArg) -> Result<(), BackendError> {
        if index as usize >= kernel.arg_names.len() {
            return Err(BackendError::new("CL_INVALID_ARG_INDEX"));
        }
        self.record().bindings.push(MockBinding {
            entry_point: kernel.entry_point.clone(),
            index,
            value,
        });
        Ok(())
    }
}

/// Parameter names of `kernel void <entry_point>(...)` in `source`
fn parse_parameters(source: &str, entry_point: &str) -> Option<Vec<String>> {
    let signature = format!("void {}(", entry_point);
    let mut search = source;
    loop {
        let start = search.find(&signature)?;
        let before = &search[..start];
        let after = &search[start + signature.len()..];
        let is_kernel = before
            .split_whitespace()
            .last()
            .map(|w| w == "kernel" || w == "__kernel")
            .unwrap_or(false);
        if is_kernel {
            let params = &after[..after.find(')')?];
            return Some(
                params
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty() && *p != "void")
                    .filter_map(|p| {
                        p.rsplit(|c: char| c.is_whitespace() || c == '*')
                            .next()
                            .map(str::to_string)
                    })
                    .collect(),
            );
        }
        search = after;
    }
}

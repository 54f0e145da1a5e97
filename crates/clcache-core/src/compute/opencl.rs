//! OpenCL backend using the `ocl` crate

use ocl::core::{self, ArgVal};
use ocl::enums::{
    DeviceInfo, DeviceInfoResult, KernelArgInfo, KernelArgInfoResult, KernelInfo,
    KernelInfoResult, ProgramBuildInfo, ProgramBuildInfoResult, ProgramInfo, ProgramInfoResult,
};
use ocl::flags::DeviceType;
use ocl::{Context, Device, Platform, Program};
use std::fmt;
use tracing::info;

use super::{BackendError, ComputeBackend, DeviceKind};

fn cl_err(err: impl fmt::Display) -> BackendError {
    BackendError::new(err.to_string())
}

fn kind_of(device: &Device) -> Result<DeviceKind, BackendError> {
    match device.info(DeviceInfo::Type).map_err(cl_err)? {
        DeviceInfoResult::Type(ty) if ty.contains(DeviceType::CPU) => Ok(DeviceKind::Cpu),
        DeviceInfoResult::Type(ty) if ty.contains(DeviceType::GPU) => Ok(DeviceKind::Gpu),
        DeviceInfoResult::Type(ty) if ty.contains(DeviceType::ACCELERATOR) => {
            Ok(DeviceKind::Accelerator)
        }
        _ => Ok(DeviceKind::Other),
    }
}

/// OpenCL context restricted to one platform
pub struct OclBackend {
    platform: Platform,
    context: Context,
}

impl OclBackend {
    /// Create a context for `device` on `platform`
    pub fn new(platform: Platform, device: Device) -> Result<Self, BackendError> {
        let context = Context::builder()
            .platform(platform)
            .devices(device)
            .build()
            .map_err(cl_err)?;
        Ok(Self { platform, context })
    }

    /// Pick the first platform whose name contains `platform_name` and, on
    /// it, the first device whose name contains `device_name`
    ///
    /// Falls back to the first platform or device when nothing matches.
    pub fn select(platform_name: &str, device_name: &str) -> Result<(Self, Device), BackendError> {
        let platforms = Platform::list();
        if platforms.is_empty() {
            return Err("No OpenCL platforms found. Please install an OpenCL SDK".into());
        }

        let platform = platforms
            .iter()
            .copied()
            .find(|p| p.name().map(|n| n.contains(platform_name)).unwrap_or(false))
            .unwrap_or(platforms[0]);
        info!("PLATFORM: {}", platform.name().map_err(cl_err)?);

        let devices = Device::list_all(platform).map_err(cl_err)?;
        let device = devices
            .iter()
            .copied()
            .find(|d| d.name().map(|n| n.contains(device_name)).unwrap_or(false))
            .or_else(|| devices.first().copied())
            .ok_or_else(|| BackendError::new("No device found that matches the given criteria"))?;
        info!("DEVICE: {}", device.name().map_err(cl_err)?);

        Ok((Self::new(platform, device)?, device))
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

impl ComputeBackend for OclBackend {
    type Device = Device;
    type Program = Program;
    type Kernel = core::Kernel;
    type Arg<'a> = ArgVal<'a>;

    fn platform_name(&self, _device: &Device) -> Result<String, BackendError> {
        self.platform.name().map_err(cl_err)
    }

    fn device_name(&self, device: &Device) -> Result<String, BackendError> {
        device.name().map_err(cl_err)
    }

    fn device_kind(&self, device: &Device) -> Result<DeviceKind, BackendError> {
        kind_of(device)
    }

    fn compile_source(
        &self,
        device: &Device,
        source: &str,
        options: &str,
    ) -> Result<Program, BackendError> {
        Program::builder()
            .src(source)
            .devices(*device)
            .cmplr_opt(options)
            .build(&self.context)
            .map_err(cl_err)
    }

    fn load_binary(
        &self,
        device: &Device,
        binary: &[u8],
        options: &str,
    ) -> Result<Program, BackendError> {
        let binaries = [binary];
        Program::builder()
            .devices(*device)
            .binaries(&binaries)
            .cmplr_opt(options)
            .build(&self.context)
            .map_err(cl_err)
    }

    fn build_log(&self, program: &Program, device: &Device) -> Result<String, BackendError> {
        match program
            .build_info(*device, ProgramBuildInfo::BuildLog)
            .map_err(cl_err)?
        {
            ProgramBuildInfoResult::BuildLog(log) => Ok(log),
            other => Err(BackendError::new(format!("unexpected build info: {}", other))),
        }
    }

    fn binaries(&self, program: &Program) -> Result<Vec<Vec<u8>>, BackendError> {
        match program.info(ProgramInfo::Binaries).map_err(cl_err)? {
            ProgramInfoResult::Binaries(binaries) => Ok(binaries),
            other => Err(BackendError::new(format!("unexpected program info: {}", other))),
        }
    }

    fn create_kernel(&self, program: &Program, entry_point: &str) -> Result<core::Kernel, BackendError> {
        core::create_kernel(program.as_core(), entry_point).map_err(cl_err)
    }

    fn num_args(&self, kernel: &core::Kernel) -> Result<u32, BackendError> {
        match core::get_kernel_info(kernel, KernelInfo::NumArgs).map_err(cl_err)? {
            KernelInfoResult::NumArgs(count) => Ok(count),
            other => Err(BackendError::new(format!("unexpected kernel info: {}", other))),
        }
    }

    fn arg_name(&self, kernel: &core::Kernel, index: u32) -> Result<String, BackendError> {
        match core::get_kernel_arg_info(kernel, index, KernelArgInfo::Name, None).map_err(cl_err)? {
            KernelArgInfoResult::Name(name) => Ok(name),
            other => Err(BackendError::new(format!("unexpected argument info: {}", other))),
        }
    }

    fn set_arg(&self, kernel: &core::Kernel, index: u32, value: ArgVal<'_>) -> Result<(), BackendError> {
        core::set_kernel_arg(kernel, index, value).map_err(cl_err)
    }
}

/// Summary of one OpenCL device
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub platform_index: usize,
    pub platform_name: String,
    pub device_index: usize,
    pub name: String,
    pub kind: DeviceKind,
    pub vendor: String,
    pub compute_units: String,
    pub global_memory: String,
    pub max_clock_frequency: String,
    pub max_allocation: String,
    pub local_memory: String,
    pub gl_sharing: bool,
    pub available: String,
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device {}:", self.device_index)?;
        writeln!(f, "\t{:<22}{}", "Name:", self.name)?;
        writeln!(f, "\t{:<22}{}", "Type:", self.kind)?;
        writeln!(f, "\t{:<22}{}", "Vendor:", self.vendor)?;
        writeln!(f, "\t{:<22}{}", "Compute Units:", self.compute_units)?;
        writeln!(f, "\t{:<22}{}", "Global Memory:", self.global_memory)?;
        writeln!(f, "\t{:<22}{}", "Max Clock Frequency:", self.max_clock_frequency)?;
        writeln!(f, "\t{:<22}{}", "Max Allocation Size:", self.max_allocation)?;
        writeln!(f, "\t{:<22}{}", "Local Memory:", self.local_memory)?;
        writeln!(f, "\t{:<22}{}", "CL-GL interop:", self.gl_sharing as u8)?;
        write!(f, "\t{:<22}{}", "Available:", self.available)
    }
}

/// Every device on every platform
pub fn list_devices() -> Result<Vec<DeviceSummary>, BackendError> {
    let info = |device: &Device, kind: DeviceInfo| {
        device
            .info(kind)
            .map(|r| r.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    };

    let mut summaries = Vec::new();
    for (platform_index, platform) in Platform::list().into_iter().enumerate() {
        let platform_name = platform.name().map_err(cl_err)?;
        let devices = Device::list_all(platform).map_err(cl_err)?;
        for (device_index, device) in devices.into_iter().enumerate() {
            let extensions = info(&device, DeviceInfo::Extensions);
            let kind = kind_of(&device).unwrap_or(DeviceKind::Other);

            summaries.push(DeviceSummary {
                platform_index,
                platform_name: platform_name.clone(),
                device_index,
                name: device.name().map_err(cl_err)?,
                kind,
                vendor: device.vendor().map_err(cl_err)?,
                compute_units: info(&device, DeviceInfo::MaxComputeUnits),
                global_memory: info(&device, DeviceInfo::GlobalMemSize),
                max_clock_frequency: info(&device, DeviceInfo::MaxClockFrequency),
                max_allocation: info(&device, DeviceInfo::MaxMemAllocSize),
                local_memory: info(&device, DeviceInfo::LocalMemSize),
                gl_sharing: extensions.contains("cl_APPLE_gl_sharing")
                    || extensions.contains("cl_khr_gl_sharing"),
                available: info(&device, DeviceInfo::Available),
            });
        }
    }
    Ok(summaries)
}

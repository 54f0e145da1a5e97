//! Kernel build and rebuild engine
//!
//! A [`Kernel`] is one entry point in one source file. `build` compiles it
//! for a device through the binary cache, resolves the entry point and maps
//! argument names to indices. Later calls with unchanged build options and
//! device only re-apply argument bindings.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheOutcome, KernelCache};
use crate::compute::{ComputeBackend, DeviceIdentity, DeviceKind};
use crate::config::BuildConfig;
use crate::errors::{KernelError, Result};
use crate::paths::{absolute_path, create_inline_source_file, file_name};

/// Always passed to the compiler so argument names can be queried afterwards
pub const KERNEL_ARG_INFO_FLAG: &str = " -cl-kernel-arg-info";

/// Subdirectory of the cache directory holding materialized inline sources
pub const INLINE_SOURCE_DIR: &str = "inline";

/// Per-kernel customization points
///
/// Every method has a default, so a kernel implements only what it needs.
pub trait KernelHooks<B: ComputeBackend> {
    /// Options appended after the global options, e.g. `-DN=4`
    fn additional_options(&self) -> String {
        String::new()
    }

    /// Bind default argument values after a build
    fn bind_arguments(&self, _args: &mut ArgBinder<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Source text to use instead of reading the kernel's source path
    fn inline_source(&self) -> Option<String> {
        None
    }
}

impl<B: ComputeBackend> KernelHooks<B> for () {}

/// How a call to [`Kernel::build`] was satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Options and device unchanged; nothing was compiled or loaded
    UpToDate,
    /// Compiled from source and stored in the cache
    Compiled { path: PathBuf },
    /// Reloaded from a stored binary
    LoadedFromCache { path: PathBuf },
    /// Compiled from source with debug info; the cache was not used
    DebugCompiled,
}

/// Binds kernel arguments by name
pub struct ArgBinder<'a, B: ComputeBackend> {
    backend: &'a B,
    handle: &'a B::Kernel,
    args: &'a FxHashMap<String, u32>,
    file: &'a str,
}

impl<'a, B: ComputeBackend> ArgBinder<'a, B> {
    pub fn set(&mut self, name: &str, value: B::Arg<'_>) -> Result<()> {
        let index = *self
            .args
            .get(name)
            .ok_or_else(|| KernelError::UnknownArgument {
                file: self.file.to_string(),
                name: name.to_string(),
            })?;
        self.backend.set_arg(self.handle, index, value)?;
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    pub fn handle(&self) -> &B::Kernel {
        self.handle
    }
}

struct Target<B: ComputeBackend> {
    backend: Arc<B>,
    device: B::Device,
}

struct Built<B: ComputeBackend> {
    backend: Arc<B>,
    name: String,
    identity: DeviceIdentity,
    handle: B::Kernel,
    args: FxHashMap<String, u32>,
    options: String,
}

/// A compute kernel that builds itself on demand
pub struct Kernel<B: ComputeBackend, H = ()> {
    source_path: PathBuf,
    entry_point: String,
    hooks: H,
    target: Option<Target<B>>,
    built: Option<Built<B>>,
}

impl<B: ComputeBackend> Kernel<B, ()> {
    pub fn new(source_path: impl Into<PathBuf>, entry_point: impl Into<String>) -> Self {
        Self::with_hooks(source_path, entry_point, ())
    }
}

impl<B: ComputeBackend, H: KernelHooks<B>> Kernel<B, H> {
    pub fn with_hooks(
        source_path: impl Into<PathBuf>,
        entry_point: impl Into<String>,
        hooks: H,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            entry_point: entry_point.into(),
            hooks,
            target: None,
            built: None,
        }
    }

    /// Kernel whose source comes from [`KernelHooks::inline_source`]; it is
    /// written to `<cache dir>/inline/<entry point>_inline.cl` when built
    pub fn inline(entry_point: impl Into<String>, hooks: H) -> Self {
        Self::with_hooks(PathBuf::new(), entry_point, hooks)
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Options of the last successful build
    pub fn last_build_options(&self) -> Option<&str> {
        self.built.as_ref().map(|b| b.options.as_str())
    }

    pub fn handle(&self) -> Option<&B::Kernel> {
        self.built.as_ref().map(|b| &b.handle)
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.arg_index(name).is_some()
    }

    pub fn arg_index(&self, name: &str) -> Option<u32> {
        self.built.as_ref().and_then(|b| b.args.get(name).copied())
    }

    /// Argument names ordered by index
    pub fn arg_names(&self) -> Vec<&str> {
        let mut names: Vec<(&str, u32)> = self
            .built
            .iter()
            .flat_map(|b| b.args.iter().map(|(name, &idx)| (name.as_str(), idx)))
            .collect();
        names.sort_by_key(|&(_, idx)| idx);
        names.into_iter().map(|(name, _)| name).collect()
    }

    /// Build options for the given device type: global options, the
    /// kernel's own options, the argument info flag and, for CPU debugging,
    /// `-g -s "<absolute source path>"`
    pub fn build_options(&self, config: &BuildConfig, device_kind: DeviceKind) -> String {
        let source_path = self.effective_source_path(config);
        let mut options = config.global_options.clone();
        options.push_str(&self.hooks.additional_options());
        options.push_str(KERNEL_ARG_INFO_FLAG);
        if debug_enabled(config, device_kind) {
            options.push_str(&format!(
                " -g -s \"{}\"",
                absolute_path(&source_path).display()
            ));
        }
        options
    }

    /// Build for `device`, unless the last build used the same options on the
    /// same device
    ///
    /// Devices are told apart by platform and device name only, so a second
    /// device with the same names on the same platform counts as unchanged
    /// and keeps the existing handle.
    ///
    /// On failure the kernel keeps its previous handle, argument map and the
    /// device `rebuild` targets.
    pub fn build(
        &mut self,
        config: &BuildConfig,
        backend: &Arc<B>,
        device: &B::Device,
        set_args: bool,
    ) -> Result<BuildOutcome> {
        let identity = backend.device_identity(device)?;
        let device_kind = backend.device_kind(device)?;
        let options = self.build_options(config, device_kind);
        let source_path = self.effective_source_path(config);
        let name = file_name(&source_path.to_string_lossy());

        if let Some(built) = &self.built {
            if built.options == options && built.identity == identity {
                debug!("Kernel {} is up to date", name);
                if set_args {
                    self.bind_arguments()?;
                }
                return Ok(BuildOutcome::UpToDate);
            }
            info!("Rebuilding kernel {}", name);
        }

        // Until a build succeeds, `rebuild` retries the attempted device
        if self.built.is_none() {
            self.target = Some(Target {
                backend: Arc::clone(backend),
                device: device.clone(),
            });
        }

        if let Some(source) = self.hooks.inline_source() {
            let dir = config.cache_dir.join(INLINE_SOURCE_DIR);
            create_inline_source_file(&dir, &source, &self.entry_point).map_err(|source| {
                KernelError::SourceIo {
                    path: source_path.clone(),
                    source,
                }
            })?;
        }

        let (program, outcome) = if debug_enabled(config, device_kind) {
            let program = compile_for_debugging(backend.as_ref(), device, &source_path, &options)?;
            (program, BuildOutcome::DebugCompiled)
        } else {
            let cached = KernelCache::new(&config.cache_dir).load_or_build(
                backend.as_ref(),
                device,
                &source_path,
                &options,
            )?;
            let outcome = match cached.outcome {
                CacheOutcome::Hit { path } => BuildOutcome::LoadedFromCache { path },
                CacheOutcome::Miss { path } => BuildOutcome::Compiled { path },
            };
            (cached.program, outcome)
        };

        let handle = backend
            .create_kernel(&program, &self.entry_point)
            .map_err(|err| KernelError::Handle {
                file: name.clone(),
                entry_point: self.entry_point.clone(),
                message: err.message,
            })?;
        let args = introspect_arguments(backend.as_ref(), &handle, &self.entry_point)?;
        debug!("Kernel {} has {} argument(s)", self.entry_point, args.len());

        self.target = Some(Target {
            backend: Arc::clone(backend),
            device: device.clone(),
        });
        self.built = Some(Built {
            backend: Arc::clone(backend),
            name,
            identity,
            handle,
            args,
            options,
        });

        if set_args {
            self.bind_arguments()?;
        }
        Ok(outcome)
    }

    /// Build again for the device of the previous `build` call, e.g. after a
    /// value feeding [`KernelHooks::additional_options`] changed
    pub fn rebuild(&mut self, config: &BuildConfig, set_args: bool) -> Result<BuildOutcome> {
        let (backend, device) = match &self.target {
            Some(target) => (Arc::clone(&target.backend), target.device.clone()),
            None => {
                return Err(KernelError::NotBuilt {
                    file: self.display_name(),
                })
            }
        };
        self.build(config, &backend, &device, set_args)
    }

    /// Bind one argument by name
    pub fn set_arg(&self, name: &str, value: B::Arg<'_>) -> Result<()> {
        match &self.built {
            Some(built) => self.binder(built).set(name, value),
            None => Err(KernelError::UnknownArgument {
                file: self.display_name(),
                name: name.to_string(),
            }),
        }
    }

    /// Run [`KernelHooks::bind_arguments`] against the current handle
    pub fn bind_arguments(&self) -> Result<()> {
        let built = self.built.as_ref().ok_or_else(|| KernelError::NotBuilt {
            file: self.display_name(),
        })?;
        let mut binder = self.binder(built);
        self.hooks.bind_arguments(&mut binder)
    }

    fn binder<'a>(&'a self, built: &'a Built<B>) -> ArgBinder<'a, B> {
        ArgBinder {
            backend: built.backend.as_ref(),
            handle: &built.handle,
            args: &built.args,
            file: built.name.as_str(),
        }
    }

    fn effective_source_path(&self, config: &BuildConfig) -> PathBuf {
        if self.hooks.inline_source().is_some() {
            config
                .cache_dir
                .join(INLINE_SOURCE_DIR)
                .join(format!("{}_inline.cl", self.entry_point))
        } else {
            self.source_path.clone()
        }
    }

    fn display_name(&self) -> String {
        if self.source_path.as_os_str().is_empty() {
            format!("{}_inline.cl", self.entry_point)
        } else {
            file_name(&self.source_path.to_string_lossy())
        }
    }
}

fn debug_enabled(config: &BuildConfig, device_kind: DeviceKind) -> bool {
    config.cpu_debug && device_kind == DeviceKind::Cpu
}

/// Compile the unexpanded source directly, leaving includes to the driver
fn compile_for_debugging<B: ComputeBackend>(
    backend: &B,
    device: &B::Device,
    source_path: &Path,
    options: &str,
) -> Result<B::Program> {
    let name = file_name(&source_path.to_string_lossy());
    let source = std::fs::read_to_string(source_path).map_err(|source| KernelError::SourceIo {
        path: source_path.to_path_buf(),
        source,
    })?;

    info!("Building kernel {} for debugging", name);
    let program = backend
        .compile_source(device, &source, options)
        .map_err(|err| KernelError::Build {
            file: name.clone(),
            log: err.message,
        })?;

    let build_log = backend.build_log(&program, device)?;
    if build_log.len() > 2 {
        info!("[{} build log]: {}", source_path.display(), build_log);
    }
    Ok(program)
}

fn introspect_arguments<B: ComputeBackend>(
    backend: &B,
    handle: &B::Kernel,
    entry_point: &str,
) -> Result<FxHashMap<String, u32>> {
    let introspection_err = |err: crate::compute::BackendError| KernelError::Introspection {
        entry_point: entry_point.to_string(),
        message: err.message,
    };

    let count = backend.num_args(handle).map_err(introspection_err)?;
    (0..count)
        .map(|index| {
            backend
                .arg_name(handle, index)
                .map(|name| (name, index))
                .map_err(introspection_err)
        })
        .collect()
}

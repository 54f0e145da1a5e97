use anyhow::Context;
use clap::{Parser, Subcommand};
use clcache_core::cache::{cache_file_name, fingerprint, format_fingerprint, KernelCache};
use clcache_core::config::BuildConfig;
use clcache_core::kernel::KERNEL_ARG_INFO_FLAG;
use clcache_core::source::SourceExpander;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// clcache - content-addressed cache for compiled compute kernels
#[derive(Parser, Debug)]
#[command(name = "clcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a clcache.yaml or clcache.json configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a kernel source with all of its includes inlined
    Expand {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the cache fingerprint and binary file name of a build
    Fingerprint {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Kernel build options, e.g. "-DN=4"
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        options: String,

        /// Platform name as reported by the driver
        #[arg(long)]
        platform: String,

        /// Device name as reported by the driver
        #[arg(long)]
        device: String,
    },

    /// List stored kernel binaries
    Cache {
        /// Cache directory (default: the configured one)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        #[arg(value_name = "FILE", default_value = "clcache.yaml")]
        path: PathBuf,
    },

    /// List OpenCL platforms and devices
    #[cfg(feature = "opencl")]
    Devices,

    /// Build a kernel through the cache and print its arguments
    #[cfg(feature = "opencl")]
    Build {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Entry point name
        #[arg(long)]
        entry: String,

        /// Kernel build options, e.g. "-DN=4"
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        options: String,

        /// Substring of the platform name to use
        #[arg(long, default_value = "")]
        platform: String,

        /// Substring of the device name to use
        #[arg(long, default_value = "")]
        device: String,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output can be piped
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    debug!("Cache directory: {}", config.cache_dir.display());

    match cli.command {
        Command::Expand { file } => expand(&file),
        Command::Fingerprint {
            file,
            options,
            platform,
            device,
        } => print_fingerprint(&config, &file, &options, &platform, &device),
        Command::Cache { dir } => list_cache(dir.as_deref().unwrap_or(&config.cache_dir)),
        Command::Init { path } => init_config(&path),
        #[cfg(feature = "opencl")]
        Command::Devices => opencl::devices(),
        #[cfg(feature = "opencl")]
        Command::Build {
            file,
            entry,
            options,
            platform,
            device,
        } => opencl::build(&config, file, entry, &options, &platform, &device),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BuildConfig> {
    match path {
        Some(path) => BuildConfig::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display())),
        None => Ok(BuildConfig::from_env_or_default()),
    }
}

/// Kernel-specific options as a kernel's hooks would contribute them
fn kernel_options(options: &str) -> String {
    let options = options.trim();
    if options.is_empty() {
        String::new()
    } else {
        format!(" {}", options)
    }
}

fn expand(file: &Path) -> anyhow::Result<()> {
    let mut expander = SourceExpander::new();
    let source = expander
        .expand(file)
        .with_context(|| format!("Failed to expand {}", file.display()))?;
    debug!("{} file(s) inlined", expander.included_files().len());
    print!("{}", source);
    Ok(())
}

fn print_fingerprint(
    config: &BuildConfig,
    file: &Path,
    options: &str,
    platform: &str,
    device: &str,
) -> anyhow::Result<()> {
    let source = clcache_core::expand_source(file)
        .with_context(|| format!("Failed to expand {}", file.display()))?;

    let mut full_options = config.global_options.clone();
    full_options.push_str(&kernel_options(options));
    full_options.push_str(KERNEL_ARG_INFO_FLAG);

    let hash = fingerprint(&source, &full_options, platform, device);
    println!("options:     {}", full_options.trim_start());
    println!("fingerprint: {}", format_fingerprint(hash));
    println!(
        "cache file:  {}",
        config.cache_dir.join(cache_file_name(file, hash)).display()
    );
    Ok(())
}

fn list_cache(dir: &Path) -> anyhow::Result<()> {
    let entries = KernelCache::new(dir)
        .entries()
        .with_context(|| format!("Failed to read cache directory {}", dir.display()))?;

    if entries.is_empty() {
        println!("No cached kernels in {}", dir.display());
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{:<32} {:<18} {:>10} bytes",
            entry.source_name, entry.fingerprint, entry.size
        );
    }
    println!("{} cached kernel(s) in {}", entries.len(), dir.display());
    Ok(())
}

fn init_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    BuildConfig::init_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

#[cfg(feature = "opencl")]
mod opencl {
    use super::kernel_options;
    use anyhow::Context;
    use clcache_core::compute::opencl::{list_devices, OclBackend};
    use clcache_core::config::BuildConfig;
    use clcache_core::kernel::{Kernel, KernelHooks};
    use std::path::PathBuf;
    use std::sync::Arc;

    struct ExtraOptions(String);

    impl KernelHooks<OclBackend> for ExtraOptions {
        fn additional_options(&self) -> String {
            self.0.clone()
        }
    }

    pub fn devices() -> anyhow::Result<()> {
        let devices = list_devices().context("Failed to query OpenCL devices")?;
        let mut last_platform = None;
        for device in &devices {
            if last_platform != Some(device.platform_index) {
                println!("Platform {}: {}", device.platform_index, device.platform_name);
                last_platform = Some(device.platform_index);
            }
            println!("{}", device);
        }
        Ok(())
    }

    pub fn build(
        config: &BuildConfig,
        file: PathBuf,
        entry: String,
        options: &str,
        platform: &str,
        device: &str,
    ) -> anyhow::Result<()> {
        let (backend, device) = OclBackend::select(platform, device)?;
        let backend = Arc::new(backend);

        let mut kernel: Kernel<OclBackend, ExtraOptions> =
            Kernel::with_hooks(file, entry, ExtraOptions(kernel_options(options)));
        let outcome = kernel.build(config, &backend, &device, false)?;
        println!("{:?}", outcome);

        for name in kernel.arg_names() {
            if let Some(index) = kernel.arg_index(name) {
                println!("  [{}] {}", index, name);
            }
        }
        Ok(())
    }
}

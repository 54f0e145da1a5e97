use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_CACHE_DIR;
use crate::errors::KernelError;

/// Environment variable that overrides the cache directory
pub const CACHE_DIR_ENV: &str = "CLCACHE_CACHE_DIR";

/// Settings shared by every kernel build in a process
///
/// Kernels read this at each `build`/`rebuild`. Changing it does not touch
/// already built kernels until their next build compares the derived options
/// against the ones they were built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Directory of cached kernel binaries (default: cache/kernel_binaries)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Options prepended to every kernel's build options (default: empty)
    #[serde(default)]
    pub global_options: String,

    /// Build from source with debug info on CPU devices, bypassing the cache
    /// (default: false)
    #[serde(default)]
    pub cpu_debug: bool,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            global_options: String::new(),
            cpu_debug: false,
        }
    }
}

impl BuildConfig {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_global_options(mut self, options: impl Into<String>) -> Self {
        self.global_options = options.into();
        self
    }

    pub fn with_cpu_debug(mut self, enabled: bool) -> Self {
        self.cpu_debug = enabled;
        self
    }

    /// Load configuration from a YAML (`.yaml`/`.yml`) or JSON file
    pub fn from_file(path: &Path) -> Result<Self, KernelError> {
        let content = std::fs::read_to_string(path).map_err(|source| KernelError::SourceIo {
            path: path.to_path_buf(),
            source,
        })?;

        if is_yaml(path) {
            serde_yaml::from_str(&content).map_err(|e| KernelError::Config(e.to_string()))
        } else {
            serde_json::from_str(&content).map_err(|e| KernelError::Config(e.to_string()))
        }
    }

    /// Default configuration with `CLCACHE_CACHE_DIR` applied when set
    pub fn from_env_or_default() -> Self {
        let config = Self::default();
        match std::env::var_os(CACHE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => config.with_cache_dir(dir),
            _ => config,
        }
    }

    /// Write the default configuration to a file, in the format its extension implies
    pub fn init_file(path: &Path) -> Result<(), KernelError> {
        let config = BuildConfig::default();
        let content = if is_yaml(path) {
            serde_yaml::to_string(&config).map_err(|e| KernelError::Config(e.to_string()))?
        } else {
            serde_json::to_string_pretty(&config).map_err(|e| KernelError::Config(e.to_string()))?
        };
        std::fs::write(path, content).map_err(|source| KernelError::SourceIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

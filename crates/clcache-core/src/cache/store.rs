use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::compute::ComputeBackend;
use crate::errors::{KernelError, Result};
use crate::paths::file_name;
use crate::source::expand_source;

use super::{fingerprint, format_fingerprint, CacheError, BINARY_EXTENSION};

/// Which path produced a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// A stored binary was found and reloaded
    Hit { path: PathBuf },
    /// The source was compiled and its binary stored at `path`
    Miss { path: PathBuf },
}

impl CacheOutcome {
    pub fn path(&self) -> &Path {
        match self {
            CacheOutcome::Hit { path } | CacheOutcome::Miss { path } => path,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit { .. })
    }
}

/// A ready program plus how it was obtained
#[derive(Debug)]
pub struct CachedProgram<P> {
    pub program: P,
    pub outcome: CacheOutcome,
    pub fingerprint: usize,
    pub build_log: String,
}

/// A stored binary found in the cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub path: PathBuf,
    /// Name of the kernel source the binary was built from
    pub source_name: String,
    pub fingerprint: String,
    pub size: u64,
}

/// `<file name>.<hex fingerprint>.bin`
pub fn cache_file_name(source_path: &Path, fingerprint: usize) -> String {
    format!(
        "{}.{}.{}",
        file_name(&source_path.to_string_lossy()),
        format_fingerprint(fingerprint),
        BINARY_EXTENSION
    )
}

/// Create the cache directory and any missing parents; an existing directory
/// is not an error
pub fn ensure_cache_dir(dir: &Path) -> std::result::Result<(), CacheError> {
    std::fs::create_dir_all(dir).map_err(|source| CacheError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Directory of fingerprinted kernel binaries
///
/// Writers are not coordinated across processes: two processes building the
/// same fingerprint race on the same file and the last writer wins.
#[derive(Debug, Clone)]
pub struct KernelCache {
    cache_dir: PathBuf,
}

impl KernelCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn entry_path(&self, source_path: &Path, fingerprint: usize) -> PathBuf {
        self.cache_dir.join(cache_file_name(source_path, fingerprint))
    }

    /// Expanded source and fingerprint of a build without touching the cache
    pub fn fingerprint_of<B: ComputeBackend>(
        &self,
        backend: &B,
        device: &B::Device,
        source_path: &Path,
        options: &str,
    ) -> Result<(String, usize)> {
        let source = expand_source(source_path)?;
        let identity = backend.device_identity(device)?;
        let hash = fingerprint(&source, options, &identity.platform, &identity.device);
        Ok((source, hash))
    }

    /// Reload the stored binary for this build, or compile the source and
    /// store its binary
    pub fn load_or_build<B: ComputeBackend>(
        &self,
        backend: &B,
        device: &B::Device,
        source_path: &Path,
        options: &str,
    ) -> Result<CachedProgram<B::Program>> {
        let name = file_name(&source_path.to_string_lossy());
        let (source, hash) = self.fingerprint_of(backend, device, source_path, options)?;
        debug!("Fingerprint of {} is {}", name, format_fingerprint(hash));

        ensure_cache_dir(&self.cache_dir)?;
        let binary_path = self.entry_path(source_path, hash);

        if binary_path.is_file() {
            info!("Loading hashed kernel {}", binary_path.display());
            let binary = std::fs::read(&binary_path).map_err(|source| CacheError::Read {
                path: binary_path.clone(),
                source,
            })?;

            let program = backend
                .load_binary(device, &binary, options)
                .map_err(|err| CacheError::Reload {
                    path: binary_path.clone(),
                    message: err.message,
                })?;
            let build_log = backend.build_log(&program, device)?;

            return Ok(CachedProgram {
                program,
                outcome: CacheOutcome::Hit { path: binary_path },
                fingerprint: hash,
                build_log,
            });
        }

        info!("Building kernel {}", name);
        let program = backend
            .compile_source(device, &source, options)
            .map_err(|err| KernelError::Build {
                file: name.clone(),
                log: err.message,
            })?;

        let build_log = backend.build_log(&program, device)?;
        if build_log.len() > 2 {
            info!("[{} build log]: {}", name, build_log);
        }

        let binaries = backend.binaries(&program)?;
        if binaries.len() != 1 {
            return Err(CacheError::BinaryCount {
                count: binaries.len(),
            }
            .into());
        }

        write_binary(&binary_path, &binaries[0])?;
        info!("Created cached kernel {}", binary_path.display());

        Ok(CachedProgram {
            program,
            outcome: CacheOutcome::Miss { path: binary_path },
            fingerprint: hash,
            build_log,
        })
    }

    /// Stored binaries, sorted by path
    ///
    /// Files not following the `<name>.<hex>.bin` pattern are ignored.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        if !self.cache_dir.is_dir() {
            return Ok(Vec::new());
        }

        let read_err = |source| CacheError::Read {
            path: self.cache_dir.clone(),
            source,
        };

        let mut entries = Vec::new();
        for dir_entry in std::fs::read_dir(&self.cache_dir).map_err(read_err)? {
            let dir_entry = dir_entry.map_err(read_err)?;
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }

            let file = dir_entry.file_name().to_string_lossy().to_string();
            if let Some((source_name, fingerprint)) = parse_cache_file_name(&file) {
                let size = dir_entry.metadata().map_err(read_err)?.len();
                entries.push(CacheEntry {
                    path,
                    source_name: source_name.to_string(),
                    fingerprint: fingerprint.to_string(),
                    size,
                });
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

fn write_binary(path: &Path, binary: &[u8]) -> std::result::Result<(), CacheError> {
    let write_err = |source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).map_err(write_err)?;
    file.write_all(binary).map_err(write_err)?;
    file.flush().map_err(write_err)?;
    Ok(())
}

fn parse_cache_file_name(file: &str) -> Option<(&str, &str)> {
    let stem = file.strip_suffix(BINARY_EXTENSION)?.strip_suffix('.')?;
    let (source_name, fingerprint) = stem.rsplit_once('.')?;
    let is_hex = !fingerprint.is_empty() && fingerprint.chars().all(|c| c.is_ascii_hexdigit());
    if source_name.is_empty() || !is_hex {
        return None;
    }
    Some((source_name, fingerprint))
}

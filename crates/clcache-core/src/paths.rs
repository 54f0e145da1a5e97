//! Path and file name helpers
//!
//! Kernel paths are handled in forward-slash form so that cache keys and
//! include bookkeeping do not depend on the host separator.

use std::path::{Path, PathBuf};

/// Extensions of files the source expander inlines
pub const KERNEL_SOURCE_EXTENSIONS: [&str; 2] = [".cl", ".h"];

/// Replace every backslash with a forward slash
pub fn unixify_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Lexically normalize a path: unixify, drop `.` segments, fold `..` into
/// the preceding segment where possible
pub fn normalize_path(path: &str) -> String {
    let unix = unixify_path(path);
    let absolute = unix.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for part in unix.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Final path component, e.g. `kernels/render.cl` -> `render.cl`
pub fn file_name(path: &str) -> String {
    let unix = unixify_path(path);
    match unix.rfind('/') {
        Some(idx) => unix[idx + 1..].to_string(),
        None => unix,
    }
}

/// Directory part of a unixified path, `.` when there is none
pub fn parent_dir(path: &str) -> String {
    let unix = unixify_path(path);
    match unix.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => unix[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// Resolve a path against the current directory
///
/// Purely lexical: the file does not need to exist and symlinks are kept.
pub fn absolute_path(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    PathBuf::from(normalize_path(&joined.to_string_lossy()))
}

pub fn ends_with(s: &str, suffix: &str) -> bool {
    s.ends_with(suffix)
}

/// Whether a file name is kernel source the expander should inline
pub fn is_kernel_source(name: &str) -> bool {
    KERNEL_SOURCE_EXTENSIONS
        .iter()
        .any(|ext| ends_with(name, ext))
}

/// Write inline kernel source to `<dir>/<entry_point>_inline.cl`
pub fn create_inline_source_file(
    dir: &Path,
    source: &str,
    entry_point: &str,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let target = dir.join(format!("{}_inline.cl", entry_point));
    std::fs::write(&target, source)?;
    Ok(target)
}

pub fn is_nvidia_platform(platform_name: &str) -> bool {
    platform_name.contains("NVIDIA")
}

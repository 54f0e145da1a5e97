//! Include expansion for kernel sources
//!
//! Some drivers cannot resolve `#include` on their own (and a cache key must
//! cover included files anyway), so user includes are inlined textually into
//! one flat source. Includes of anything other than `.cl`/`.h` files are left
//! in place for the compiler.

use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{KernelError, Result};
use crate::paths::{is_kernel_source, normalize_path, parent_dir};

/// Expand `path` and every kernel source it includes into a single string
///
/// Each call starts with an empty include set.
pub fn expand_source(path: impl AsRef<Path>) -> Result<String> {
    SourceExpander::new().expand(path)
}

/// Recursive include expander
///
/// Tracks already visited files so a file included twice, or through a
/// cycle, contributes its content only once.
#[derive(Debug, Default)]
pub struct SourceExpander {
    visited: FxHashSet<String>,
    order: Vec<PathBuf>,
}

impl SourceExpander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref().to_string_lossy();
        self.expand_file(&path)
    }

    /// Files that contributed to the output, in the order they were first read
    pub fn included_files(&self) -> &[PathBuf] {
        &self.order
    }

    fn expand_file(&mut self, path: &str) -> Result<String> {
        let path = normalize_path(path);

        let bytes = std::fs::read(&path).map_err(|source| KernelError::SourceIo {
            path: PathBuf::from(&path),
            source,
        })?;

        if !self.visited.insert(path.clone()) {
            debug!("Skipping already included {}", path);
            return Ok(String::new());
        }
        self.order.push(PathBuf::from(&path));

        let content = String::from_utf8_lossy(&bytes);
        let dir = parent_dir(&path);
        let mut output = String::with_capacity(content.len());

        for line in content.lines() {
            match include_target(line) {
                Some(name) if is_kernel_source(name) => {
                    let nested = self.expand_file(&format!("{}/{}", dir, name))?;
                    output.push_str(&nested);
                    output.push('\n');
                }
                _ => {
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }

        Ok(output)
    }
}

/// File name of an `#include "x"` or `#include <x>` directive
fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?;
    let rest = rest.trim_start().strip_prefix("include")?;
    let rest = rest.trim_start();

    let close = match rest.chars().next()? {
        '"' => '"',
        '<' => '>',
        _ => return None,
    };
    let inner = &rest[1..];
    let end = inner.find(close)?;
    Some(&inner[..end])
}

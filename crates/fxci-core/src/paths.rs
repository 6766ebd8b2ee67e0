//! Path derivation: default roots and artifact locations.

use crate::config::Configuration;
use crate::platform::HostOs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Remove the last `n` components of `path`.
///
/// `n == 0` returns the path unchanged. Stops at the filesystem root if the
/// path has fewer than `n` components.
pub fn nth_dirname(path: &Path, n: usize) -> PathBuf {
    let mut out = path;
    for _ in 0..n {
        match out.parent() {
            Some(parent) => out = parent,
            None => break,
        }
    }
    out.to_path_buf()
}

/// Absolute form of `path` with `.` and `..` folded lexically.
///
/// The path does not need to exist.
pub fn normalize(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Source root derived from the running program's own location.
pub fn default_source_root(program: &Path, depth: usize) -> io::Result<PathBuf> {
    Ok(nth_dirname(&normalize(program)?, depth))
}

/// External tree checkout location under a source root: `<root>/_/fx`.
pub fn default_external_root(source_root: &Path) -> PathBuf {
    source_root.join("_").join("fx")
}

/// Read-only paths the overlay step works between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocations {
    /// Locally built runtime: `<source root>/bin/Product/<OS>.<arch>.<build type>`.
    pub core_root: PathBuf,

    /// External tree runtime output: `<external root>/bin/runtime`.
    pub runtime_dir: PathBuf,
}

impl ArtifactLocations {
    pub fn resolve(config: &Configuration, host: HostOs) -> Self {
        let product = format!("{}.{}.{}", host.product_name(), config.arch, config.build_type);
        Self {
            core_root: config.source_root.join("bin").join("Product").join(product),
            runtime_dir: config.external_root.join("bin").join("runtime"),
        }
    }
}

/// Helper tool directory holding the `dotnet` used for RID queries.
pub fn dotnet_cli_dir(source_root: &Path) -> PathBuf {
    source_root.join("Tools").join("dotnetcli")
}

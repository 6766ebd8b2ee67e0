//! Overlay of the locally built runtime into the external tree.

use crate::error::{HarnessError, Result};
use crate::fs_tree::copy_tree;
use crate::paths::ArtifactLocations;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// What an overlay copied and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overlay {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub files: u64,
}

/// The single entry under the runtime output directory.
///
/// Anything other than exactly one entry is an error; no destination is
/// ever synthesized.
pub fn overlay_destination(runtime_dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(runtime_dir)
        .map_err(|source| HarnessError::fs(runtime_dir, source))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|source| HarnessError::fs(runtime_dir, source))?;

    match entries.as_slice() {
        [only] => Ok(only.path()),
        _ => Err(HarnessError::OverlayDestination {
            dir: runtime_dir.to_path_buf(),
            found: entries.len(),
        }),
    }
}

/// Copy the local runtime tree over the external tree's runtime.
pub fn install(locations: &ArtifactLocations) -> Result<Overlay> {
    let destination = overlay_destination(&locations.runtime_dir)?;
    info!(
        "[overlay] {} -> {}",
        locations.core_root.display(),
        destination.display()
    );

    let files = copy_tree(&locations.core_root, &destination)?;
    info!(files, "Overlay complete");

    Ok(Overlay {
        source: locations.core_root.clone(),
        destination,
        files,
    })
}

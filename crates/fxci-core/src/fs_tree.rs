//! Recursive directory removal and copy.

use crate::error::{HarnessError, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Remove a directory tree, tolerating read-only entries.
///
/// On a first failure every entry under `path` has its permissions widened
/// and the removal is retried exactly once. A missing `path` is not an error.
pub fn remove_tree(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => return Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Delete failed, widening permissions and retrying");
        }
    }

    widen_permissions(path);

    fs::remove_dir_all(path).map_err(|source| HarnessError::fs(path, source))
}

/// Best effort: make every entry owner-writable (and directories traversable).
fn widen_permissions(path: &Path) {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Cannot stat");
            return;
        }
    };
    if meta.file_type().is_symlink() {
        return;
    }

    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let owner = if meta.is_dir() { 0o700 } else { 0o600 };
        perms.set_mode(perms.mode() | owner);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }
    if let Err(err) = fs::set_permissions(path, perms) {
        debug!(path = %path.display(), error = %err, "Cannot widen permissions");
    }

    if meta.is_dir() {
        let Ok(entries) = fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            widen_permissions(&entry.path());
        }
    }
}

/// Copy the contents of `src` into `dst`, merging with what is there.
///
/// Directories are created as needed; same-named files are overwritten.
/// Symlinks are followed and their targets copied. Returns the number of
/// files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    if !src.is_dir() {
        return Err(HarnessError::fs(
            src,
            io::Error::new(io::ErrorKind::NotFound, "source directory not found"),
        ));
    }

    fs::create_dir_all(dst).map_err(|source| HarnessError::fs(dst, source))?;

    let mut copied = 0;
    let entries = fs::read_dir(src).map_err(|source| HarnessError::fs(src, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| HarnessError::fs(src, source))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        // Follows symlinks, so a link to a directory is copied as a directory.
        let meta = fs::metadata(&from).map_err(|source| HarnessError::fs(&from, source))?;

        if meta.is_dir() {
            copied += copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|source| HarnessError::fs(&to, source))?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_remove_tree_missing_path_is_ok() {
        let dir = tempdir().unwrap();
        remove_tree(&dir.path().join("nothing-here")).unwrap();
    }

    #[test]
    fn test_remove_tree_with_read_only_entries() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("fx");
        let locked = root.join("obj").join("locked");
        fs::create_dir_all(&locked).unwrap();

        let file = locked.join("ref.dll");
        fs::write(&file, b"binary").unwrap();
        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();
        }

        remove_tree(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_remove_tree_fails_when_retry_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-directory");
        fs::write(&file, b"plain file").unwrap();

        let err = remove_tree(&file).unwrap_err();

        match err {
            HarnessError::Filesystem { path, .. } => assert_eq!(path, file),
            other => panic!("expected Filesystem error, got {other:?}"),
        }
        assert!(file.exists());
    }

    #[test]
    fn test_copy_tree_merges_and_overwrites() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("coreclr.so"), b"new").unwrap();
        fs::write(src.join("lib").join("System.Private.CoreLib.dll"), b"corelib").unwrap();

        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("coreclr.so"), b"old").unwrap();
        fs::write(dst.join("keep.txt"), b"untouched").unwrap();

        let copied = copy_tree(&src, &dst).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read(dst.join("coreclr.so")).unwrap(), b"new");
        assert_eq!(fs::read(dst.join("keep.txt")).unwrap(), b"untouched");
        assert!(dst.join("lib").join("System.Private.CoreLib.dll").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_follows_directory_symlinks() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("real")).unwrap();
        fs::write(src.join("real").join("libfoo.so"), b"native").unwrap();
        std::os::unix::fs::symlink("real", src.join("alias")).unwrap();

        let copied = copy_tree(&src, &dst).unwrap();

        assert_eq!(copied, 2);
        let alias = dst.join("alias");
        assert!(!fs::symlink_metadata(&alias).unwrap().file_type().is_symlink());
        assert_eq!(fs::read(alias.join("libfoo.so")).unwrap(), b"native");
        assert_eq!(fs::read(dst.join("real").join("libfoo.so")).unwrap(), b"native");
    }

    #[test]
    fn test_copy_tree_missing_source_fails() {
        let dir = tempdir().unwrap();
        let err = copy_tree(&dir.path().join("missing"), &dir.path().join("dst")).unwrap_err();
        assert!(matches!(err, HarnessError::Filesystem { .. }));
    }
}

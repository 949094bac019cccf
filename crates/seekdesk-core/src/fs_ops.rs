//! Copy/remove helpers shared by backup, install and restore.

use std::io;
use std::path::Path;

use log::info;

pub(crate) fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else {
            std::fs::copy(&src_path, &dest_path).map_err(|error| {
                io::Error::new(
                    error.kind(),
                    format!("{} -> {}: {error}", src_path.display(), dest_path.display()),
                )
            })?;
        }
    }
    Ok(())
}

/// Copy a file or a whole directory tree.
pub(crate) fn copy_entry(src: &Path, dest: &Path) -> io::Result<()> {
    if src.is_dir() {
        copy_dir_recursive(src, dest)
    } else {
        std::fs::copy(src, dest).map(|_| ())
    }
}

/// Remove a file or directory tree; a missing path is not an error.
pub(crate) fn remove_entry(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

/// Put `src` at `dest`: directories are removed and re-copied, files are
/// overwritten. The running updater binary is swapped via `self-replace`.
pub(crate) fn replace_entry(src: &Path, dest: &Path) -> io::Result<()> {
    if src.is_file() && is_current_exe(dest) {
        info!("Replacing running updater {}", dest.display());
        return self_replace::self_replace(src);
    }

    if src.is_dir() || dest.is_dir() {
        remove_entry(dest)?;
    }
    copy_entry(src, dest)
}

fn is_current_exe(path: &Path) -> bool {
    let Ok(exe) = std::env::current_exe().and_then(std::fs::canonicalize) else {
        return false;
    };
    std::fs::canonicalize(path).is_ok_and(|path| path == exe)
}

use std::path::Path;

use log::{debug, warn};

use crate::error::UpdateError;

fn corrupt(context: &str, error: impl std::fmt::Display) -> UpdateError {
    UpdateError::CorruptArchive(format!("{context}: {error}"))
}

/// Extract `zip_path` into `dest`.
///
/// Entries that would land outside `dest` are skipped. Any read or write
/// failure is reported as a corrupt archive.
pub(crate) fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, UpdateError> {
    let file = std::fs::File::open(zip_path)
        .map_err(|error| corrupt(&format!("failed to open {}", zip_path.display()), error))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|error| corrupt("failed to read zip archive", error))?;

    std::fs::create_dir_all(dest)
        .map_err(|error| corrupt("failed to create extraction directory", error))?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| corrupt("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                corrupt(&format!("failed to create {}", out_path.display()), error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                corrupt(&format!("failed to create {}", parent.display()), error)
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            corrupt(&format!("failed to create {}", out_path.display()), error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            corrupt(&format!("failed to extract {}", out_path.display()), error)
        })?;
        extracted += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extracted {extracted} file(s) to {}", dest.display());
    Ok(extracted)
}

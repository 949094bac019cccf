use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::version::Version;

/// The installed version, persisted as a single line of UTF-8 text.
#[derive(Debug, Clone)]
pub struct VersionStore {
    path: PathBuf,
}

impl VersionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the installed version.
    ///
    /// A missing or unparsable file reads as `0.0.0` (a fresh install).
    #[must_use]
    pub fn read(&self) -> Version {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No version file at {}, assuming 0.0.0", self.path.display());
                return Version::zero();
            }
            Err(error) => {
                warn!(
                    "Failed to read version file {}: {error}. Assuming 0.0.0",
                    self.path.display()
                );
                return Version::zero();
            }
        };

        raw.trim().parse().unwrap_or_else(|error| {
            warn!(
                "Unparsable version '{}' in {}: {error}. Assuming 0.0.0",
                raw.trim(),
                self.path.display()
            );
            Version::zero()
        })
    }

    /// Replace the persisted version.
    ///
    /// The value is written to a sibling temp file and renamed over the
    /// target, so readers see either the old or the new value.
    ///
    /// # Errors
    /// Returns an error if the temp file cannot be written or renamed.
    pub fn write(&self, version: impl Display) -> std::io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp = tempfile::Builder::new()
            .prefix(".version-")
            .tempfile_in(dir)?;
        write!(temp, "{version}")?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|error| error.error)?;

        debug!("Recorded version {version} in {}", self.path.display());
        Ok(())
    }
}

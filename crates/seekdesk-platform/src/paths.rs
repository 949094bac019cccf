use std::path::{Path, PathBuf};
use thiserror::Error;

const LOG_FILE: &str = "update.log";
const CONFIG_FILE: &str = "updater.json";
const LOCK_FILE: &str = ".update.lock";
const SCRATCH_DIR: &str = "seekdesk-update";

#[derive(Debug, Error)]
pub enum AppPathsError {
    #[error("Could not determine the updater executable location: {0}")]
    ExecutableUnavailable(#[source] std::io::Error),
    #[error("Updater executable has no parent directory: {0}")]
    NoParent(PathBuf),
}

/// Filesystem locations for one installation.
///
/// Everything the updater owns (log, config, lock, backups) sits beside the
/// install root. Scratch download data goes under the user cache directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub install_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl AppPaths {
    /// Paths for the installation the running updater belongs to.
    ///
    /// # Errors
    /// Returns an error when the current executable path cannot be resolved.
    pub fn current() -> Result<Self, AppPathsError> {
        let exe = std::env::current_exe().map_err(AppPathsError::ExecutableUnavailable)?;
        let install_dir = exe
            .parent()
            .ok_or_else(|| AppPathsError::NoParent(exe.clone()))?
            .to_path_buf();
        Ok(Self::for_install_dir(install_dir))
    }

    #[must_use]
    pub fn for_install_dir(install_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(SCRATCH_DIR);
        Self {
            install_dir: install_dir.into(),
            cache_dir,
        }
    }

    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.install_dir.join(LOG_FILE)
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.install_dir.join(CONFIG_FILE)
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.install_dir.join(LOCK_FILE)
    }

    #[must_use]
    pub fn install_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.install_dir.join(relative)
    }

    /// Ensure the scratch cache directory exists on disk.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn ensure_cache_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
    }
}

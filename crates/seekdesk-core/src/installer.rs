use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use seekdesk_platform::AppPaths;

use crate::app_control::AppControl;
use crate::archive::extract_zip;
use crate::backup::{Backup, BackupStore};
use crate::config::UpdaterConfig;
use crate::download::download_asset;
use crate::error::{ItemFailure, UpdateError};
use crate::fs_ops::replace_entry;
use crate::lock::InstallLock;
use crate::progress::{ProgressSender, UpdateProgress, report};
use crate::release::{self, ReleaseAsset, ReleaseClient};
use crate::version::needs_update;
use crate::version_store::VersionStore;

/// Pipeline states. `UpToDate`, `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallState {
    #[default]
    Checking,
    UpToDate,
    Downloading,
    BackingUp,
    Installing,
    Finalizing,
    Done,
    Restoring,
    Failed,
}

impl InstallState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "CHECKING",
            Self::UpToDate => "UP_TO_DATE",
            Self::Downloading => "DOWNLOADING",
            Self::BackingUp => "BACKING_UP",
            Self::Installing => "INSTALLING",
            Self::Finalizing => "FINALIZING",
            Self::Done => "DONE",
            Self::Restoring => "RESTORING",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::UpToDate | Self::Done | Self::Failed)
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate {
        current: String,
        latest: String,
    },
    Updated {
        from: String,
        to: String,
        backup: PathBuf,
    },
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate { current, .. } => {
                write!(f, "You already have the latest version ({current})")
            }
            Self::Updated { from, to, .. } => write!(f, "Updated {from} -> {to}"),
        }
    }
}

/// In-memory record of one run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct UpdateSession {
    pub state: InstallState,
    pub history: Vec<InstallState>,
    pub current_version: Option<String>,
    pub latest_version: Option<String>,
    pub asset: Option<ReleaseAsset>,
    /// Scratch archive path; removed together with the scratch directory
    /// when the run ends.
    pub archive: Option<PathBuf>,
    pub backup: Option<Backup>,
}

impl UpdateSession {
    fn enter(&mut self, next: InstallState) {
        if self.history.last() == Some(&next) {
            return;
        }
        match self.history.last() {
            Some(previous) => info!("{previous} -> {next}"),
            None => info!("{next}"),
        }
        self.state = next;
        self.history.push(next);
    }
}

/// Drives one update of an install directory from check to relaunch.
pub struct Installer {
    paths: AppPaths,
    config: UpdaterConfig,
    http: reqwest::Client,
    releases: ReleaseClient,
    versions: VersionStore,
    backups: BackupStore,
    app: Arc<dyn AppControl>,
    progress: Option<ProgressSender>,
}

impl Installer {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        paths: AppPaths,
        config: UpdaterConfig,
        app: Arc<dyn AppControl>,
    ) -> Result<Self, UpdateError> {
        let http = release::http_client(&config)?;
        let releases = ReleaseClient::new(
            http.clone(),
            config.release_url.clone(),
            config.retry_policy(),
        );
        let versions = VersionStore::new(paths.install_path(&config.version_file));
        let backups = BackupStore::new(paths.install_dir.clone(), config.tracked_items());

        Ok(Self {
            paths,
            config,
            http,
            releases,
            versions,
            backups,
            app,
            progress: None,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Run the whole pipeline.
    ///
    /// # Errors
    /// Returns the terminal failure. Failures after the backup was taken come
    /// back wrapped in [`UpdateError::RolledBack`] or [`UpdateError::Restore`].
    pub async fn run(&self) -> Result<UpdateOutcome, UpdateError> {
        let mut session = UpdateSession::default();
        self.run_session(&mut session).await
    }

    /// [`Installer::run`], recording states and intermediate values in
    /// `session`.
    ///
    /// # Errors
    /// See [`Installer::run`].
    pub async fn run_session(
        &self,
        session: &mut UpdateSession,
    ) -> Result<UpdateOutcome, UpdateError> {
        let result = match InstallLock::acquire(&self.paths.lock_file()) {
            Ok(_lock) => self.drive(session).await,
            Err(error) => Err(error.into()),
        };

        match &result {
            Ok(outcome) => {
                info!("{outcome}");
                report(
                    self.progress.as_ref(),
                    UpdateProgress::Complete(outcome.clone()),
                )
                .await;
            }
            Err(error) => {
                session.enter(InstallState::Failed);
                error!("Update failed: {error}");
                report(
                    self.progress.as_ref(),
                    UpdateProgress::Failed(error.to_string()),
                )
                .await;
            }
        }
        result
    }

    async fn drive(&self, session: &mut UpdateSession) -> Result<UpdateOutcome, UpdateError> {
        session.enter(InstallState::Checking);
        report(self.progress.as_ref(), UpdateProgress::Checking).await;

        let current = self.versions.read().to_string();
        info!("Current version: {current}");
        session.current_version = Some(current.clone());

        let release = self.releases.fetch_latest().await?;
        let latest = release.version_label().to_string();
        info!("Latest version: {latest}");
        session.latest_version = Some(latest.clone());

        if !needs_update(&current, &latest) {
            session.enter(InstallState::UpToDate);
            if self.config.relaunch {
                self.relaunch(&self.executable_path());
            }
            return Ok(UpdateOutcome::UpToDate { current, latest });
        }
        info!("Update available: {current} -> {latest}");

        let asset = release.select_asset(&self.config.asset_marker)?.clone();
        session.asset = Some(asset.clone());

        session.enter(InstallState::Downloading);
        self.close_app().await;
        self.paths
            .ensure_cache_dir()
            .map_err(|error| UpdateError::io("failed to create cache directory", error))?;
        let scratch = tempfile::Builder::new()
            .prefix("update-")
            .tempdir_in(&self.paths.cache_dir)
            .map_err(|error| UpdateError::io("failed to create scratch directory", error))?;
        let archive = scratch.path().join("update.zip");
        download_asset(
            &self.http,
            &asset,
            &archive,
            &self.config.retry_policy(),
            self.progress.as_ref(),
        )
        .await?;
        session.archive = Some(archive.clone());

        session.enter(InstallState::BackingUp);
        report(self.progress.as_ref(), UpdateProgress::BackingUp).await;
        let backup = self.backups.create(&current)?;
        session.backup = Some(backup.clone());

        let executable = match self.apply(session, scratch.path(), &archive, &latest).await {
            Ok(executable) => executable,
            Err(cause) => return Err(self.roll_back(session, &backup, cause).await),
        };

        if self.config.relaunch {
            self.relaunch(&executable);
        }
        Ok(UpdateOutcome::Updated {
            from: current,
            to: latest,
            backup: backup.dir,
        })
    }

    /// Extract, copy into place, record the version, and confirm the
    /// executable is there. Any error here requires a rollback.
    async fn apply(
        &self,
        session: &mut UpdateSession,
        scratch: &Path,
        archive: &Path,
        latest: &str,
    ) -> Result<PathBuf, UpdateError> {
        session.enter(InstallState::Installing);
        report(self.progress.as_ref(), UpdateProgress::Extracting).await;
        let extract_dir = scratch.join("extracted");
        extract_zip(archive, &extract_dir)?;

        report(self.progress.as_ref(), UpdateProgress::Installing).await;
        let failures = install_entries(&extract_dir, &self.paths.install_dir);
        if !failures.is_empty() {
            return Err(UpdateError::Install { failures });
        }

        session.enter(InstallState::Finalizing);
        self.versions
            .write(latest)
            .map_err(|source| UpdateError::Finalize {
                version: latest.to_string(),
                source,
            })?;
        info!("Updated version to: {latest}");

        session.enter(InstallState::Done);
        let executable = self.executable_path();
        if !executable.is_file() {
            return Err(UpdateError::ExecutableMissing(executable));
        }
        Ok(executable)
    }

    async fn roll_back(
        &self,
        session: &mut UpdateSession,
        backup: &Backup,
        cause: UpdateError,
    ) -> UpdateError {
        error!("{cause}; restoring backup");
        session.enter(InstallState::Restoring);
        report(self.progress.as_ref(), UpdateProgress::Restoring).await;

        let restore = self.backups.restore(backup);
        session.enter(InstallState::Failed);

        if restore.is_clean() {
            UpdateError::RolledBack {
                cause: Box::new(cause),
                backup: backup.dir.clone(),
            }
        } else {
            UpdateError::Restore {
                cause: Box::new(cause),
                backup: backup.dir.clone(),
                failures: restore.failures,
            }
        }
    }

    async fn close_app(&self) {
        match self.app.close().await {
            Ok(outcome) => debug!("Close {}: {outcome:?}", self.config.executable_name),
            Err(error) => warn!(
                "Could not close {}: {error}. Continuing anyway",
                self.config.executable_name
            ),
        }
    }

    fn relaunch(&self, executable: &Path) {
        if !executable.is_file() {
            warn!("Not relaunching, {} does not exist", executable.display());
            return;
        }
        if let Err(error) = self.app.launch(executable) {
            warn!("Failed to relaunch {}: {error}", executable.display());
        }
    }

    fn executable_path(&self) -> PathBuf {
        self.paths.install_path(&self.config.executable_name)
    }
}

/// Copy each top-level entry of `extracted` over its counterpart in
/// `install_dir`, collecting failures instead of stopping at the first one.
fn install_entries(extracted: &Path, install_dir: &Path) -> Vec<ItemFailure> {
    let entries = match std::fs::read_dir(extracted) {
        Ok(entries) => entries,
        Err(error) => return vec![ItemFailure::new(extracted.display().to_string(), error)],
    };

    let mut failures = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                failures.push(ItemFailure::new(extracted.display().to_string(), error));
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        match replace_entry(&entry.path(), &install_dir.join(entry.file_name())) {
            Ok(()) => info!("Updated: {name}"),
            Err(error) => {
                error!("Failed to update {name}: {error}");
                failures.push(ItemFailure::new(name, error));
            }
        }
    }
    failures
}

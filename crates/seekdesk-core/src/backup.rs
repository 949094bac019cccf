use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};

use crate::error::{ItemFailure, UpdateError};
use crate::fs_ops::{copy_entry, remove_entry};

const BACKUP_PREFIX: &str = "backup_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A snapshot of the tracked items taken before an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub dir: PathBuf,
    pub version: String,
    pub created_at: NaiveDateTime,
    /// Tracked items copied into the snapshot.
    pub items: Vec<String>,
    /// Tracked items that did not exist when the snapshot was taken.
    pub absent: Vec<String>,
}

/// Per-item outcome of a restore. Failures never abort the restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub removed: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

impl RestoreReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// An existing backup directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub dir: PathBuf,
    pub version: String,
    pub created_at: NaiveDateTime,
}

/// Creates and restores `backup_<version>_<YYYYMMDD_HHMMSS>` snapshots in the
/// install directory. Snapshots are never pruned automatically.
#[derive(Debug, Clone)]
pub struct BackupStore {
    install_dir: PathBuf,
    tracked: Vec<String>,
}

impl BackupStore {
    #[must_use]
    pub fn new(install_dir: impl Into<PathBuf>, tracked: Vec<String>) -> Self {
        Self {
            install_dir: install_dir.into(),
            tracked,
        }
    }

    #[must_use]
    pub fn tracked(&self) -> &[String] {
        &self.tracked
    }

    /// Snapshot the tracked items, stamped with the current local time.
    ///
    /// # Errors
    /// Returns an error only if the backup directory itself cannot be created.
    /// Items that are missing or fail to copy are logged and skipped.
    pub fn create(&self, version: &str) -> Result<Backup, UpdateError> {
        self.create_at(version, Local::now().naive_local())
    }

    /// [`BackupStore::create`] with an explicit timestamp. Two snapshots of
    /// the same version within one second get a `_<n>` suffix.
    ///
    /// # Errors
    /// Returns an error only if the backup directory itself cannot be created.
    pub fn create_at(
        &self,
        version: &str,
        created_at: NaiveDateTime,
    ) -> Result<Backup, UpdateError> {
        let dir = self.unique_dir(version, created_at);
        std::fs::create_dir_all(&dir)
            .map_err(|error| UpdateError::io("failed to create backup directory", error))?;
        info!("Creating backup in {}", dir.display());

        let mut items = Vec::new();
        let mut absent = Vec::new();
        for item in &self.tracked {
            let src = self.install_dir.join(item);
            if !src.exists() {
                debug!("Skipping missing item {item}");
                absent.push(item.clone());
                continue;
            }
            match copy_entry(&src, &dir.join(item)) {
                Ok(()) => {
                    debug!("Backed up: {item}");
                    items.push(item.clone());
                }
                Err(error) => warn!("Failed to back up {item}: {error}"),
            }
        }

        Ok(Backup {
            dir,
            version: version.to_string(),
            created_at,
            items,
            absent,
        })
    }

    /// Put every backed-up item back and remove tracked items that did not
    /// exist when the snapshot was taken.
    #[must_use]
    pub fn restore(&self, backup: &Backup) -> RestoreReport {
        info!("Restoring from backup: {}", backup.dir.display());
        let mut report = RestoreReport::default();

        for item in &backup.items {
            let dest = self.install_dir.join(item);
            let result =
                remove_entry(&dest).and_then(|()| copy_entry(&backup.dir.join(item), &dest));
            match result {
                Ok(()) => {
                    debug!("Restored: {item}");
                    report.restored.push(item.clone());
                }
                Err(error) => {
                    warn!("Failed to restore {item}: {error}");
                    report.failures.push(ItemFailure::new(item.as_str(), error));
                }
            }
        }

        for item in &backup.absent {
            let dest = self.install_dir.join(item);
            if !dest.exists() {
                continue;
            }
            match remove_entry(&dest) {
                Ok(()) => {
                    debug!("Removed {item}, which was not present before the update");
                    report.removed.push(item.clone());
                }
                Err(error) => {
                    warn!("Failed to remove {item}: {error}");
                    report.failures.push(ItemFailure::new(item.as_str(), error));
                }
            }
        }

        report
    }

    /// Backups found in the install directory, newest first.
    ///
    /// # Errors
    /// Returns an error if the install directory cannot be read.
    pub fn list(&self) -> Result<Vec<BackupEntry>, UpdateError> {
        let entries = std::fs::read_dir(&self.install_dir)
            .map_err(|error| UpdateError::io("failed to read install directory", error))?;

        let mut backups: Vec<(BackupEntry, u32)> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name();
                let (version, created_at, suffix) = parse_backup_name(name.to_str()?)?;
                Some((
                    BackupEntry {
                        dir: entry.path(),
                        version,
                        created_at,
                    },
                    suffix,
                ))
            })
            .collect();

        backups.sort_by(|(a, a_suffix), (b, b_suffix)| {
            (b.created_at, *b_suffix).cmp(&(a.created_at, *a_suffix))
        });
        Ok(backups.into_iter().map(|(entry, _)| entry).collect())
    }

    fn unique_dir(&self, version: &str, created_at: NaiveDateTime) -> PathBuf {
        let base = backup_dir_name(version, created_at);
        let mut dir = self.install_dir.join(&base);
        let mut suffix = 1;
        while dir.exists() {
            suffix += 1;
            dir = self.install_dir.join(format!("{base}_{suffix}"));
        }
        dir
    }
}

fn backup_dir_name(version: &str, created_at: NaiveDateTime) -> String {
    let version = sanitize_version(version);
    format!(
        "{BACKUP_PREFIX}{version}_{}",
        created_at.format(TIMESTAMP_FORMAT)
    )
}

/// Keep the version usable as a path component.
fn sanitize_version(version: &str) -> String {
    version
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect()
}

fn parse_backup_name(name: &str) -> Option<(String, NaiveDateTime, u32)> {
    let rest = name.strip_prefix(BACKUP_PREFIX)?;
    let mut parts: Vec<&str> = rest.split('_').collect();

    let suffix = if parts.len() == 4 {
        parts.pop()?.parse().ok()?
    } else {
        1
    };
    let [version, date, time] = parts.as_slice() else {
        return None;
    };
    let created_at =
        NaiveDateTime::parse_from_str(&format!("{date}_{time}"), TIMESTAMP_FORMAT).ok()?;
    Some(((*version).to_string(), created_at, suffix))
}

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::lock::LockError;

/// One tracked or extracted entry that could not be copied into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

impl ItemFailure {
    pub(crate) fn new(item: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}

fn summarize(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to fetch release metadata after {attempts} attempts: {last_error}")]
    Network { attempts: usize, last_error: String },
    #[error("malformed release metadata: {0}")]
    MalformedRelease(String),
    #[error("no release asset matching '{marker}' in release {tag}")]
    AssetNotFound { marker: String, tag: String },
    #[error("failed to download {asset} after {attempts} attempts: {last_error}")]
    Download {
        asset: String,
        attempts: usize,
        last_error: String,
    },
    #[error("update archive is corrupt: {0}")]
    CorruptArchive(String),
    #[error("failed to install {} item(s): {}", .failures.len(), summarize(.failures))]
    Install { failures: Vec<ItemFailure> },
    #[error("failed to record installed version {version}: {source}")]
    Finalize {
        version: String,
        #[source]
        source: std::io::Error,
    },
    #[error("installed executable is missing: {}", .0.display())]
    ExecutableMissing(PathBuf),
    #[error("{cause}; rolled back from {}", .backup.display())]
    RolledBack {
        cause: Box<UpdateError>,
        backup: PathBuf,
    },
    #[error(
        "{cause}; restore from {} failed for {} item(s): {}",
        .backup.display(),
        .failures.len(),
        summarize(.failures)
    )]
    Restore {
        cause: Box<UpdateError>,
        backup: PathBuf,
        failures: Vec<ItemFailure>,
    },
    #[error(transparent)]
    Locked(#[from] LockError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl UpdateError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    /// The failure that started the run's rollback, or `self` when no
    /// rollback happened.
    #[must_use]
    pub fn root_cause(&self) -> &UpdateError {
        match self {
            Self::RolledBack { cause, .. } | Self::Restore { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Whether a backup was restored (fully or partially) before this error
    /// was returned.
    #[must_use]
    pub fn restored_backup(&self) -> Option<&std::path::Path> {
        match self {
            Self::RolledBack { backup, .. } | Self::Restore { backup, .. } => Some(backup),
            _ => None,
        }
    }
}

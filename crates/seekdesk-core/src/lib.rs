//! Self-update pipeline for the DeepSeek desktop shell.
//!
//! The pipeline is linear: read the installed version, fetch the latest
//! release, decide whether it is newer, then download, back up, install,
//! record the new version and relaunch. Any failure after the backup exists
//! restores it before the error reaches the caller.
//!
//! - [`version`]: version parsing, ordering and the fail-open comparison.
//! - [`version_store`]: the persisted `version.txt`.
//! - [`release`]: release metadata client and asset selection.
//! - [`backup`]: timestamped snapshots of the tracked install items.
//! - [`installer`]: the state machine tying it all together.

pub mod app_control;
mod archive;
pub mod backup;
pub mod config;
mod download;
mod error;
mod fs_ops;
pub mod installer;
mod lock;
mod progress;
pub mod release;
mod retry;
pub mod version;
pub mod version_store;

/// Closing and relaunching the desktop app.
pub use app_control::{AppControl, SystemApp};
/// Backup snapshots and restore reports.
pub use backup::{Backup, BackupEntry, BackupStore, RestoreReport};
/// Updater configuration with file-backed defaults.
pub use config::{ConfigError, UpdaterConfig};
/// Pipeline error taxonomy.
pub use error::{ItemFailure, UpdateError};
/// Pipeline driver, its states and per-run session.
pub use installer::{InstallState, Installer, UpdateOutcome, UpdateSession};
/// Advisory lock guarding an install directory.
pub use lock::{InstallLock, LockError};
/// Progress events emitted while an update runs.
pub use progress::{ProgressSender, UpdateProgress};
/// Release metadata model and client.
pub use release::{ReleaseAsset, ReleaseClient, ReleaseInfo};
/// Retry budget shared by metadata fetches and asset downloads.
pub use retry::{MAX_RETRIES, RetryPolicy};
/// Version model and the update decision.
pub use version::{Version, VersionParseError, needs_update};
/// Persisted installed version.
pub use version_store::VersionStore;

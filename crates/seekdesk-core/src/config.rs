use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{DEFAULT_RETRY_DELAYS_SECS, RetryPolicy};

const DEFAULT_RELEASE_URL: &str =
    "https://api.github.com/repos/LousyBook94/DeepSeek-Desktop/releases/latest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid updater config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the updater needs to know about the installation and where
/// releases come from. Passed explicitly to each stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(default = "default_release_url")]
    pub release_url: String,

    #[serde(default = "default_executable_name")]
    pub executable_name: String,

    #[serde(default = "default_version_file")]
    pub version_file: String,

    /// Tracked besides the executable and version file.
    #[serde(default = "default_extra_tracked_items")]
    pub extra_tracked_items: Vec<String>,

    /// Case-insensitive substring selecting the release asset.
    #[serde(default = "default_asset_marker")]
    pub asset_marker: String,

    #[serde(default = "default_retry_delays")]
    pub retry_delays_secs: Vec<u64>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_close_grace")]
    pub close_grace_secs: u64,

    #[serde(default = "default_true")]
    pub relaunch: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_release_url() -> String {
    DEFAULT_RELEASE_URL.to_string()
}

fn default_executable_name() -> String {
    if cfg!(target_os = "windows") {
        "DeepSeekChat.exe".to_string()
    } else {
        "DeepSeekChat".to_string()
    }
}

fn default_version_file() -> String {
    "version.txt".to_string()
}

fn default_extra_tracked_items() -> Vec<String> {
    vec!["deepseek.ico".to_string(), "injection".to_string()]
}

fn default_asset_marker() -> String {
    let marker = if cfg!(target_os = "windows") {
        "windows.zip"
    } else if cfg!(target_os = "macos") {
        "macos.zip"
    } else {
        "linux.zip"
    };
    marker.to_string()
}

fn default_retry_delays() -> Vec<u64> {
    DEFAULT_RETRY_DELAYS_SECS.to_vec()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_close_grace() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            release_url: default_release_url(),
            executable_name: default_executable_name(),
            version_file: default_version_file(),
            extra_tracked_items: default_extra_tracked_items(),
            asset_marker: default_asset_marker(),
            retry_delays_secs: default_retry_delays(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            close_grace_secs: default_close_grace(),
            relaunch: true,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl UpdaterConfig {
    /// Load the config file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Executable, version file, then the extra items, without duplicates.
    #[must_use]
    pub fn tracked_items(&self) -> Vec<String> {
        let mut items = vec![self.executable_name.clone(), self.version_file.clone()];
        for item in &self.extra_tracked_items {
            if !items.contains(item) {
                items.push(item.clone());
            }
        }
        items
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs(&self.retry_delays_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn close_grace(&self) -> Duration {
        Duration::from_secs(self.close_grace_secs)
    }
}

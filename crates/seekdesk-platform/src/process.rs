use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::commands::HideWindow;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    NotRunning,
    Closed,
    Forced,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} is still running after {waited:?}")]
    StillRunning { name: String, waited: Duration },
    #[error("failed to launch {path}: {source}")]
    Launch {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Whether a process with the given image name is currently running.
///
/// # Errors
/// Returns an error when the process listing tool cannot be run.
pub async fn is_process_running(image_name: &str) -> Result<bool, ProcessError> {
    #[cfg(windows)]
    {
        let output = tokio::process::Command::new("tasklist")
            .args([
                "/FI",
                &format!("IMAGENAME eq {image_name}"),
                "/FO",
                "CSV",
                "/NH",
            ])
            .hide_window()
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                command: "tasklist",
                source,
            })?;
        let listing = String::from_utf8_lossy(&output.stdout).to_ascii_lowercase();
        Ok(listing.contains(&image_name.to_ascii_lowercase()))
    }

    #[cfg(not(windows))]
    {
        let status = tokio::process::Command::new("pgrep")
            .args(["-x", image_name])
            .hide_window()
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|source| ProcessError::Spawn {
                command: "pgrep",
                source,
            })?;
        Ok(status.success())
    }
}

async fn signal_process(image_name: &str, force: bool) -> Result<(), ProcessError> {
    #[cfg(windows)]
    let (command, mut cmd) = {
        let mut cmd = tokio::process::Command::new("taskkill");
        if force {
            cmd.arg("/F");
        }
        cmd.args(["/IM", image_name]);
        ("taskkill", cmd)
    };

    #[cfg(not(windows))]
    let (command, mut cmd) = {
        let mut cmd = tokio::process::Command::new("pkill");
        cmd.args([if force { "-KILL" } else { "-TERM" }, "-x", image_name]);
        ("pkill", cmd)
    };

    let status = cmd
        .hide_window()
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map_err(|source| ProcessError::Spawn { command, source })?;
    debug!("{command} for {image_name} (force={force}) exited with {status}");
    Ok(())
}

async fn wait_for_exit(image_name: &str, grace: Duration) -> Result<bool, ProcessError> {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        if !is_process_running(image_name).await? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Ask a running process to exit, polling until it is gone or `grace`
/// elapses, then force-terminate it.
///
/// # Errors
/// Returns an error when the platform tools cannot be run, or the process
/// survives forced termination.
pub async fn close_process(
    image_name: &str,
    grace: Duration,
) -> Result<CloseOutcome, ProcessError> {
    if !is_process_running(image_name).await? {
        info!("{image_name} is not running");
        return Ok(CloseOutcome::NotRunning);
    }

    info!("{image_name} is running, asking it to close");
    signal_process(image_name, false).await?;
    if wait_for_exit(image_name, grace).await? {
        info!("{image_name} closed");
        return Ok(CloseOutcome::Closed);
    }

    warn!("{image_name} did not exit within {grace:?}, forcing termination");
    signal_process(image_name, true).await?;
    if wait_for_exit(image_name, grace).await? {
        return Ok(CloseOutcome::Forced);
    }

    Err(ProcessError::StillRunning {
        name: image_name.to_string(),
        waited: grace * 2,
    })
}

/// Start `path` as an independent process and return without waiting on it.
///
/// # Errors
/// Returns an error if the process cannot be spawned.
pub fn launch_detached(path: &Path) -> Result<(), ProcessError> {
    let mut cmd = std::process::Command::new(path);
    if let Some(dir) = path.parent() {
        cmd.current_dir(dir);
    }
    cmd.detached()
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|source| ProcessError::Launch {
            path: path.display().to_string(),
            source,
        })?;
    info!("Launched {}", path.display());
    Ok(())
}

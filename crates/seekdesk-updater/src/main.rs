//! `seekdesk-updater`: checks for a newer DeepSeek desktop release and
//! installs it, rolling back on failure.

mod cli;
mod logging;

use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use seekdesk_core::{BackupStore, Installer, SystemApp, UpdateError, UpdateProgress, UpdaterConfig};
use seekdesk_platform::{AppPaths, AppPathsError};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::cli::Cli;

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error(transparent)]
    Update(#[from] UpdateError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match run(&cli).await {
        Ok(summary) => {
            println!("[+] {summary}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            log::error!("{error}");
            eprintln!("[-] {error}");
            ExitCode::FAILURE
        }
    };

    if !cli.auto {
        wait_for_enter();
    }
    code
}

async fn run(cli: &Cli) -> Result<String, RunError> {
    let paths = match &cli.install_dir {
        Some(dir) => AppPaths::for_install_dir(dir),
        None => AppPaths::current()?,
    };
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let (config, config_error) = match UpdaterConfig::load(&config_path) {
        Ok(config) => (config, None),
        Err(error) => (UpdaterConfig::default(), Some(error)),
    };

    logging::init_logging(&paths.log_file(), cli.debug, config.max_log_size_bytes);
    info!("Install directory: {}", paths.install_dir.display());
    if let Some(error) = config_error {
        warn!("{error}; using default settings");
    }

    if cli.list_backups {
        return list_backups(&paths, &config);
    }

    let app = Arc::new(SystemApp::new(
        config.executable_name.clone(),
        config.close_grace(),
    ));
    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_progress(rx));

    let installer = Installer::new(paths, config, app)?.with_progress(tx);
    let result = installer.run().await;
    drop(installer);
    let _ = printer.await;

    Ok(result?.to_string())
}

fn list_backups(paths: &AppPaths, config: &UpdaterConfig) -> Result<String, RunError> {
    let store = BackupStore::new(paths.install_dir.clone(), config.tracked_items());
    let backups = store.list()?;
    println!("Tracked items: {}", store.tracked().join(", "));
    for backup in &backups {
        println!(
            "{}  (version {}, created {})",
            backup.dir.display(),
            backup.version,
            backup.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(format!("{} backup(s) found", backups.len()))
}

async fn print_progress(mut rx: mpsc::Receiver<UpdateProgress>) {
    let mut last_percent = None;
    while let Some(event) = rx.recv().await {
        if !matches!(event, UpdateProgress::Downloading { .. }) && last_percent.take().is_some() {
            println!();
        }
        match event {
            UpdateProgress::Checking => println!("[*] Checking for updates..."),
            UpdateProgress::Downloading { downloaded, total } => {
                let Some(percent) = download_percent(downloaded, total) else {
                    continue;
                };
                if last_percent != Some(percent) {
                    print!("\r[*] Downloading... {percent:>3}%");
                    let _ = std::io::stdout().flush();
                    last_percent = Some(percent);
                }
            }
            UpdateProgress::BackingUp => println!("[*] Creating backup..."),
            UpdateProgress::Extracting => println!("[*] Extracting update..."),
            UpdateProgress::Installing => println!("[*] Installing new files..."),
            UpdateProgress::Restoring => println!("[~] Update failed, restoring backup..."),
            UpdateProgress::Complete(_) | UpdateProgress::Failed(_) => {}
        }
    }
}

fn download_percent(downloaded: u64, total: u64) -> Option<u64> {
    (total > 0).then(|| downloaded.min(total) * 100 / total)
}

fn wait_for_enter() {
    print!("Press Enter to exit...");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}

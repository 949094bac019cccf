use std::io::Read;
use std::path::Path;

use futures_util::StreamExt;
use log::info;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::UpdateError;
use crate::progress::{ProgressSender, UpdateProgress, report};
use crate::release::ReleaseAsset;
use crate::retry::{Attempt, RetryError, RetryPolicy};

/// Stream `asset` to `dest`, retrying the whole transfer on any failure.
///
/// Each attempt truncates `dest`. An attempt fails on transport errors, a
/// non-success status, an empty body, or a SHA-256 mismatch against the
/// asset's published digest.
pub(crate) async fn download_asset(
    http: &reqwest::Client,
    asset: &ReleaseAsset,
    dest: &Path,
    retry: &RetryPolicy,
    progress: Option<&ProgressSender>,
) -> Result<u64, UpdateError> {
    let expected_sha256 = asset.sha256();
    let expected = expected_sha256.as_deref();
    let result = retry
        .run("asset download", |_| {
            download_once(http, asset, dest, expected, progress)
        })
        .await;

    match result {
        Ok(bytes) => Ok(bytes),
        Err(RetryError::Exhausted { attempts, last }) => Err(UpdateError::Download {
            asset: asset.name.clone(),
            attempts,
            last_error: last,
        }),
        Err(RetryError::Fatal(last)) => Err(UpdateError::Download {
            asset: asset.name.clone(),
            attempts: 1,
            last_error: last,
        }),
    }
}

async fn download_once(
    http: &reqwest::Client,
    asset: &ReleaseAsset,
    dest: &Path,
    expected_sha256: Option<&str>,
    progress: Option<&ProgressSender>,
) -> Result<u64, Attempt<String>> {
    info!("Downloading {} from {}", asset.name, asset.url);

    let response = http
        .get(&asset.url)
        .send()
        .await
        .map_err(|error| Attempt::Transient(format!("download request failed: {error}")))?;

    if !response.status().is_success() {
        return Err(Attempt::Transient(format!(
            "download failed with status {}",
            response.status()
        )));
    }

    let total = response.content_length().or(asset.size).unwrap_or(0);
    let mut downloaded: u64 = 0;

    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        Attempt::Transient(format!(
            "failed to create download file {}: {error}",
            dest.display()
        ))
    })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|error| Attempt::Transient(format!("download stream error: {error}")))?;
        file.write_all(&chunk).await.map_err(|error| {
            Attempt::Transient(format!("failed to write download data: {error}"))
        })?;
        downloaded += chunk.len() as u64;
        report(
            progress,
            UpdateProgress::Downloading { downloaded, total },
        )
        .await;
    }

    file.flush()
        .await
        .map_err(|error| Attempt::Transient(format!("failed to flush download file: {error}")))?;
    drop(file);

    if downloaded == 0 {
        return Err(Attempt::Transient(
            "downloaded file is empty".to_string(),
        ));
    }

    if let Some(expected) = expected_sha256 {
        let actual = sha256_file(dest)
            .map_err(|error| Attempt::Transient(format!("failed to hash download: {error}")))?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Attempt::Transient(format!(
                "checksum mismatch for {}: expected {expected}, got {actual}",
                asset.name
            )));
        }
        info!("Checksum verified for {}", asset.name);
    }

    info!("Download complete: {downloaded} bytes");
    Ok(downloaded)
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

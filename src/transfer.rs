//! Streaming downloads of signed URLs to the local filesystem.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use indicatif::ProgressBar;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Downloads `url` into `directory/filename`, streaming to disk with a
/// progress bar. Slashes in `filename` become subdirectories, which are
/// created as needed. A failed transfer is retried once.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    directory: &Path,
    filename: &str,
) -> Result<PathBuf> {
    match try_download(client, url, directory, filename).await {
        Ok(path) => Ok(path),
        Err(error) => {
            tracing::warn!(filename, %error, "download failed, retrying");
            try_download(client, url, directory, filename).await
        }
    }
}

async fn try_download(
    client: &reqwest::Client,
    url: &str,
    directory: &Path,
    filename: &str,
) -> Result<PathBuf> {
    let target = directory.join(filename);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::server(
            status,
            response.text().await.unwrap_or_default(),
        ));
    }

    let progress = match response.content_length() {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    progress.set_message(filename.to_string());

    let mut file = tokio::fs::File::create(&target).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        progress.inc(chunk.len() as u64);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    progress.finish_and_clear();

    tracing::debug!(filename, path = %target.display(), "download complete");
    Ok(target)
}

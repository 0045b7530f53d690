use super::error::FetchError;
use super::utils::remove_quietly;
use reqwest::{header::HeaderMap, Client, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Streams remote media straight to disk.
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: Client,
    timeout: Duration,
}

impl MediaFetcher {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Downloads `url` into `destination`. Non-success responses produce no
    /// file; a failed or empty transfer removes what was written.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        headers: &HeaderMap,
    ) -> Result<PathBuf, FetchError> {
        self.fetch_at_least(url, destination, headers, 1).await
    }

    /// Like [`fetch`](Self::fetch) but rejects payloads smaller than `min_bytes`.
    pub async fn fetch_at_least(
        &self,
        url: &str,
        destination: &Path,
        headers: &HeaderMap,
        min_bytes: u64,
    ) -> Result<PathBuf, FetchError> {
        debug!("Fetching {} -> {}", url, destination.display());

        let mut response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let written = match write_body(&mut response, destination).await {
            Ok(written) => written,
            Err(e) => {
                remove_quietly(destination).await;
                return Err(e);
            }
        };

        if written == 0 {
            remove_quietly(destination).await;
            return Err(FetchError::Empty);
        }
        if written < min_bytes {
            remove_quietly(destination).await;
            return Err(FetchError::TooSmall(written));
        }

        debug!("Fetched {} bytes into {}", written, destination.display());
        Ok(destination.to_path_buf())
    }
}

async fn write_body(response: &mut Response, destination: &Path) -> Result<u64, FetchError> {
    let mut file = tokio::fs::File::create(destination).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

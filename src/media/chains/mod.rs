//! Per-platform acquisition strategy chains and the helpers they share.

mod long_form;
mod photo_share;
mod short_video;

pub use long_form::LongFormChain;
pub use photo_share::{PhotoShareChain, PhotoShareSources};
pub use short_video::ShortVideoChain;

use super::attempt_log::AttemptLog;
use super::error::{AcquireError, SourceError};
use super::extractor::{ExtractOptions, Extracted, GenericExtractor};
use super::fetch::MediaFetcher;
use super::normalize::VideoNormalizer;
use super::platform::Platform;
use super::types::{AcquisitionRequest, AcquisitionResult};
use super::utils::{
    is_audio_extension, is_image_extension, is_playable_video_extension, path_extension,
    random_file_name, remove_quietly, sibling_path, url_extension, verify_file,
};
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Ordered acquisition strategies for one platform.
#[async_trait]
pub trait PlatformChain: Send + Sync {
    fn platform(&self) -> Platform;

    async fn acquire(&self, request: &AcquisitionRequest)
        -> Result<AcquisitionResult, AcquireError>;
}

/// Headers of a regular desktop browser navigation.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers
}

/// What one ranked public API reported for a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ApiPayload {
    Slideshow {
        images: Vec<String>,
        music: Option<String>,
    },
    Video(String),
    Photo(String),
}

/// Parses the `{code, data: {play | images | music}}` envelope.
pub(crate) fn parse_api_payload(body: &Value) -> Result<ApiPayload, SourceError> {
    match body["code"].as_i64() {
        Some(0) => {}
        Some(code) => return Err(SourceError::Parse(format!("code {}", code))),
        None => return Err(SourceError::Missing("code")),
    }

    let data = &body["data"];
    let images: Vec<String> = data["images"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if !images.is_empty() {
        let music = data["music"]
            .as_str()
            .or_else(|| data["music_info"]["play"].as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        return Ok(ApiPayload::Slideshow { images, music });
    }

    match data["play"].as_str().filter(|s| !s.is_empty()) {
        Some(play) if url_extension(play).is_some_and(|e| is_image_extension(&e)) => {
            Ok(ApiPayload::Photo(play.to_string()))
        }
        Some(play) => Ok(ApiPayload::Video(play.to_string())),
        None => Err(SourceError::Missing("data.play")),
    }
}

pub(crate) async fn get_json(
    fetcher: &MediaFetcher,
    url: &str,
    headers: &HeaderMap,
    timeout: Duration,
) -> Result<Value, SourceError> {
    let response = fetcher
        .client()
        .get(url)
        .headers(headers.clone())
        .timeout(timeout)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(SourceError::Status(response.status()));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| SourceError::Parse(e.to_string()))
}

/// Asks a ranked public API about `url`. The API base is used as a prefix.
pub(crate) async fn probe_api(
    fetcher: &MediaFetcher,
    api: &str,
    url: &str,
    timeout: Duration,
) -> Result<ApiPayload, SourceError> {
    let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
    let endpoint = format!("{}{}", api, encoded);
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    let body = get_json(fetcher, &endpoint, &headers, timeout).await?;
    parse_api_payload(&body)
}

/// What to do with a gallery-shaped extractor result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MultiEntryPolicy {
    /// Collect every image plus the audio track.
    Slideshow,
    /// Keep only the first non-audio entry.
    FirstItem,
}

/// Services shared by every chain.
#[derive(Clone)]
pub struct ChainContext {
    pub log: Arc<AttemptLog>,
    pub fetcher: MediaFetcher,
    pub normalizer: VideoNormalizer,
    pub extractor: Arc<dyn GenericExtractor>,
    pub download_dir: PathBuf,
}

impl ChainContext {
    pub fn new_path(&self, prefix: &str, ext: &str) -> PathBuf {
        self.download_dir.join(random_file_name(prefix, ext))
    }

    pub(crate) async fn prepare(&self, request: &AcquisitionRequest) -> Result<(), AcquireError> {
        if let Err(e) = tokio::fs::create_dir_all(&self.download_dir).await {
            warn!(
                "Cannot create download dir {}: {}",
                self.download_dir.display(),
                e
            );
            return Err(AcquireError::failed(request.platform));
        }
        Ok(())
    }

    pub(crate) async fn download_video(
        &self,
        url: &str,
        prefix: &str,
        headers: &HeaderMap,
    ) -> Result<AcquisitionResult, SourceError> {
        let dest = self.new_path(prefix, "mp4");
        let path = self.fetcher.fetch(url, &dest, headers).await?;
        let (path, size_bytes) = self.normalizer.normalize(path).await?;
        Ok(AcquisitionResult::Video { path, size_bytes })
    }

    pub(crate) async fn download_image(
        &self,
        url: &str,
        prefix: &str,
        headers: &HeaderMap,
    ) -> Result<AcquisitionResult, SourceError> {
        let dest = self.new_path(prefix, &image_extension(url));
        let path = self.fetcher.fetch(url, &dest, headers).await?;
        Ok(AcquisitionResult::Image { path })
    }

    /// Downloads slideshow images in order. Failed images are skipped; at least
    /// one must succeed. A missing audio track does not fail the slideshow.
    pub(crate) async fn download_slideshow(
        &self,
        images: &[String],
        audio: Option<&str>,
        prefix: &str,
        headers: &HeaderMap,
    ) -> Result<AcquisitionResult, SourceError> {
        let mut image_paths = Vec::with_capacity(images.len());
        for (index, image_url) in images.iter().enumerate() {
            let dest = self.new_path(prefix, &image_extension(image_url));
            match self.fetcher.fetch(image_url, &dest, headers).await {
                Ok(path) => image_paths.push(path),
                Err(e) => warn!("Failed to download slideshow image {}: {}", index + 1, e),
            }
        }
        if image_paths.is_empty() {
            return Err(SourceError::Missing("slideshow images"));
        }

        let audio_path = match audio {
            Some(audio_url) => {
                let ext = url_extension(audio_url)
                    .filter(|e| is_audio_extension(e))
                    .unwrap_or_else(|| "mp3".to_string());
                let dest = self.new_path(prefix, &ext);
                match self.fetcher.fetch(audio_url, &dest, headers).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("Failed to download slideshow audio: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        Ok(AcquisitionResult::Slideshow {
            image_paths,
            audio_path,
        })
    }

    /// Runs the generic extractor and turns its output into a result.
    pub(crate) async fn generic_fallback(
        &self,
        url: &str,
        format: &str,
        prefix: &str,
        policy: MultiEntryPolicy,
    ) -> Result<AcquisitionResult, SourceError> {
        let options = ExtractOptions {
            format,
            prefix,
            dir: &self.download_dir,
        };
        let extracted = self
            .extractor
            .extract(url, &options)
            .await
            .map_err(|e| SourceError::Extractor(format!("{:#}", e)))?;

        let headers = HeaderMap::new();
        match extracted {
            Extracted::Single(path) => self.finish_single(path).await,
            Extracted::MultiEntry(entries) => {
                debug!("Extractor returned {} entries for {}", entries.len(), url);
                let images: Vec<String> = entries
                    .iter()
                    .filter(|e| e.is_image())
                    .map(|e| e.url.clone())
                    .collect();
                let first = entries.iter().find(|e| !e.is_audio());

                match (policy, first) {
                    (MultiEntryPolicy::Slideshow, _) if !images.is_empty() => {
                        let audio = entries.iter().find(|e| e.is_audio()).map(|e| e.url.as_str());
                        self.download_slideshow(&images, audio, prefix, &headers)
                            .await
                    }
                    (_, Some(entry)) if entry.is_image() => {
                        self.download_image(&entry.url, prefix, &headers).await
                    }
                    (_, Some(entry)) => self.download_video(&entry.url, prefix, &headers).await,
                    (_, None) => Err(SourceError::Missing("extractor entries")),
                }
            }
        }
    }

    async fn finish_single(&self, path: PathBuf) -> Result<AcquisitionResult, SourceError> {
        if verify_file(&path).await.is_none() {
            remove_quietly(&path).await;
            return Err(SourceError::Missing("extracted file"));
        }

        let ext = path_extension(&path).unwrap_or_default();
        if is_image_extension(&ext) {
            return Ok(AcquisitionResult::Image { path });
        }

        let path = if is_playable_video_extension(&ext) {
            path
        } else {
            self.remux(path).await
        };
        let (path, size_bytes) = self.normalizer.normalize(path).await?;
        Ok(AcquisitionResult::Video { path, size_bytes })
    }

    /// Converts to mp4; keeps the original when remuxing fails.
    async fn remux(&self, path: PathBuf) -> PathBuf {
        let target = sibling_path(&path, "remux", "mp4");
        if self.normalizer.transcoder().remux(&path, &target).await {
            remove_quietly(&path).await;
            target
        } else {
            warn!("Could not remux {}, keeping original container", path.display());
            remove_quietly(&target).await;
            path
        }
    }
}

fn image_extension(url: &str) -> String {
    url_extension(url)
        .filter(|e| is_image_extension(e))
        .unwrap_or_else(|| "jpg".to_string())
}

pub mod attempt_log;
mod chains;
pub mod error;
mod extractor;
mod fetch;
mod inflight;
mod normalize;
mod platform;
mod types;
mod utils;

pub use attempt_log::{Attempt, AttemptLog};
pub use error::AcquireError;
pub use inflight::InFlightGuard;
pub use platform::{detect_links, Platform};
pub use types::{AcquisitionRequest, AcquisitionResult};

use crate::config::Config;
use anyhow::{Context, Result};
use chains::{
    ChainContext, LongFormChain, PhotoShareChain, PhotoShareSources, PlatformChain,
    ShortVideoChain,
};
use extractor::YtDlpExtractor;
use fetch::MediaFetcher;
use inflight::InFlightSet;
use normalize::{FfmpegTranscoder, VideoNormalizer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound for a single direct media download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(35);

/// Routes requests to the chain of their platform and owns the process-wide
/// attempt log and in-flight set.
pub struct MediaAcquirer {
    chains: HashMap<Platform, Box<dyn PlatformChain>>,
    log: Arc<AttemptLog>,
    in_flight: InFlightSet,
}

impl MediaAcquirer {
    pub fn new(log: Arc<AttemptLog>, chains: Vec<Box<dyn PlatformChain>>) -> Self {
        let chains = chains
            .into_iter()
            .map(|chain| (chain.platform(), chain))
            .collect();
        Self {
            chains,
            log,
            in_flight: InFlightSet::new(),
        }
    }

    /// Wires the production chains: ranked HTTP sources, yt-dlp and ffmpeg.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let log = Arc::new(AttemptLog::with_retention(config.media.log_retention));
        let transcoder = Arc::new(FfmpegTranscoder::new(
            config.media.transcode_timeout(),
            config.media.max_clip_seconds,
        ));
        let ctx = ChainContext {
            log: log.clone(),
            fetcher: MediaFetcher::new(client, DOWNLOAD_TIMEOUT),
            normalizer: VideoNormalizer::new(
                transcoder,
                config.media.compress_threshold_bytes(),
                config.media.max_clip_seconds,
            ),
            extractor: Arc::new(YtDlpExtractor::new()),
            download_dir: config.media.download_dir.clone(),
        };

        let sources = &config.sources;
        let chains: Vec<Box<dyn PlatformChain>> = vec![
            Box::new(ShortVideoChain::new(
                ctx.clone(),
                sources.short_video_apis.clone(),
                sources.api_timeout(),
            )),
            Box::new(PhotoShareChain::new(
                ctx.clone(),
                PhotoShareSources {
                    apis: sources.photo_share_apis.clone(),
                    page_base: sources.photo_share_base.clone(),
                    oembed_base: sources.oembed_base.clone(),
                    api_timeout: sources.api_timeout(),
                    scrape_timeout: sources.scrape_timeout(),
                },
            )),
            Box::new(LongFormChain::new(ctx)),
        ];

        info!(
            "Media acquirer initialized, downloads go to {}",
            config.media.download_dir.display()
        );
        Ok(Self::new(log, chains))
    }

    pub fn log(&self) -> &Arc<AttemptLog> {
        &self.log
    }

    /// Claims the (chat, URL) pair; `None` while another task holds it.
    pub fn begin(&self, chat: &str, url: &str) -> Option<InFlightGuard> {
        self.in_flight.try_begin(chat, url)
    }

    /// Like [`acquire`](Self::acquire) with the platform given by its tag.
    pub async fn acquire_url(
        &self,
        url: &str,
        platform_tag: &str,
        identity: Option<&str>,
    ) -> Result<AcquisitionResult, AcquireError> {
        let platform: Platform = platform_tag.parse()?;
        let request = AcquisitionRequest::new(url, platform);
        let request = match identity {
            Some(identity) => request.with_identity(identity),
            None => request,
        };
        self.acquire(&request).await
    }

    pub async fn acquire(
        &self,
        request: &AcquisitionRequest,
    ) -> Result<AcquisitionResult, AcquireError> {
        let url = request.url.as_str();
        self.log.record(
            url,
            Attempt::new(attempt_log::START, "processing")
                .identity(request.identity.as_deref())
                .platform(request.platform),
        );

        let outcome = match self.dispatch(request).await {
            Ok(result) => {
                if result.verify().await {
                    Ok(result)
                } else {
                    warn!("{} produced a missing or empty file", request.platform);
                    result.cleanup().await;
                    Err(AcquireError::failed(request.platform))
                }
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(result) => self.log.record(
                url,
                Attempt::new("DONE", result.kind()).platform(request.platform),
            ),
            Err(e) => self.log.record(
                url,
                Attempt::new("ERROR", e.tag())
                    .platform(request.platform)
                    .error(e),
            ),
        }
        outcome
    }

    async fn dispatch(
        &self,
        request: &AcquisitionRequest,
    ) -> Result<AcquisitionResult, AcquireError> {
        let chain = self
            .chains
            .get(&request.platform)
            .ok_or_else(|| AcquireError::UnsupportedPlatform(request.platform.to_string()))?;

        match chain.acquire(request).await {
            Err(AcquireError::AcquisitionFailed {
                platform: Platform::PhotoShare,
            }) => self.rescue(request).await,
            other => other,
        }
    }

    /// Last try for photo-share links: the long-form extractor often handles
    /// public embed pages. Any failure keeps the original platform.
    async fn rescue(
        &self,
        request: &AcquisitionRequest,
    ) -> Result<AcquisitionResult, AcquireError> {
        let Some(chain) = self.chains.get(&Platform::LongForm) else {
            return Err(AcquireError::failed(request.platform));
        };
        self.log.record(
            &request.url,
            Attempt::new("Rescue", "trying long-form extractor"),
        );
        chain
            .acquire(request)
            .await
            .map_err(|_| AcquireError::failed(request.platform))
    }

    pub async fn test_setup(&self) -> Result<()> {
        info!("Testing media tool setup...");

        let ytdlp_available = YtDlpExtractor::test_availability().await;
        let ffmpeg_available = FfmpegTranscoder::test_availability().await;

        if !ffmpeg_available {
            warn!("Oversized videos cannot be compressed without ffmpeg");
        }
        if ytdlp_available {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "yt-dlp is not available. Please install it for the extractor fallback."
            ))
        }
    }
}

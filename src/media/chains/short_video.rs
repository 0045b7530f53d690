use super::{probe_api, ApiPayload, ChainContext, MultiEntryPolicy, PlatformChain};
use crate::media::attempt_log::Attempt;
use crate::media::error::AcquireError;
use crate::media::platform::Platform;
use crate::media::types::{AcquisitionRequest, AcquisitionResult};
use crate::utils::truncate;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::info;

const PREFIX: &str = "tiktok";
const EXTRACTOR_FORMAT: &str =
    "bestvideo[vcodec=h264]+bestaudio/best[vcodec=h264]/bestvideo[vcodec=avc1]+bestaudio/best[vcodec=avc1]/best";

/// A video found by an earlier API, kept while later APIs are checked for a slideshow.
struct VideoCandidate {
    label: String,
    api: String,
    play_url: String,
}

/// Short-video chain: ranked public APIs, then the generic extractor.
///
/// A slideshow from any API outranks a video found earlier; the first video is
/// only downloaded once every API has been asked.
pub struct ShortVideoChain {
    ctx: ChainContext,
    apis: Vec<String>,
    api_timeout: Duration,
}

impl ShortVideoChain {
    pub fn new(ctx: ChainContext, apis: Vec<String>, api_timeout: Duration) -> Self {
        Self {
            ctx,
            apis,
            api_timeout,
        }
    }

    fn is_photo_link(url: &str) -> bool {
        url.to_ascii_lowercase().contains("/photo/")
    }
}

#[async_trait]
impl PlatformChain for ShortVideoChain {
    fn platform(&self) -> Platform {
        Platform::ShortVideo
    }

    async fn acquire(
        &self,
        request: &AcquisitionRequest,
    ) -> Result<AcquisitionResult, AcquireError> {
        let url = request.url.as_str();
        let log = &self.ctx.log;

        if Self::is_photo_link(url) {
            log.record(url, Attempt::new("TikTok photo", "LINK ONLY"));
            return Err(AcquireError::PhotoNotSupported);
        }
        self.ctx.prepare(request).await?;

        let mut candidate: Option<VideoCandidate> = None;
        let no_headers = HeaderMap::new();

        for (index, api) in self.apis.iter().enumerate() {
            let label = format!("API {}", index + 1);
            let source = truncate(api, 40);
            log.record(url, Attempt::new(&label, "probing").source(source));

            match probe_api(&self.ctx.fetcher, api, url, self.api_timeout).await {
                Ok(ApiPayload::Slideshow { images, music }) => {
                    match self
                        .ctx
                        .download_slideshow(&images, music.as_deref(), PREFIX, &no_headers)
                        .await
                    {
                        Ok(result) => {
                            log.record(
                                url,
                                Attempt::new(&label, format!("SLIDESHOW OK ({} images)", images.len()))
                                    .source(source),
                            );
                            return Ok(result);
                        }
                        Err(e) => {
                            log.record(url, Attempt::new(&label, "FAIL").source(source).error(e));
                        }
                    }
                }
                Ok(ApiPayload::Video(play_url)) => {
                    if candidate.is_none() {
                        log.record(
                            url,
                            Attempt::new(&label, "VIDEO FOUND, checking for slideshow")
                                .source(source),
                        );
                        candidate = Some(VideoCandidate {
                            label,
                            api: source.to_string(),
                            play_url,
                        });
                    } else {
                        log.record(url, Attempt::new(&label, "VIDEO (skipped)").source(source));
                    }
                }
                Ok(ApiPayload::Photo(_)) => {
                    log.record(url, Attempt::new(&label, "PHOTO, link only").source(source));
                    return Err(AcquireError::PhotoNotSupported);
                }
                Err(e) => {
                    log.record(url, Attempt::new(&label, "FAIL").source(source).error(e));
                }
            }
        }

        if let Some(found) = candidate {
            info!("Downloading video candidate from {}", found.api);
            match self
                .ctx
                .download_video(&found.play_url, PREFIX, &no_headers)
                .await
            {
                Ok(result) => {
                    log.record(url, Attempt::new(&found.label, "VIDEO OK").source(&found.api));
                    return Ok(result);
                }
                Err(e) => {
                    log.record(
                        url,
                        Attempt::new(&found.label, "VIDEO FAIL")
                            .source(&found.api)
                            .error(e),
                    );
                }
            }
        }

        let extractor = self.ctx.extractor.name();
        log.record(url, Attempt::new("Extractor", "fallback").source(extractor));
        match self
            .ctx
            .generic_fallback(url, EXTRACTOR_FORMAT, PREFIX, MultiEntryPolicy::Slideshow)
            .await
        {
            Ok(result) => {
                log.record(
                    url,
                    Attempt::new("Extractor", format!("{} OK", result.kind())).source(extractor),
                );
                Ok(result)
            }
            Err(e) => {
                log.record(url, Attempt::new("Extractor", "FAIL").source(extractor).error(e));
                Err(AcquireError::failed(Platform::ShortVideo))
            }
        }
    }
}

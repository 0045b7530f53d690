use super::{ChainContext, MultiEntryPolicy, PlatformChain};
use crate::media::attempt_log::Attempt;
use crate::media::error::AcquireError;
use crate::media::platform::Platform;
use crate::media::types::{AcquisitionRequest, AcquisitionResult};
use async_trait::async_trait;

const PREFIX: &str = "youtube";
/// Mp4 at 720p or below keeps uploads small; anything playable otherwise.
pub const LONG_FORM_FORMAT: &str = "best[height<=720][ext=mp4]/best";

/// Long-form chain: the generic extractor is the only strategy.
pub struct LongFormChain {
    ctx: ChainContext,
}

impl LongFormChain {
    pub fn new(ctx: ChainContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PlatformChain for LongFormChain {
    fn platform(&self) -> Platform {
        Platform::LongForm
    }

    async fn acquire(
        &self,
        request: &AcquisitionRequest,
    ) -> Result<AcquisitionResult, AcquireError> {
        let url = request.url.as_str();
        let log = &self.ctx.log;
        self.ctx.prepare(request).await?;

        let extractor = self.ctx.extractor.name();
        log.record(url, Attempt::new("Extractor", "downloading").source(extractor));

        match self
            .ctx
            .generic_fallback(url, LONG_FORM_FORMAT, PREFIX, MultiEntryPolicy::FirstItem)
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
                Err(AcquireError::failed(Platform::LongForm))
            }
        }
    }
}

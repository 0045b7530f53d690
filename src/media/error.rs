use super::platform::Platform;
use thiserror::Error;

/// Failure of a single direct download.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("empty response body")]
    Empty,
    #[error("response too small ({0} bytes)")]
    TooSmall(u64),
}

/// Signals handed to the delivery layer. Display output starts with the tag so
/// callers can match on text as well as on the variant.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("PHOTO_NOT_SUPPORTED")]
    PhotoNotSupported,
    #[error("{}", failed_tag(.platform))]
    AcquisitionFailed { platform: Platform },
    #[error("UNSUPPORTED_PLATFORM: {0}")]
    UnsupportedPlatform(String),
    #[error("FETCH_ERROR: {0}")]
    Fetch(#[from] FetchError),
}

impl AcquireError {
    pub fn failed(platform: Platform) -> Self {
        AcquireError::AcquisitionFailed { platform }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            AcquireError::PhotoNotSupported => "PHOTO_NOT_SUPPORTED",
            AcquireError::AcquisitionFailed { platform } => failed_tag(platform),
            AcquireError::UnsupportedPlatform(_) => "UNSUPPORTED_PLATFORM",
            AcquireError::Fetch(_) => "FETCH_ERROR",
        }
    }
}

fn failed_tag(platform: &Platform) -> &'static str {
    match platform {
        Platform::ShortVideo => "TIKTOK_FAIL",
        Platform::PhotoShare => "INSTAGRAM_FAIL",
        Platform::LongForm => "YOUTUBE_FAIL",
    }
}

/// Failure of one source inside a strategy chain. Never escapes the chain.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed response: {0}")]
    Parse(String),
    #[error("missing {0}")]
    Missing(&'static str),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("extractor failed: {0}")]
    Extractor(String),
    #[error("normalization failed: {0}")]
    Normalize(String),
}

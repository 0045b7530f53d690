use super::error::AcquireError;
use regex::Regex;
use std::{collections::HashSet, fmt, str::FromStr, sync::LazyLock};

/// Platforms the bot knows how to acquire media from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Short-video app (TikTok).
    ShortVideo,
    /// Photo/video-sharing app (Instagram).
    PhotoShare,
    /// Long-form video app (YouTube, including Shorts).
    LongForm,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::ShortVideo, Platform::PhotoShare, Platform::LongForm];

    pub fn tag(&self) -> &'static str {
        match self {
            Platform::ShortVideo => "tiktok",
            Platform::PhotoShare => "instagram",
            Platform::LongForm => "youtube",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::ShortVideo => "TikTok",
            Platform::PhotoShare => "Instagram",
            Platform::LongForm => "YouTube",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Platform::ShortVideo => "🎪",
            Platform::PhotoShare => "📸",
            Platform::LongForm => "📺",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            Platform::ShortVideo => &SHORT_VIDEO_RE,
            Platform::PhotoShare => &PHOTO_SHARE_RE,
            Platform::LongForm => &LONG_FORM_RE,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Platform {
    type Err = AcquireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.tag().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AcquireError::UnsupportedPlatform(s.to_string()))
    }
}

static SHORT_VIDEO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:www\.|m\.)?(?:vm\.tiktok\.com|vt\.tiktok\.com|tiktok\.com)/[\w@./-]+")
        .expect("short-video pattern is valid")
});

static LONG_FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)https?://(?:www\.|m\.)?(?:youtube\.com/(?:shorts/|watch\?v=|embed/)|youtu\.be/)[\w?=&-]+",
    )
    .expect("long-form pattern is valid")
});

static PHOTO_SHARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:www\.)?instagram\.com/(?:p|reel)/[^/\s?]{8,}/?")
        .expect("photo-share pattern is valid")
});

/// Finds every supported link in a chat message, in the order they appear.
pub fn detect_links(text: &str) -> Vec<(String, Platform)> {
    let mut found: Vec<(usize, String, Platform)> = Platform::ALL
        .into_iter()
        .flat_map(|platform| {
            platform
                .pattern()
                .find_iter(text)
                .map(move |m| (m.start(), m.as_str().to_string(), platform))
        })
        .collect();

    found.sort_by_key(|(start, _, _)| *start);
    let mut seen = HashSet::new();
    found.retain(|(_, url, _)| seen.insert(url.clone()));
    found
        .into_iter()
        .map(|(_, url, platform)| (url, platform))
        .collect()
}

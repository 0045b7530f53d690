//! Message texts and upload planning for acquired media.

use crate::media::{AcquireError, AcquisitionResult, Platform};
use crate::utils::{format_megabytes, truncate};
use std::path::{Path, PathBuf};

/// Discord message content limit.
pub const MAX_MESSAGE_CHARS: usize = 2000;
/// Discord attachments per message.
pub const MAX_ATTACHMENTS: usize = 10;

pub fn status_text(identity: &str, platform: Platform) -> String {
    format!("⏳ {}, {}...", identity, platform.display_name())
}

pub fn caption(identity: &str, platform: Platform, url: &str) -> String {
    format!("{} **{}** <{}>", platform.emoji(), identity, url)
}

pub fn audio_caption(platform: Platform) -> String {
    format!("🎵 {}", platform.emoji())
}

/// Reply for a failed acquisition; each error kind gets its own text.
pub fn failure_reply(error: &AcquireError, identity: &str, url: &str) -> String {
    match error {
        AcquireError::PhotoNotSupported => {
            format!("📸 {}\nTikTok photo (link only):\n{}", identity, url)
        }
        AcquireError::AcquisitionFailed { platform } => format!(
            "❌ {}\n{} is unavailable\nLink: {}",
            identity,
            platform.display_name(),
            url
        ),
        AcquireError::UnsupportedPlatform(tag) => {
            format!("❌ {}\nUnsupported platform `{}`\nLink: {}", identity, tag, url)
        }
        AcquireError::Fetch(e) => format!(
            "❌ {}\nDownload error: {}\nLink: {}",
            identity,
            truncate(&e.to_string(), 150),
            url
        ),
    }
}

pub fn too_large_reply(identity: &str, size_bytes: u64, limit_bytes: u64, url: &str) -> String {
    format!(
        "❌ {}\nFile too large: {} (limit {})\nLink: {}",
        identity,
        format_megabytes(size_bytes),
        format_megabytes(limit_bytes),
        url
    )
}

/// One outgoing message: optional text plus the files to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub content: Option<String>,
    pub files: Vec<PathBuf>,
}

/// Messages needed to deliver `result`. Slideshow images go out in groups of
/// [`MAX_ATTACHMENTS`] with the caption on the first group; audio follows alone.
pub fn plan_uploads(result: &AcquisitionResult, caption: &str, platform: Platform) -> Vec<Upload> {
    match result {
        AcquisitionResult::Video { path, .. } | AcquisitionResult::Image { path } => {
            vec![Upload {
                content: Some(caption.to_string()),
                files: vec![path.clone()],
            }]
        }
        AcquisitionResult::Slideshow {
            image_paths,
            audio_path,
        } => {
            let mut uploads: Vec<Upload> = image_paths
                .chunks(MAX_ATTACHMENTS)
                .enumerate()
                .map(|(index, group)| Upload {
                    content: (index == 0).then(|| caption.to_string()),
                    files: group.to_vec(),
                })
                .collect();
            if let Some(audio) = audio_path {
                uploads.push(Upload {
                    content: Some(audio_caption(platform)),
                    files: vec![audio.clone()],
                });
            }
            uploads
        }
    }
}

/// Size of the heaviest single message; the upload limit applies per request.
pub async fn largest_upload(uploads: &[Upload]) -> u64 {
    let mut largest = 0;
    for upload in uploads {
        let mut total = 0;
        for path in &upload.files {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                total += meta.len();
            }
        }
        largest = largest.max(total);
    }
    largest
}

/// Attachment name; keeps the extension so Discord can render the media inline.
pub fn attachment_name(index: usize, path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("media_{}.{}", index + 1, ext.to_ascii_lowercase()),
        None => format!("media_{}", index + 1),
    }
}

/// Splits text into pieces that fit one message, preferring line boundaries.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let mut line = line;
        while line.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let head = truncate(line, max_chars);
            chunks.push(head.to_string());
            line = &line[head.len()..];
        }

        let needed = current.chars().count() + line.chars().count() + usize::from(!current.is_empty());
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

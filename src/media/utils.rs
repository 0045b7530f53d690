use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "heic"];
const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "m4a", "aac", "opus", "ogg"];
const PLAYABLE_VIDEO_EXTENSIONS: [&str; 2] = ["mp4", "mov"];

/// Returns the size of `path` if it exists and is non-empty.
pub async fn verify_file(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        Ok(_) => {
            debug!("{} is empty", path.display());
            None
        }
        Err(_) => None,
    }
}

pub async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Randomized file name so concurrent acquisitions never collide in the shared directory.
pub fn random_file_name(prefix: &str, ext: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}.{}", prefix, &token[..12], ext)
}

/// Lower-cased extension of a URL's path, ignoring query string and fragment.
pub fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn path_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext)
}

pub fn is_audio_extension(ext: &str) -> bool {
    AUDIO_EXTENSIONS.contains(&ext)
}

pub fn is_playable_video_extension(ext: &str) -> bool {
    PLAYABLE_VIDEO_EXTENSIONS.contains(&ext)
}

/// `downloads/tiktok_ab12.webm` + (`small`, `mp4`) -> `downloads/tiktok_ab12_small.mp4`
pub fn sibling_path(path: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("media");
    path.with_file_name(format!("{}_{}.{}", stem, suffix, ext))
}

use super::utils::{is_audio_extension, is_image_extension, random_file_name, url_extension};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One item of a gallery or slideshow reported by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub url: String,
    pub ext: Option<String>,
}

impl ExtractedEntry {
    fn ext(&self) -> Option<String> {
        self.ext.clone().or_else(|| url_extension(&self.url))
    }

    pub fn is_image(&self) -> bool {
        self.ext().is_some_and(|e| is_image_extension(&e))
    }

    pub fn is_audio(&self) -> bool {
        self.ext().is_some_and(|e| is_audio_extension(&e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// The extractor downloaded a single file.
    Single(PathBuf),
    /// Gallery-like result; the caller downloads the entries it wants.
    MultiEntry(Vec<ExtractedEntry>),
}

#[derive(Debug, Clone)]
pub struct ExtractOptions<'a> {
    pub format: &'a str,
    pub prefix: &'a str,
    pub dir: &'a Path,
}

/// Generic media extractor used as the last resort of every chain.
#[async_trait]
pub trait GenericExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, url: &str, options: &ExtractOptions<'_>) -> Result<Extracted>;
}

pub struct YtDlpExtractor {
    metadata_timeout: Duration,
    download_timeout: Duration,
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpExtractor {
    pub fn new() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(120),
        }
    }

    async fn dump_json(&self, url: &str) -> Result<Value> {
        debug!("Extracting metadata with yt-dlp for: {}", url);

        let output = tokio::time::timeout(
            self.metadata_timeout,
            Command::new("yt-dlp")
                .arg("--dump-single-json")
                .arg("--no-download")
                .arg("--no-warnings")
                .arg(url)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("Media metadata extraction timed out")?
        .context("Failed to extract media metadata")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "Media metadata extraction failed: {}",
                error.trim()
            ));
        }

        serde_json::from_slice(&output.stdout).context("Failed to parse media metadata")
    }

    async fn download(&self, url: &str, options: &ExtractOptions<'_>) -> Result<PathBuf> {
        let template = options
            .dir
            .join(random_file_name(options.prefix, "%(ext)s"));
        info!("Downloading media with yt-dlp: {}", url);

        let output = tokio::time::timeout(
            self.download_timeout,
            Command::new("yt-dlp")
                .arg("--no-warnings")
                .arg("--no-playlist")
                .arg("--format")
                .arg(options.format)
                .arg("--merge-output-format")
                .arg("mp4")
                .arg("--output")
                .arg(&template)
                .arg("--print")
                .arg("after_move:filepath")
                .arg(url)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("Media download timed out")?
        .context("Failed to download media")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!("Media download failed: {}", error.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| anyhow::anyhow!("yt-dlp did not report an output file"))?;
        Ok(PathBuf::from(path))
    }

    pub async fn test_availability() -> bool {
        match Command::new("yt-dlp").arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp is available, version: {}", version.trim());
                true
            }
            Ok(_) => {
                warn!("❌ yt-dlp command failed");
                false
            }
            Err(e) => {
                warn!("❌ yt-dlp not found: {}", e);
                false
            }
        }
    }
}

/// Entries of a playlist-shaped dump, or `None` for single media.
pub fn parse_entries(json: &Value) -> Option<Vec<ExtractedEntry>> {
    let entries = json["entries"].as_array()?;
    if entries.is_empty() {
        return None;
    }

    let parsed: Vec<ExtractedEntry> = entries
        .iter()
        .filter_map(|entry| {
            let url = entry["url"]
                .as_str()
                .or_else(|| entry["webpage_url"].as_str())?;
            Some(ExtractedEntry {
                url: url.to_string(),
                ext: entry["ext"].as_str().map(str::to_ascii_lowercase),
            })
        })
        .collect();

    (!parsed.is_empty()).then_some(parsed)
}

#[async_trait]
impl GenericExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(&self, url: &str, options: &ExtractOptions<'_>) -> Result<Extracted> {
        let json = self.dump_json(url).await?;
        if let Some(entries) = parse_entries(&json) {
            debug!("yt-dlp reported {} entries for {}", entries.len(), url);
            return Ok(Extracted::MultiEntry(entries));
        }

        let path = self.download(url, options).await?;
        Ok(Extracted::Single(path))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Extractor returning a scripted outcome. `Single` payloads are written to
    /// a fresh file in the requested directory.
    pub(crate) enum Script {
        Fail,
        Single { ext: &'static str, bytes: usize },
        Multi(Vec<ExtractedEntry>),
    }

    pub(crate) struct FakeExtractor {
        pub script: Script,
        pub calls: AtomicUsize,
    }

    impl FakeExtractor {
        pub fn new(script: Script) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenericExtractor for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake-extractor"
        }

        async fn extract(&self, _url: &str, options: &ExtractOptions<'_>) -> Result<Extracted> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Fail => Err(anyhow::anyhow!("unsupported URL")),
                Script::Single { ext, bytes } => {
                    let path = options.dir.join(random_file_name(options.prefix, ext));
                    tokio::fs::write(&path, vec![3u8; *bytes]).await?;
                    Ok(Extracted::Single(path))
                }
                Script::Multi(entries) => Ok(Extracted::MultiEntry(entries.clone())),
            }
        }
    }

    #[test]
    fn test_parse_entries_playlist() {
        let json = json!({
            "_type": "playlist",
            "entries": [
                {"url": "https://cdn.example/1.jpg", "ext": "JPG"},
                {"webpage_url": "https://cdn.example/2"},
                {"title": "no url"},
                {"url": "https://cdn.example/music.mp3"}
            ]
        });
        let entries = parse_entries(&json).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_image());
        assert_eq!(entries[0].ext.as_deref(), Some("jpg"));
        assert!(!entries[1].is_image());
        assert!(entries[2].is_audio());
        assert_eq!(entries[1].ext(), None);
    }

    #[test]
    fn test_parse_entries_single_media() {
        assert!(parse_entries(&json!({"id": "abc", "ext": "mp4"})).is_none());
        assert!(parse_entries(&json!({"entries": []})).is_none());
        assert!(parse_entries(&json!({"entries": [{"title": "x"}]})).is_none());
    }

    #[tokio::test]
    #[ignore = "Requires yt-dlp and network access"]
    async fn test_ytdlp_rejects_bogus_url() {
        let dir = tempfile::tempdir().unwrap();
        let options = ExtractOptions {
            format: "best",
            prefix: "test",
            dir: dir.path(),
        };
        let result = YtDlpExtractor::new()
            .extract("https://example.invalid/nothing", &options)
            .await;
        assert!(result.is_err());
    }
}

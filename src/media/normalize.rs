use super::error::SourceError;
use super::utils::{path_extension, remove_quietly, sibling_path, verify_file};
use crate::utils::format_megabytes;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// External transcoding capability. Every operation reports plain success:
/// `true` only if the process finished in time and left a non-empty output.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Re-encodes `input` into a smaller 720p file.
    async fn compress(&self, input: &Path, output: &Path) -> bool;

    /// Copies the first `max_seconds` of `input` without re-encoding.
    async fn trim(&self, input: &Path, output: &Path, max_seconds: u32) -> bool;

    /// Repackages `input` into an mp4 container.
    async fn remux(&self, input: &Path, output: &Path) -> bool;
}

pub struct FfmpegTranscoder {
    timeout: Duration,
    max_seconds: u32,
}

impl FfmpegTranscoder {
    pub fn new(timeout: Duration, max_seconds: u32) -> Self {
        Self {
            timeout,
            max_seconds,
        }
    }

    fn compress_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.push("-i".into());
        args.push(input.into());
        args.push("-t".into());
        args.push(self.max_seconds.to_string().into());
        for arg in [
            "-vf",
            "scale=-2:720",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "28",
            "-maxrate",
            "1500k",
            "-bufsize",
            "3000k",
            "-c:a",
            "aac",
            "-b:a",
            "96k",
            "-movflags",
            "+faststart",
        ] {
            args.push(arg.into());
        }
        args.push(output.into());
        args
    }

    async fn run(&self, label: &str, args: Vec<OsString>, output: &Path) -> bool {
        debug!("Running ffmpeg ({}) with {:?}", label, args);

        let result = tokio::time::timeout(
            self.timeout,
            Command::new("ffmpeg")
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Err(_) => {
                warn!("ffmpeg {} timed out after {:?}", label, self.timeout);
                false
            }
            Ok(Err(e)) => {
                warn!("Failed to spawn ffmpeg for {}: {}", label, e);
                false
            }
            Ok(Ok(out)) if !out.status.success() => {
                warn!(
                    "ffmpeg {} failed with {}: {}",
                    label,
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                false
            }
            Ok(Ok(_)) => verify_file(output).await.is_some(),
        }
    }

    pub async fn test_availability() -> bool {
        match Command::new("ffmpeg").arg("-version").output().await {
            Ok(output) if output.status.success() => {
                let version_line = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("unknown")
                    .to_string();
                info!("✅ ffmpeg is available: {}", version_line);
                true
            }
            Ok(_) => {
                warn!("❌ ffmpeg command failed");
                false
            }
            Err(e) => {
                warn!("❌ ffmpeg not found: {} (required for compression)", e);
                false
            }
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn compress(&self, input: &Path, output: &Path) -> bool {
        let args = self.compress_args(input, output);
        self.run("compress", args, output).await
    }

    async fn trim(&self, input: &Path, output: &Path, max_seconds: u32) -> bool {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.push("-i".into());
        args.push(input.into());
        args.extend(["-t".into(), max_seconds.to_string().into()]);
        args.extend(["-c".into(), "copy".into()]);
        args.push(output.into());
        self.run("trim", args, output).await
    }

    async fn remux(&self, input: &Path, output: &Path) -> bool {
        let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.push("-i".into());
        args.push(input.into());
        for arg in ["-c", "copy", "-movflags", "+faststart"] {
            args.push(arg.into());
        }
        args.push(output.into());
        self.run("remux", args, output).await
    }
}

/// Shrinks downloaded videos that exceed the delivery threshold.
#[derive(Clone)]
pub struct VideoNormalizer {
    transcoder: Arc<dyn Transcoder>,
    threshold_bytes: u64,
    max_seconds: u32,
}

impl VideoNormalizer {
    pub fn new(transcoder: Arc<dyn Transcoder>, threshold_bytes: u64, max_seconds: u32) -> Self {
        Self {
            transcoder,
            threshold_bytes,
            max_seconds,
        }
    }

    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    /// Returns the deliverable file and its size. Oversized input is compressed,
    /// or trimmed when compression fails; the original is then removed. On error
    /// the input file is removed as well.
    pub async fn normalize(&self, path: PathBuf) -> Result<(PathBuf, u64), SourceError> {
        let size = match verify_file(&path).await {
            Some(size) => size,
            None => return Err(SourceError::Missing("downloaded video")),
        };

        if size <= self.threshold_bytes {
            debug!(
                "{} ({}) is within size limit",
                path.display(),
                format_megabytes(size)
            );
            return Ok((path, size));
        }

        info!(
            "Compressing {} ({}) to fit within {}",
            path.display(),
            format_megabytes(size),
            format_megabytes(self.threshold_bytes)
        );

        let compressed = sibling_path(&path, "small", "mp4");
        if self.transcoder.compress(&path, &compressed).await {
            if let Some(new_size) = verify_file(&compressed).await {
                info!(
                    "Compressed {} from {} to {}",
                    path.display(),
                    format_megabytes(size),
                    format_megabytes(new_size)
                );
                remove_quietly(&path).await;
                return Ok((compressed, new_size));
            }
        }
        remove_quietly(&compressed).await;

        warn!(
            "Compression failed for {}, trimming to {}s",
            path.display(),
            self.max_seconds
        );
        let ext = path_extension(&path).unwrap_or_else(|| "mp4".to_string());
        let trimmed = sibling_path(&path, "clip", &ext);
        if self.transcoder.trim(&path, &trimmed, self.max_seconds).await {
            if let Some(new_size) = verify_file(&trimmed).await {
                info!(
                    "Trimmed {} from {} to {}",
                    path.display(),
                    format_megabytes(size),
                    format_megabytes(new_size)
                );
                remove_quietly(&path).await;
                return Ok((trimmed, new_size));
            }
        }
        remove_quietly(&trimmed).await;
        remove_quietly(&path).await;

        Err(SourceError::Normalize(format!(
            "could not shrink {} below {}",
            path.display(),
            format_megabytes(self.threshold_bytes)
        )))
    }
}

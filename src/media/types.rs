use super::platform::Platform;
use super::utils::{remove_quietly, verify_file};
use std::path::{Path, PathBuf};

/// One URL to acquire, as handed over by the message-dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    pub url: String,
    pub platform: Platform,
    pub identity: Option<String>,
}

impl AcquisitionRequest {
    pub fn new(url: impl Into<String>, platform: Platform) -> Self {
        Self {
            url: url.into(),
            platform,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

/// Media produced by an acquisition. The caller owns every referenced file and
/// must remove them once delivered (see [`AcquisitionResult::cleanup`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionResult {
    Video {
        path: PathBuf,
        size_bytes: u64,
    },
    Image {
        path: PathBuf,
    },
    Slideshow {
        image_paths: Vec<PathBuf>,
        audio_path: Option<PathBuf>,
    },
}

impl AcquisitionResult {
    pub fn kind(&self) -> &'static str {
        match self {
            AcquisitionResult::Video { .. } => "VIDEO",
            AcquisitionResult::Image { .. } => "PHOTO",
            AcquisitionResult::Slideshow { .. } => "SLIDESHOW",
        }
    }

    pub fn paths(&self) -> Vec<&Path> {
        match self {
            AcquisitionResult::Video { path, .. } | AcquisitionResult::Image { path } => {
                vec![path.as_path()]
            }
            AcquisitionResult::Slideshow {
                image_paths,
                audio_path,
            } => image_paths
                .iter()
                .chain(audio_path.iter())
                .map(PathBuf::as_path)
                .collect(),
        }
    }

    /// True when every referenced file exists and is non-empty.
    pub async fn verify(&self) -> bool {
        for path in self.paths() {
            if verify_file(path).await.is_none() {
                return false;
            }
        }
        !self.paths().is_empty()
    }

    pub async fn cleanup(&self) {
        for path in self.paths() {
            remove_quietly(path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_verify_and_cleanup_slideshow() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.jpg");
        let second = dir.path().join("b.jpg");
        let audio = dir.path().join("c.mp3");
        for path in [&first, &second, &audio] {
            tokio::fs::write(path, b"data").await.unwrap();
        }

        let result = AcquisitionResult::Slideshow {
            image_paths: vec![first.clone(), second.clone()],
            audio_path: Some(audio.clone()),
        };
        assert_eq!(result.kind(), "SLIDESHOW");
        assert_eq!(result.paths().len(), 3);
        assert!(result.verify().await);

        result.cleanup().await;
        assert!(!first.exists());
        assert!(!second.exists());
        assert!(!audio.exists());
        assert!(!result.verify().await);
    }

    #[tokio::test]
    async fn test_verify_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        tokio::fs::write(&path, b"").await.unwrap();

        let result = AcquisitionResult::Video {
            path,
            size_bytes: 0,
        };
        assert!(!result.verify().await);
    }

    #[test]
    fn test_request_builder() {
        let request = AcquisitionRequest::new("https://youtu.be/abc", Platform::LongForm)
            .with_identity("alice");
        assert_eq!(request.identity.as_deref(), Some("alice"));
        assert_eq!(request.platform, Platform::LongForm);
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::MEGABYTE;

pub const DEFAULT_SHORT_VIDEO_APIS: [&str; 4] = [
    "https://tikwm.com/api/?url=",
    "https://www.snaptik.app/abc.php?url=",
    "https://tikwm.com/api/?url=",
    "https://ssstik.io/abc.php?url=",
];

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub discord_token: Option<String>,
    pub logging: LoggingConfig,
    pub media: MediaConfig,
    pub sources: SourcesConfig,
    pub servers: Vec<ServerConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MediaConfig {
    pub download_dir: PathBuf,
    pub upload_limit_mb: u64,
    /// Videos above this size are compressed; defaults to the upload limit.
    pub compress_threshold_mb: Option<u64>,
    pub max_clip_seconds: u32,
    pub transcode_timeout_secs: u64,
    /// Number of URLs kept in the attempt log.
    pub log_retention: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            upload_limit_mb: 25,
            compress_threshold_mb: None,
            max_clip_seconds: 180,
            transcode_timeout_secs: 60,
            log_retention: 1000,
        }
    }
}

impl MediaConfig {
    pub fn upload_limit_bytes(&self) -> u64 {
        self.upload_limit_mb * MEGABYTE
    }

    pub fn compress_threshold_bytes(&self) -> u64 {
        self.compress_threshold_mb.unwrap_or(self.upload_limit_mb) * MEGABYTE
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    pub short_video_apis: Vec<String>,
    pub photo_share_apis: Vec<String>,
    pub photo_share_base: String,
    pub oembed_base: String,
    pub api_timeout_secs: u64,
    pub scrape_timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            short_video_apis: DEFAULT_SHORT_VIDEO_APIS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            photo_share_apis: Vec::new(),
            photo_share_base: "https://www.instagram.com".to_string(),
            oembed_base: "https://www.instagram.com".to_string(),
            api_timeout_secs: 15,
            scrape_timeout_secs: 25,
        }
    }
}

impl SourcesConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }

    /// Token from the file, else `$DISCORD_TOKEN`.
    pub fn get_discord_token(&self) -> Option<String> {
        self.discord_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("DISCORD_TOKEN").ok())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub server_id: String,
    pub auto_embed_channels: HashSet<String>,
    pub embed_enabled: bool,
    pub delete_original: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_id: String::new(),
            auto_embed_channels: HashSet::new(),
            embed_enabled: true,
            delete_original: false,
        }
    }
}

impl ServerConfig {
    pub fn new(server_id: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            ..Default::default()
        }
    }

    /// An empty channel list means every channel of the server is watched.
    pub fn is_auto_embed_channel(&self, channel_id: &str) -> bool {
        self.embed_enabled
            && (self.auto_embed_channels.is_empty()
                || self.auto_embed_channels.contains(channel_id))
    }
}

#[derive(Debug, Default)]
pub struct ConfigManager {
    configs: HashMap<String, ServerConfig>,
}

impl ConfigManager {
    pub fn from_servers(servers: &[ServerConfig]) -> Self {
        Self {
            configs: servers
                .iter()
                .map(|s| (s.server_id.clone(), s.clone()))
                .collect(),
        }
    }

    pub fn get_server_config(&self, server_id: &str) -> ServerConfig {
        self.configs
            .get(server_id)
            .cloned()
            .unwrap_or_else(|| ServerConfig::new(server_id))
    }

    /// Without any configured server every channel is watched; otherwise only
    /// the channels of configured servers are.
    pub fn is_auto_embed_channel(&self, guild_id: &str, channel_id: &str) -> bool {
        if self.configs.is_empty() {
            return true;
        }
        self.configs
            .get(guild_id)
            .is_some_and(|s| s.is_auto_embed_channel(channel_id))
    }

    pub fn is_embed_enabled(&self, guild_id: &str) -> bool {
        self.get_server_config(guild_id).embed_enabled
    }

    pub fn delete_original(&self, guild_id: &str) -> bool {
        self.configs
            .get(guild_id)
            .is_some_and(|s| s.delete_original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.get_logging_format(), "json");
        assert_eq!(config.media.upload_limit_mb, 25);
        assert_eq!(config.media.compress_threshold_bytes(), 25 * MEGABYTE);
        assert_eq!(config.media.max_clip_seconds, 180);
        assert_eq!(config.media.log_retention, 1000);
        assert_eq!(config.sources.short_video_apis.len(), 4);
        assert!(config.sources.photo_share_apis.is_empty());
        assert_eq!(config.sources.api_timeout(), Duration::from_secs(15));
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
discord_token = "abc"

[logging]
format = "text"

[media]
upload_limit_mb = 8
compress_threshold_mb = 6

[sources]
photo_share_apis = ["https://api.example/?url="]

[[servers]]
server_id = "42"
auto_embed_channels = ["7"]
delete_original = true
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.get_discord_token().as_deref(), Some("abc"));
        assert_eq!(config.get_logging_format(), "text");
        assert_eq!(config.media.upload_limit_bytes(), 8 * MEGABYTE);
        assert_eq!(config.media.compress_threshold_bytes(), 6 * MEGABYTE);
        assert_eq!(config.media.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.sources.photo_share_apis.len(), 1);

        let manager = ConfigManager::from_servers(&config.servers);
        assert!(manager.is_auto_embed_channel("42", "7"));
        assert!(!manager.is_auto_embed_channel("42", "8"));
        assert!(!manager.is_auto_embed_channel("99", "7"));
        assert!(manager.delete_original("42"));
        assert!(!manager.delete_original("99"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "media = 3").unwrap();
        assert!(Config::from_file(file.path()).is_err());
        assert!(Config::from_file("/nonexistent/clipgrab.toml").is_err());
    }

    #[test]
    fn test_without_servers_every_channel_is_watched() {
        let manager = ConfigManager::default();
        assert!(manager.is_auto_embed_channel("1", "2"));
        assert!(manager.is_embed_enabled("1"));
    }

    #[test]
    fn test_server_with_empty_channel_list_watches_all() {
        let server = ServerConfig::new("1");
        assert!(server.is_auto_embed_channel("anything"));

        let disabled = ServerConfig {
            embed_enabled: false,
            ..ServerConfig::new("1")
        };
        assert!(!disabled.is_auto_embed_channel("anything"));
    }
}

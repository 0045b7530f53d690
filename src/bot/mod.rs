pub mod delivery;
pub mod discord;

use crate::config::{Config, ConfigManager};
use crate::media::MediaAcquirer;
use anyhow::{Context, Result};

pub async fn run(config: Config) -> Result<()> {
    let token = config
        .get_discord_token()
        .context("A Discord token is required (discord_token in config or DISCORD_TOKEN)")?;

    let acquirer = MediaAcquirer::from_config(&config)?;
    let servers = ConfigManager::from_servers(&config.servers);

    let bot = discord::DiscordBot::new(
        token,
        acquirer,
        servers,
        config.media.upload_limit_bytes(),
    )
    .await?;
    bot.run().await
}

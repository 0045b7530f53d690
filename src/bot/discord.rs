use super::delivery::{self, Upload, MAX_MESSAGE_CHARS};
use crate::config::ConfigManager;
use crate::media::{detect_links, Attempt, MediaAcquirer, Platform};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use twilight_gateway::{Event, EventTypeFlags, Intents, Shard, ShardId, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_model::{
    application::{
        command::CommandType,
        interaction::{
            application_command::{CommandData, CommandOptionValue},
            Interaction, InteractionData, InteractionType,
        },
    },
    channel::message::MessageFlags,
    gateway::payload::incoming::MessageCreate,
    http::{
        attachment::Attachment,
        interaction::{InteractionResponse, InteractionResponseType},
    },
    id::{
        marker::{ApplicationMarker, ChannelMarker, MessageMarker},
        Id,
    },
};
use twilight_util::builder::{
    command::{CommandBuilder, StringBuilder},
    InteractionResponseDataBuilder,
};

const TIMELINE_RECORDS: usize = 15;
const RECENT_URLS: usize = 3;
const RECENT_RECORDS: usize = 5;

pub struct DiscordBot {
    http: Arc<HttpClient>,
    shard: Shard,
    relay: Relay,
    config: ConfigManager,
    application_id: Id<ApplicationMarker>,
}

/// Everything a spawned delivery task needs.
#[derive(Clone)]
struct Relay {
    http: Arc<HttpClient>,
    acquirer: Arc<MediaAcquirer>,
    upload_limit: u64,
}

/// One link to fetch and post back.
struct Job {
    channel_id: Id<ChannelMarker>,
    original: Option<Id<MessageMarker>>,
    delete_original: bool,
    url: String,
    platform: Platform,
    identity: String,
}

impl DiscordBot {
    pub async fn new(
        token: String,
        acquirer: MediaAcquirer,
        config: ConfigManager,
        upload_limit: u64,
    ) -> Result<Self> {
        let http = Arc::new(HttpClient::new(token.clone()));

        let intents = Intents::GUILD_MESSAGES | Intents::DIRECT_MESSAGES | Intents::MESSAGE_CONTENT;
        let shard = Shard::new(ShardId::ONE, token, intents);

        if let Err(e) = acquirer.test_setup().await {
            warn!("Media tool check failed: {}", e);
        }

        let application_id = {
            let response = http
                .current_user_application()
                .await
                .context("Failed to fetch application info")?;
            response.model().await?.id
        };

        let bot = Self {
            relay: Relay {
                http: http.clone(),
                acquirer: Arc::new(acquirer),
                upload_limit,
            },
            http,
            shard,
            config,
            application_id,
        };

        bot.register_commands().await?;

        Ok(bot)
    }

    async fn register_commands(&self) -> Result<()> {
        info!("Registering Discord slash commands...");

        let embed_command = CommandBuilder::new(
            "embed",
            "Download and embed media from a URL",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("url", "URL to download and embed").required(true))
        .build();
        let log_command = CommandBuilder::new(
            "log",
            "Show the download timeline of a URL",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("url", "URL to inspect").required(true))
        .build();

        let interaction = self.http.interaction(self.application_id);
        for command in [&embed_command, &log_command] {
            interaction
                .create_global_command()
                .chat_input(&command.name, &command.description)
                .command_options(&command.options)
                .await?;
        }
        interaction
            .create_global_command()
            .chat_input("logs", "Show the most recent download timelines")
            .await?;

        info!("Registered /embed, /log and /logs slash commands");
        Ok(())
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Discord bot starting...");

        loop {
            let event = match self.shard.next_event(EventTypeFlags::all()).await {
                Some(Ok(event)) => event,
                Some(Err(source)) => {
                    error!(?source, "Error receiving event");
                    continue;
                }
                None => {
                    info!("Shard stream ended");
                    return Ok(());
                }
            };

            match event {
                Event::MessageCreate(msg) => self.handle_message(&msg).await,
                Event::InteractionCreate(interaction) => {
                    if let Err(e) = self.handle_interaction(&interaction).await {
                        error!("Failed to handle interaction: {:#}", e);
                    }
                }
                Event::Ready(_) => {
                    info!("Discord bot is ready!");
                }
                _ => {}
            }
        }
    }

    async fn handle_message(&self, msg: &MessageCreate) {
        if msg.author.bot || msg.content.starts_with('/') {
            return;
        }

        let guild_id = msg.guild_id.map(|id| id.to_string()).unwrap_or_default();
        if !self
            .config
            .is_auto_embed_channel(&guild_id, &msg.channel_id.to_string())
        {
            return;
        }

        let links = detect_links(&msg.content);
        if links.is_empty() {
            return;
        }
        info!("{}: {} link(s)", msg.author.name, links.len());

        let delete_original = self.config.delete_original(&guild_id);
        for (url, platform) in links {
            let job = Job {
                channel_id: msg.channel_id,
                original: Some(msg.id),
                delete_original,
                url,
                platform,
                identity: msg.author.name.clone(),
            };
            tokio::spawn(self.relay.clone().deliver(job));
        }
    }

    #[allow(clippy::single_match)]
    async fn handle_interaction(&self, interaction: &Interaction) -> Result<()> {
        match interaction.kind {
            InteractionType::ApplicationCommand => {
                if let Some(InteractionData::ApplicationCommand(data)) = &interaction.data {
                    match data.name.as_str() {
                        "embed" => self.handle_embed_command(interaction, data).await?,
                        "log" => self.handle_log_command(interaction, data).await?,
                        "logs" => self.handle_logs_command(interaction).await?,
                        _ => {
                            info!("Unknown command: {}", data.name);
                        }
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    async fn handle_embed_command(
        &self,
        interaction: &Interaction,
        data: &CommandData,
    ) -> Result<()> {
        let guild_id = interaction
            .guild_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        if !self.config.is_embed_enabled(&guild_id) {
            return self
                .respond_to_interaction(interaction, "Embedding is disabled on this server.")
                .await;
        }

        let url = string_option(data, "url").unwrap_or("");
        let Some((url, platform)) = detect_links(url).into_iter().next() else {
            return self
                .respond_to_interaction(interaction, "This URL is not supported.")
                .await;
        };
        let Some(channel_id) = interaction.channel.as_ref().map(|c| c.id) else {
            return self
                .respond_to_interaction(interaction, "❌ Cannot determine channel for upload")
                .await;
        };

        self.respond_to_interaction(interaction, "Downloading media...")
            .await?;

        let identity = interaction
            .author()
            .map(|user| user.name.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let job = Job {
            channel_id,
            original: None,
            delete_original: false,
            url,
            platform,
            identity,
        };
        tokio::spawn(self.relay.clone().deliver(job));
        Ok(())
    }

    async fn handle_log_command(&self, interaction: &Interaction, data: &CommandData) -> Result<()> {
        let url = string_option(data, "url").unwrap_or("").trim();
        let log = self.relay.acquirer.log();
        let text = log
            .render_timeline(url, TIMELINE_RECORDS)
            .unwrap_or_else(|| format!("❌ No log for: {}\nUse /logs to list recent URLs", url));
        self.respond_in_chunks(interaction, &text).await
    }

    async fn handle_logs_command(&self, interaction: &Interaction) -> Result<()> {
        let log = self.relay.acquirer.log();
        let text = log
            .render_recent(RECENT_URLS, RECENT_RECORDS)
            .unwrap_or_else(|| "No logs yet".to_string());
        self.respond_in_chunks(interaction, &text).await
    }

    /// First chunk answers the interaction, the rest go out as follow-ups.
    async fn respond_in_chunks(&self, interaction: &Interaction, text: &str) -> Result<()> {
        let mut chunks = delivery::chunk_message(text, MAX_MESSAGE_CHARS).into_iter();
        let first = chunks.next().unwrap_or_default();
        self.respond_to_interaction(interaction, &first).await?;
        for chunk in chunks {
            self.http
                .interaction(self.application_id)
                .create_followup(&interaction.token)
                .content(&chunk)
                .flags(MessageFlags::EPHEMERAL)
                .await?;
        }
        Ok(())
    }

    async fn respond_to_interaction(&self, interaction: &Interaction, content: &str) -> Result<()> {
        let response = InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(
                InteractionResponseDataBuilder::new()
                    .content(content)
                    .flags(MessageFlags::EPHEMERAL)
                    .build(),
            ),
        };

        self.http
            .interaction(self.application_id)
            .create_response(interaction.id, &interaction.token, &response)
            .await?;

        Ok(())
    }
}

impl Relay {
    /// Fetches one link and posts the media, or a reply explaining why not.
    /// Produced files are always removed.
    async fn deliver(self, job: Job) {
        let status = match self
            .http
            .create_message(job.channel_id)
            .content(&delivery::status_text(&job.identity, job.platform))
            .await
        {
            Ok(response) => response.model().await.ok().map(|m| m.id),
            Err(e) => {
                warn!("Failed to post status message: {}", e);
                None
            }
        };

        let chat = job.channel_id.to_string();
        match self.acquirer.begin(&chat, &job.url) {
            Some(_guard) => self.process(&job).await,
            None => debug!("{} is already being processed in {}", job.url, chat),
        }

        if let Some(status_id) = status {
            self.delete(job.channel_id, status_id).await;
        }
        if job.delete_original {
            if let Some(original) = job.original {
                self.delete(job.channel_id, original).await;
            }
        }
    }

    async fn process(&self, job: &Job) {
        let log = self.acquirer.log();
        let result = match self
            .acquirer
            .acquire_url(&job.url, job.platform.tag(), Some(job.identity.as_str()))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Acquisition of {} failed: {}", job.url, e);
                let reply = delivery::failure_reply(&e, &job.identity, &job.url);
                self.say(job.channel_id, &reply).await;
                return;
            }
        };

        let caption = delivery::caption(&job.identity, job.platform, &job.url);
        let uploads = delivery::plan_uploads(&result, &caption, job.platform);
        let largest = delivery::largest_upload(&uploads).await;
        if largest > self.upload_limit {
            warn!("{} exceeds the upload limit ({} bytes)", job.url, largest);
            log.record(
                &job.url,
                Attempt::new("TOO_LARGE", crate::utils::format_megabytes(largest))
                    .identity(Some(job.identity.as_str()))
                    .platform(job.platform),
            );
            let reply =
                delivery::too_large_reply(&job.identity, largest, self.upload_limit, &job.url);
            self.say(job.channel_id, &reply).await;
        } else {
            match self.upload(job.channel_id, &uploads).await {
                Ok(()) => log.record(
                    &job.url,
                    Attempt::new(result.kind(), "SENT")
                        .identity(Some(job.identity.as_str()))
                        .platform(job.platform),
                ),
                Err(e) => {
                    error!("Failed to send media to channel: {:#}", e);
                    log.record(
                        &job.url,
                        Attempt::new("ERROR", "upload failed")
                            .identity(Some(job.identity.as_str()))
                            .platform(job.platform)
                            .error(format!("{:#}", e)),
                    );
                    self.say(job.channel_id, "❌ Failed to send media file").await;
                }
            }
        }

        result.cleanup().await;
    }

    async fn upload(&self, channel_id: Id<ChannelMarker>, uploads: &[Upload]) -> Result<()> {
        for Upload { content, files } in uploads {
            let mut attachments = Vec::with_capacity(files.len());
            for (index, path) in files.iter().enumerate() {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                attachments.push(Attachment::from_bytes(
                    delivery::attachment_name(index, path),
                    bytes,
                    index as u64,
                ));
            }

            let message = self
                .http
                .create_message(channel_id)
                .attachments(&attachments);
            match content.as_deref() {
                Some(content) => message.content(content).await?,
                None => message.await?,
            };
        }
        Ok(())
    }

    async fn say(&self, channel_id: Id<ChannelMarker>, content: &str) {
        if let Err(e) = self.http.create_message(channel_id).content(content).await {
            error!("Failed to send message: {}", e);
        }
    }

    async fn delete(&self, channel_id: Id<ChannelMarker>, message_id: Id<MessageMarker>) {
        if let Err(e) = self.http.delete_message(channel_id, message_id).await {
            debug!("Failed to delete message {}: {}", message_id, e);
        }
    }
}

fn string_option<'a>(data: &'a CommandData, name: &str) -> Option<&'a str> {
    data.options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| match &opt.value {
            CommandOptionValue::String(s) => Some(s.as_str()),
            _ => None,
        })
}

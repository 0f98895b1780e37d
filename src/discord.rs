use crate::{
    config::Config,
    loki::LokiClient,
    monitor::{self, Monitor, StatusSink},
    render::{self, StatusView},
};
use anyhow::{bail, Context as _, Result};
use poise::serenity_prelude::{
    self as serenity, ChannelId, ChannelType, EditChannel, EditMessage, Http, MessageId,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

struct Data {
    monitor: Arc<Monitor<LokiClient>>,
}
type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Builds the bot. Once connected it starts polling and publishing to the status channel.
pub async fn create_client(config: &Config, monitor: Arc<Monitor<LokiClient>>) -> Result<serenity::Client> {
    let intents = serenity::GatewayIntents::GUILDS;
    let channel_id = ChannelId::new(config.status_channel_id);
    let message_id = MessageId::new(config.status_message_id);
    let period = config.poll_period;
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![status()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Bot is running");
                let sink = DiscordSink::new(ctx.http.clone(), channel_id, message_id);
                tokio::spawn(monitor::run(monitor.clone(), sink, period));
                Ok(Data { monitor })
            })
        })
        .build();
    let client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;
    Ok(client)
}

async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    _data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Ratelimit { data } = event {
        warn!(
            "{}",
            ratelimit_message(&data.method, &data.path, data.timeout, data.limit, data.global)
        );
    }
    Ok(())
}

fn ratelimit_message(
    method: impl std::fmt::Debug,
    path: &str,
    reset: Duration,
    limit: i64,
    global: bool,
) -> String {
    let scope = if global { " (global)" } else { "" };
    format!("Rate limit hit{scope}: route {method:?} {path:?}, reset in {reset:?}, limit {limit}")
}

/// Gets the status of the zomboid server
#[poise::command(prefix_command, slash_command)]
async fn status(ctx: Context<'_>) -> Result<(), Error> {
    info!("status command called by {}", ctx.author().name);
    ctx.defer().await?;
    let snapshot = ctx.data().monitor.snapshot().await;
    ctx.say(render::summary(&snapshot)).await?;
    Ok(())
}

/// Renames the status channel and edits the pinned status message.
pub struct DiscordSink {
    http: Arc<Http>,
    channel_id: ChannelId,
    message_id: MessageId,
}

impl DiscordSink {
    pub fn new(http: Arc<Http>, channel_id: ChannelId, message_id: MessageId) -> Self {
        Self {
            http,
            channel_id,
            message_id,
        }
    }
}

impl StatusSink for DiscordSink {
    async fn publish(&self, view: &StatusView) -> Result<()> {
        let http: &Http = &self.http;
        let channel = self
            .channel_id
            .to_channel(http)
            .await
            .with_context(|| format!("Status channel {} not found", self.channel_id))?;
        let Some(mut channel) = channel.guild() else {
            bail!("Status channel {} is not a guild channel", self.channel_id);
        };
        if channel.kind != ChannelType::Text {
            bail!("Status channel {} is not a text channel", self.channel_id);
        }
        // Channel renames are rate limited to a couple per ten minutes
        if channel.name != view.channel_name {
            channel
                .edit(http, EditChannel::new().name(view.channel_name.clone()))
                .await
                .context("Failed to rename status channel")?;
            info!("renamed status channel to {}", view.channel_name);
        }
        let mut message = channel
            .message(http, self.message_id)
            .await
            .with_context(|| format!("Status message {} not found", self.message_id))?;
        if message.content != view.message {
            message
                .edit(http, EditMessage::new().content(view.message.clone()))
                .await
                .context("Failed to edit status message")?;
        }
        Ok(())
    }
}

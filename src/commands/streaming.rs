use poise::serenity_prelude as serenity;
use tracing::{error, info};

use musicstream_rs::features::flags::FLAG_ENABLED;
use musicstream_rs::features::orchestrator::UpdateRequest;
use musicstream_rs::features::summary;
use musicstream_rs::models::audit::AuditActor;
use musicstream_rs::models::streaming::StreamingConfig;
use musicstream_rs::utils::config::colors;

use crate::{Context, Error};

/// Manage music streaming settings
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    subcommands("set", "status")
)]
pub async fn streaming(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Update music streaming settings
#[poise::command(slash_command, prefix_command)]
pub async fn set(
    ctx: Context<'_>,
    #[description = "Enable music streaming"] enabled: bool,
    #[description = "Role given while streaming"] role: Option<serenity::Role>,
    #[description = "Channel for stream announcements"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say("This command can only be used in a server.").await?;
        return Ok(());
    };
    let guild_id = guild_id.get();

    ctx.defer().await?;

    let form_ok = channel.as_ref().map_or(true, |c| {
        matches!(c.kind, serenity::ChannelType::Text | serenity::ChannelType::News)
    });

    let config = StreamingConfig {
        guild_id,
        enabled,
        give_role: role.map_or(0, |r| r.id.get()),
        announce_channel: channel.map_or(0, |c| c.id.get()),
    };

    let author = ctx.author();
    let request = UpdateRequest {
        guild_id,
        config,
        form_ok,
        actor: AuditActor {
            user_id: author.id.get(),
            username: author.name.clone(),
        },
        deadline: Some(ctx.data().settings.update_deadline),
    };

    let embed = match ctx.data().orchestrator.handle(request).await {
        Ok(view) if view.saved => {
            info!(guild_id, user_id = author.id.get(), "Music streaming settings updated");
            serenity::CreateEmbed::new()
                .title("Music Streaming")
                .description(view.alerts.join("\n"))
                .color(colors::SUCCESS)
        }
        Ok(view) => serenity::CreateEmbed::new()
            .title("Music Streaming")
            .description(format!(
                "Announcement channel <#{}> must be a text channel. Nothing was saved.",
                view.config.announce_channel
            ))
            .color(colors::WARNING),
        Err(e) => {
            error!(guild_id, "Failed saving music streaming config: {}", e);
            serenity::CreateEmbed::new()
                .title("Music Streaming")
                .description("Failed saving config :'(")
                .color(colors::ERROR)
        }
    };

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the current music streaming status
#[poise::command(slash_command, prefix_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say("This command can only be used in a server.").await?;
        return Ok(());
    };
    let guild_id = guild_id.get();

    ctx.defer().await?;
    let data = ctx.data();

    let config = match data.orchestrator.store().load(guild_id).await {
        Ok(config) => config,
        Err(e) => {
            error!(guild_id, "Failed retrieving music streaming config: {}", e);
            ctx.say("Failed retrieving music streaming config :'(").await?;
            return Ok(());
        }
    };

    // Resolve against the cache before rendering; the guild ref must not live across an await
    let (role_name, channel_name) = match ctx.guild() {
        Some(guild) => (
            config
                .give_role()
                .and_then(|id| guild.roles.get(&serenity::RoleId::new(id)))
                .map(|r| r.name.clone()),
            config
                .announce_channel()
                .and_then(|id| guild.channels.get(&serenity::ChannelId::new(id)))
                .map(|c| c.name.clone()),
        ),
        None => (None, None),
    };

    let view = summary::render(&config, |_| role_name.clone(), |_| channel_name.clone());
    let mark = |found: bool| if found { "✅" } else { "❌" };

    let embed = serenity::CreateEmbed::new()
        .title(summary::WIDGET_TITLE)
        .field("Streaming status", view.status(), true)
        .field("Streaming role", format!("`{}` {}", view.role.name, mark(view.role.found)), true)
        .field(
            "Streaming message",
            format!("`#{}` {}", view.channel.name, mark(view.channel.found)),
            true,
        )
        .field(
            "Feature flag",
            if data.flags.has_flag(guild_id, FLAG_ENABLED) { "active" } else { "inactive" },
            true,
        )
        .color(colors::INFO);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

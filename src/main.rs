use anyhow::{Context as _, Result};
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Discord bot that links members to their clan accounts and keeps roles in sync
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bot configuration file
    #[arg(long, default_value = "data/config.json")]
    config: String,

    /// Directory for persistent state (links)
    #[arg(long, default_value = "state")]
    state_path: String,

    /// Register commands in the configured guild instead of globally (faster for testing)
    #[arg(long)]
    guild_commands: bool,
}

mod commands;
mod config;
mod error;
mod events;
mod game;
mod logging;
mod managers;
mod platform;
mod state;
#[cfg(test)]
mod test_support;

use commands::{
    cancel_verification, cwl_status, help, link, links, logs, missing_attacks, ping, sync_roles,
    unlink, verify,
};
use config::BotConfig;
use events::{handle_guild_create, handle_member_add, handle_member_remove};
use game::{ClashClient, SharedGameProvider};
use logging::SharedLogBuffer;
use managers::{
    create_shared_reconciler, create_shared_role_manager, Scheduler, SharedReconciler,
    SharedRoleManager, SharedScheduler, SharedVerificationManager, SharedWarTracker,
    VerificationManager, VerificationSettings, WarTracker,
};
use platform::{DiscordPlatform, SharedPlatform};
use state::{
    create_shared_link_store, create_shared_snapshot_cache, LinkStore, SharedLinkStore,
    SharedSnapshotCache, SyncGate,
};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared application state
pub struct Data {
    pub config: Arc<BotConfig>,
    pub game: SharedGameProvider,
    pub platform: SharedPlatform,
    pub links: SharedLinkStore,
    pub snapshot: SharedSnapshotCache,
    pub role_manager: SharedRoleManager,
    pub reconciler: SharedReconciler,
    pub verification_manager: SharedVerificationManager,
    pub war_tracker: SharedWarTracker,
    pub scheduler: SharedScheduler,
    pub log_buffer: SharedLogBuffer,
}

async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = handle_member_add(new_member, data).await {
                error!("Failed to handle new member: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            if let Err(e) = handle_member_remove(*guild_id, user, data).await {
                error!("Failed to handle member removal: {}", e);
            }
        }
        serenity::FullEvent::GuildCreate { guild, .. } => {
            if let Err(e) = handle_guild_create(guild, data).await {
                error!("Failed to handle guild create: {}", e);
            }
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let log_buffer = logging::create_log_buffer(1000);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .with(logging::LogCaptureLayer::new(log_buffer.clone()))
        .init();

    let token = std::env::var("DISCORD_TOKEN").context("Missing DISCORD_TOKEN environment variable")?;

    info!("Loading configuration from {}...", args.config);
    let config = Arc::new(BotConfig::load_from_file(&args.config)?);
    info!(
        "Managing clan {} in guild {}",
        config.clan_tag, config.guild_id
    );

    let game: SharedGameProvider = Arc::new(
        ClashClient::from_env().context("Missing COC_API_TOKEN environment variable")?,
    );

    tokio::fs::create_dir_all(&args.state_path).await.ok();
    let links_path = format!("{}/links.json", args.state_path);
    info!("Loading links from {}...", links_path);
    let link_store = create_shared_link_store(LinkStore::load_or_recover(&links_path).await);
    info!("Loaded {} links", link_store.read().await.link_count());
    let snapshot = create_shared_snapshot_cache();
    let war_tracker: SharedWarTracker =
        Arc::new(WarTracker::new(game.clone(), snapshot.clone(), &config.clan_tag));

    let guild_commands = args.guild_commands;
    if guild_commands {
        info!("--guild-commands: Will register commands in guild {}", config.guild_id);
    } else {
        info!("Registering commands globally by default (takes up to 1 hour to propagate)");
    }

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                ping(),
                help(),
                logs(),
                verify(),
                cancel_verification(),
                link(),
                unlink(),
                links(),
                sync_roles(),
                missing_attacks(),
                cwl_status(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {})",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx.say(format!("An error occurred: {}", error)).await;
                        }
                        poise::FrameworkError::MissingBotPermissions { missing_permissions, ctx, .. } => {
                            error!("Bot missing permissions for '{}': {:?}", ctx.command().qualified_name, missing_permissions);
                            let _ = ctx.say(format!("Bot is missing permissions: {:?}", missing_permissions)).await;
                        }
                        poise::FrameworkError::MissingUserPermissions { missing_permissions, ctx, .. } => {
                            warn!("User {} missing permissions for '{}': {:?}", ctx.author().name, ctx.command().qualified_name, missing_permissions);
                        }
                        poise::FrameworkError::GuildOnly { ctx, .. } => {
                            warn!("Command '{}' is guild-only, used in DM by {}", ctx.command().qualified_name, ctx.author().name);
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                let platform: SharedPlatform = Arc::new(DiscordPlatform::new(
                    ctx.http.clone(),
                    config.guild(),
                    ready.user.id,
                    config.verification_category(),
                ));
                let role_manager = create_shared_role_manager(platform.clone());
                let reconciler = create_shared_reconciler(
                    platform.clone(),
                    role_manager.clone(),
                    config.roles.clone(),
                );
                let sync_gate = SyncGate::new();
                let verification_manager = Arc::new(VerificationManager::new(
                    game.clone(),
                    platform.clone(),
                    link_store.clone(),
                    snapshot.clone(),
                    role_manager.clone(),
                    reconciler.clone(),
                    sync_gate.clone(),
                    VerificationSettings::from_config(&config),
                ));
                let scheduler = Arc::new(Scheduler::new(
                    game.clone(),
                    platform.clone(),
                    link_store.clone(),
                    snapshot.clone(),
                    reconciler.clone(),
                    war_tracker.clone(),
                    sync_gate,
                    &config.clan_tag,
                    config.intervals.refresh(),
                    config.war_channel(),
                ));

                if guild_commands {
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        config.guild(),
                    )
                    .await?;
                    info!(
                        "Successfully registered {} commands for guild {}",
                        framework.options().commands.len(),
                        config.guild()
                    );
                } else {
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    info!(
                        "Successfully registered {} commands globally",
                        framework.options().commands.len()
                    );
                }

                tokio::spawn(scheduler.clone().run());

                Ok(Data {
                    config,
                    game,
                    platform,
                    links: link_store,
                    snapshot,
                    role_manager,
                    reconciler,
                    verification_manager,
                    war_tracker,
                    scheduler,
                    log_buffer,
                })
            })
        })
        .build();

    // Member join/leave events need the privileged GUILD_MEMBERS intent
    let intents = serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::GUILD_MEMBERS;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    if let Err(e) = client.start().await {
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!("Failed to start bot: {}", e);
            error!("Enable the GUILD_MEMBERS privileged intent in the Discord Developer Portal");
            return Err(anyhow::anyhow!("Disallowed gateway intents: GUILD_MEMBERS"));
        }
        return Err(e.into());
    }
    warn!("Bot ended.");

    Ok(())
}

use poise::serenity_prelude as serenity;
use tracing::{info, Level};

use crate::{Context, Error};

/// Check if the bot is running
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    info!("Ping command called by {}", ctx.author().name);
    let roster = ctx
        .data()
        .snapshot
        .read()
        .await
        .refreshed_at()
        .map(|at| format!("roster refreshed <t:{}:R>", at.timestamp()))
        .unwrap_or_else(|| "roster not loaded yet".to_string());
    let pending = ctx.data().verification_manager.active_sessions().len();
    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "Pong! {}, {} verification(s) in progress.",
                roster, pending
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show help information
#[poise::command(prefix_command, slash_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let embed = serenity::CreateEmbed::new()
        .title("Bot Commands")
        .description("Available commands:")
        .field("/ping", "Check if the bot is running", false)
        .field("/verify", "Link your account by equipping a hero item in game", false)
        .field("/cancel-verification", "Stop your verification in progress", false)
        .field("/missing-attacks", "Who still owes attacks in the current war", false)
        .field("/cwl-status", "Clan War League round tracking", false)
        .field("/link, /unlink, /links", "Manage account links (Manage Roles)", false)
        .field("/sync-roles", "Run a role sync now (Manage Roles)", false)
        .field("/logs", "Show recent bot logs (Admin)", false)
        .color(0x3498db);

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum LogLevelChoice {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevelChoice> for Level {
    fn from(choice: LogLevelChoice) -> Self {
        match choice {
            LogLevelChoice::Error => Level::ERROR,
            LogLevelChoice::Warn => Level::WARN,
            LogLevelChoice::Info => Level::INFO,
            LogLevelChoice::Debug => Level::DEBUG,
        }
    }
}

/// Show recent log lines
#[poise::command(
    slash_command,
    guild_only,
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn logs(
    ctx: Context<'_>,
    #[description = "How many lines (default 20)"] count: Option<usize>,
    #[description = "Minimum level (default info)"] level: Option<LogLevelChoice>,
) -> Result<(), Error> {
    let level: Level = level.unwrap_or(LogLevelChoice::Info).into();
    let entries = ctx
        .data()
        .log_buffer
        .get_recent(count.unwrap_or(20).min(100), level);

    if entries.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content("No matching log entries.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    // Keep the newest lines that fit in one message
    let mut body = String::new();
    for line in entries.iter().rev().map(|e| e.format()) {
        if body.len() + line.len() + 1 > 1900 {
            break;
        }
        body.insert_str(0, &format!("{}\n", line));
    }

    ctx.send(
        poise::CreateReply::default()
            .content(format!("```\n{}```", body))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

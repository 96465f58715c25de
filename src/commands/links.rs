use poise::serenity_prelude as serenity;
use tracing::{error, info, warn};

use crate::game::normalize_tag;
use crate::managers::CancelReason;
use crate::state::{Link, LinkSource};
use crate::{Context, Error};

/// Discord caps messages at 2000 characters
const MESSAGE_LIMIT: usize = 1900;

async fn reply(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Link a member to a player account without verification
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES"
)]
pub async fn link(
    ctx: Context<'_>,
    #[description = "Member to link"] member: serenity::User,
    #[description = "Player tag, e.g. #ABC123"] tag: String,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let data = ctx.data();
    let tag = normalize_tag(&tag);

    let player = match data.game.player(&tag).await {
        Ok(player) => player,
        Err(e) => {
            warn!("Admin link lookup for {} failed: {}", tag, e);
            return reply(ctx, format!("Could not load player `{}`: {}", tag, e)).await;
        }
    };

    // Linking by hand supersedes any verification still in progress
    data.verification_manager
        .cancel(member.id, CancelReason::Administrative);

    let link = Link::new(member.id, &player.tag, &player.name, LinkSource::Admin);
    let displaced = {
        let mut store = data.links.write().await;
        let displaced = store.put_link(link.clone());
        if let Err(e) = store.persist().await {
            error!("Failed to persist links: {}", e);
        }
        displaced
    };
    info!(
        "{} linked {} to {} ({})",
        ctx.author().name,
        member.id,
        player.name,
        player.tag
    );

    for old in &displaced {
        if let Some(user_id) = old.user_id() {
            if let Err(e) = data.reconciler.strip_managed_roles(user_id).await {
                warn!("Could not strip roles from displaced holder {}: {}", user_id, e);
            }
        }
    }

    if let Err(e) = data.platform.set_nickname(member.id, &player.name).await {
        warn!("Could not rename {}: {}", member.id, e);
    }
    let synced = match data.reconciler.reconcile_member(&link, &player).await {
        Ok(summary) => summary.format(),
        Err(e) => format!("role sync failed: {}", e),
    };

    let mut content = format!(
        "Linked <@{}> to **{}** (`{}`). {}",
        member.id, player.name, player.tag, synced
    );
    for old in displaced {
        content.push_str(&format!("\nRemoved previous link <@{}>.", old.discord_id));
    }
    reply(ctx, content).await
}

/// Remove a member's link and managed roles
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES"
)]
pub async fn unlink(
    ctx: Context<'_>,
    #[description = "Member to unlink"] member: serenity::User,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let data = ctx.data();

    let removed = {
        let mut store = data.links.write().await;
        let removed = store.delete_link(member.id);
        if removed.is_some() {
            if let Err(e) = store.persist().await {
                error!("Failed to persist links: {}", e);
            }
        }
        removed
    };

    let Some(removed) = removed else {
        return reply(ctx, format!("<@{}> is not linked.", member.id)).await;
    };
    info!(
        "{} unlinked {} from {}",
        ctx.author().name,
        member.id,
        removed.game_tag
    );

    let stripped = match data.reconciler.strip_managed_roles(member.id).await {
        Ok(summary) => format!("{} roles removed.", summary.roles_removed),
        Err(e) => format!("Could not remove roles: {}", e),
    };
    reply(
        ctx,
        format!(
            "Unlinked <@{}> from **{}** (`{}`). {}",
            member.id, removed.game_name, removed.game_tag, stripped
        ),
    )
    .await
}

/// List every linked member
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES"
)]
pub async fn links(ctx: Context<'_>) -> Result<(), Error> {
    let links = ctx.data().links.read().await.list_links();
    if links.is_empty() {
        return reply(ctx, "No members are linked yet.").await;
    }

    let lines: Vec<String> = links
        .iter()
        .map(|l| {
            let via = match l.source {
                LinkSource::Verification => "",
                LinkSource::Admin => " (admin)",
            };
            format!("<@{}> → **{}** `{}`{}", l.discord_id, l.game_name, l.game_tag, via)
        })
        .collect();

    for chunk in chunk_lines(&format!("**{} linked members**", links.len()), &lines) {
        reply(ctx, chunk).await?;
    }
    Ok(())
}

/// Run a role sync now
#[poise::command(
    slash_command,
    guild_only,
    rename = "sync-roles",
    required_permissions = "MANAGE_ROLES"
)]
pub async fn sync_roles(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let content = match ctx.data().scheduler.reconcile_all().await {
        Some(summary) => summary.format(),
        None => "Role sync skipped: a verification is being committed or no roster is cached yet. \
                 Try again shortly."
            .to_string(),
    };
    reply(ctx, content).await
}

/// Split lines into messages under the size limit
fn chunk_lines(header: &str, lines: &[String]) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = header.to_string();
    for line in lines {
        if current.len() + line.len() + 1 > MESSAGE_LIMIT {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_lines() {
        let lines: Vec<String> = (0..100).map(|i| format!("{:0>40}", i)).collect();
        let chunks = chunk_lines("header", &lines);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MESSAGE_LIMIT));
        assert!(chunks[0].starts_with("header\n"));
        let total: usize = chunks.iter().map(|c| c.lines().count()).sum();
        assert_eq!(total, 101);
    }
}

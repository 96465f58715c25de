use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

use crate::managers::CancelReason;
use crate::{Data, Error};

/// Handle when the bot joins a new guild or starts up
pub async fn handle_guild_create(guild: &serenity::Guild, data: &Data) -> Result<(), Error> {
    if guild.id != data.config.guild() {
        debug!("Ignoring unmanaged guild {} ({})", guild.name, guild.id);
        return Ok(());
    }
    info!("Processing guild: {} ({})", guild.name, guild.id);

    let roles = data.config.roles.static_roles();
    match data.role_manager.ensure_roles_exist(&roles).await {
        Ok(ensured) => {
            info!("Ensured {} roles exist in guild {}", ensured.len(), guild.id);
        }
        Err(e) => {
            error!("Failed to setup roles for guild {}: {}", guild.id, e);
        }
    }
    Ok(())
}

/// Restore nickname and roles when a linked member (re)joins
pub async fn handle_member_add(member: &serenity::Member, data: &Data) -> Result<(), Error> {
    if member.guild_id != data.config.guild() || member.user.bot {
        return Ok(());
    }

    let Some(link) = data.links.read().await.get_link(member.user.id).cloned() else {
        debug!("New member {} has no link", member.user.name);
        return Ok(());
    };
    info!(
        "Linked member {} rejoined as {} ({})",
        member.user.name, link.game_name, link.game_tag
    );

    if let Err(e) = data
        .platform
        .set_nickname(member.user.id, &link.game_name)
        .await
    {
        warn!("Could not restore nickname for {}: {}", member.user.id, e);
    }

    let player = data.snapshot.read().await.find_by_tag(&link.game_tag).cloned();
    match player {
        Some(player) => {
            if let Err(e) = data.reconciler.reconcile_member(&link, &player).await {
                warn!("Could not restore roles for {}: {}", member.user.id, e);
            }
        }
        None => debug!("{} not in the cached roster, roles follow on the next sync", link.game_tag),
    }
    Ok(())
}

/// Drop the link and any open verification of a member who left
pub async fn handle_member_remove(
    guild_id: serenity::GuildId,
    user: &serenity::User,
    data: &Data,
) -> Result<(), Error> {
    if guild_id != data.config.guild() {
        return Ok(());
    }

    if data
        .verification_manager
        .cancel(user.id, CancelReason::MemberLeft)
    {
        info!("Cancelled verification of departed member {}", user.name);
    }

    let mut store = data.links.write().await;
    if let Some(removed) = store.delete_link(user.id) {
        info!(
            "Member {} left, removed link to {} ({})",
            user.name, removed.game_name, removed.game_tag
        );
        store.persist().await?;
    }
    Ok(())
}

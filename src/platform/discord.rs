use async_trait::async_trait;
use poise::serenity_prelude::{
    self as serenity, ChannelId, GuildId, Http, Permissions, RoleId, UserId,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::{CommunityPlatform, MemberInfo, RoleInfo};
use crate::error::{BotError, Result};

const MEMBER_PAGE_SIZE: u64 = 1000;
const AUDIT_REASON: &str = "Clan role sync";

/// [`CommunityPlatform`] backed by the Discord REST API for a single guild
pub struct DiscordPlatform {
    http: Arc<Http>,
    guild_id: GuildId,
    bot_user_id: UserId,
    /// Parent category for private verification channels
    verification_category: Option<ChannelId>,
}

impl DiscordPlatform {
    pub fn new(
        http: Arc<Http>,
        guild_id: GuildId,
        bot_user_id: UserId,
        verification_category: Option<ChannelId>,
    ) -> Self {
        Self {
            http,
            guild_id,
            bot_user_id,
            verification_category,
        }
    }

    fn everyone_role(&self) -> RoleId {
        RoleId::new(self.guild_id.get())
    }
}

fn member_info(member: &serenity::Member) -> MemberInfo {
    MemberInfo {
        user_id: member.user.id,
        display_name: member.display_name().to_string(),
        roles: member.roles.clone(),
        is_bot: member.user.bot,
    }
}

#[async_trait]
impl CommunityPlatform for DiscordPlatform {
    async fn roles(&self) -> Result<Vec<RoleInfo>> {
        let roles = self.guild_id.roles(self.http.as_ref()).await?;
        let everyone = self.everyone_role();

        Ok(roles
            .into_values()
            .filter(|role| role.id != everyone && !role.managed)
            .map(|role| RoleInfo {
                id: role.id,
                name: role.name,
            })
            .collect())
    }

    async fn create_role(&self, name: &str) -> Result<RoleInfo> {
        let role = self
            .guild_id
            .create_role(
                self.http.as_ref(),
                serenity::EditRole::new()
                    .name(name)
                    .mentionable(false)
                    .audit_log_reason(AUDIT_REASON),
            )
            .await?;

        info!("Created role '{}' with ID {}", role.name, role.id);
        Ok(RoleInfo {
            id: role.id,
            name: role.name,
        })
    }

    async fn delete_role(&self, role_id: RoleId) -> Result<()> {
        self.guild_id.delete_role(self.http.as_ref(), role_id).await?;
        Ok(())
    }

    async fn members(&self) -> Result<Vec<MemberInfo>> {
        let mut all = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let page = self
                .guild_id
                .members(self.http.as_ref(), Some(MEMBER_PAGE_SIZE), after)
                .await?;
            let page_len = page.len() as u64;
            after = page.last().map(|m| m.user.id);
            all.extend(page.iter().map(member_info));

            if page_len < MEMBER_PAGE_SIZE {
                break;
            }
        }

        debug!("Fetched {} guild members", all.len());
        Ok(all)
    }

    async fn member(&self, user_id: UserId) -> Result<Option<MemberInfo>> {
        match self.guild_id.member(self.http.as_ref(), user_id).await {
            Ok(member) => Ok(Some(member_info(&member))),
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("Unknown Member") || err_str.contains("10007") {
                    Ok(None)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn add_member_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        self.http
            .add_member_role(self.guild_id, user_id, role_id, Some(AUDIT_REASON))
            .await?;
        Ok(())
    }

    async fn remove_member_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        self.http
            .remove_member_role(self.guild_id, user_id, role_id, Some(AUDIT_REASON))
            .await?;
        Ok(())
    }

    async fn set_nickname(&self, user_id: UserId, nickname: &str) -> Result<()> {
        self.guild_id
            .edit_member(
                self.http.as_ref(),
                user_id,
                serenity::EditMember::new().nickname(nickname),
            )
            .await?;
        Ok(())
    }

    async fn create_private_channel(&self, user_id: UserId, name: &str) -> Result<ChannelId> {
        let visible = Permissions::VIEW_CHANNEL
            | Permissions::SEND_MESSAGES
            | Permissions::READ_MESSAGE_HISTORY;

        // Hide from everyone, then open up for the user and the bot
        let overwrites = vec![
            serenity::PermissionOverwrite {
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
                kind: serenity::PermissionOverwriteType::Role(self.everyone_role()),
            },
            serenity::PermissionOverwrite {
                allow: visible,
                deny: Permissions::empty(),
                kind: serenity::PermissionOverwriteType::Member(user_id),
            },
            serenity::PermissionOverwrite {
                allow: visible | Permissions::MANAGE_CHANNELS,
                deny: Permissions::empty(),
                kind: serenity::PermissionOverwriteType::Member(self.bot_user_id),
            },
        ];

        let mut builder = serenity::CreateChannel::new(name)
            .kind(serenity::ChannelType::Text)
            .topic("Account verification")
            .permissions(overwrites);
        if let Some(category) = self.verification_category {
            builder = builder.category(category);
        }

        let channel = self.guild_id.create_channel(self.http.as_ref(), builder).await?;
        info!("Created verification channel #{} ({})", channel.name, channel.id);
        Ok(channel.id)
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        channel_id.delete(self.http.as_ref()).await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        channel_id
            .send_message(self.http.as_ref(), serenity::CreateMessage::new().content(content))
            .await?;
        Ok(())
    }

    async fn send_direct_message(&self, user_id: UserId, content: &str) -> Result<()> {
        let dm_channel = user_id
            .create_dm_channel(self.http.as_ref())
            .await
            .map_err(|e| BotError::Discord {
                message: format!("Cannot open DM with {}: {}", user_id, e),
            })?;
        dm_channel
            .send_message(self.http.as_ref(), serenity::CreateMessage::new().content(content))
            .await?;
        Ok(())
    }
}

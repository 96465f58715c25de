//! The chat-platform side: everything the bot does to the guild goes through
//! [`CommunityPlatform`] so the workflows can run against an in-memory guild in
//! tests.

pub mod discord;

use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, RoleId, UserId};
use std::sync::Arc;

use crate::error::Result;

pub use discord::DiscordPlatform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub roles: Vec<RoleId>,
    pub is_bot: bool,
}

impl MemberInfo {
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

/// Guild operations used by the core workflows.
///
/// Mutations fail with [`crate::error::BotError::PermissionDenied`] when the bot
/// lacks permissions or sits below the target role; callers log and continue.
#[async_trait]
pub trait CommunityPlatform: Send + Sync {
    /// All assignable roles (excludes @everyone and integration-managed roles)
    async fn roles(&self) -> Result<Vec<RoleInfo>>;

    async fn create_role(&self, name: &str) -> Result<RoleInfo>;

    async fn delete_role(&self, role_id: RoleId) -> Result<()>;

    async fn members(&self) -> Result<Vec<MemberInfo>>;

    /// `None` when the user is not in the guild
    async fn member(&self, user_id: UserId) -> Result<Option<MemberInfo>>;

    async fn add_member_role(&self, user_id: UserId, role_id: RoleId) -> Result<()>;

    async fn remove_member_role(&self, user_id: UserId, role_id: RoleId) -> Result<()>;

    async fn set_nickname(&self, user_id: UserId, nickname: &str) -> Result<()>;

    /// Text channel visible only to `user_id` and the bot
    async fn create_private_channel(&self, user_id: UserId, name: &str) -> Result<ChannelId>;

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()>;

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()>;

    /// Best effort; users may have DMs closed
    async fn send_direct_message(&self, user_id: UserId, content: &str) -> Result<()>;
}

pub type SharedPlatform = Arc<dyn CommunityPlatform>;

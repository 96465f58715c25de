use poise::serenity_prelude::{RoleId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{BotError, Result};
use crate::platform::{RoleInfo, SharedPlatform};

/// Resolves role names to IDs, creating roles on demand
pub struct RoleManager {
    platform: SharedPlatform,

    /// Cached role name -> ID
    cache: tokio::sync::RwLock<HashMap<String, RoleId>>,
}

impl RoleManager {
    pub fn new(platform: SharedPlatform) -> Self {
        Self {
            platform,
            cache: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Re-read every role from the guild and rebuild the cache
    pub async fn refresh(&self) -> Result<Vec<RoleInfo>> {
        let roles = self.platform.roles().await?;
        let mut cache = self.cache.write().await;
        cache.clear();
        for role in &roles {
            cache.insert(role.name.clone(), role.id);
        }
        debug!("Role cache refreshed with {} roles", roles.len());
        Ok(roles)
    }

    /// Ensure all named roles exist in the guild
    pub async fn ensure_roles_exist(&self, names: &[String]) -> Result<HashMap<String, RoleId>> {
        let existing = self.refresh().await?;
        let mut ensured = HashMap::new();

        for name in names {
            if let Some(role) = existing.iter().find(|r| &r.name == name) {
                debug!("Role '{}' already exists", name);
                ensured.insert(name.clone(), role.id);
                continue;
            }

            match self.create(name).await {
                Ok(role_id) => {
                    ensured.insert(name.clone(), role_id);
                }
                Err(e) => {
                    error!("Failed to create role '{}': {}", name, e);
                }
            }
        }

        Ok(ensured)
    }

    async fn create(&self, name: &str) -> Result<RoleId> {
        let role = self.platform.create_role(name).await?;
        self.cache.write().await.insert(role.name.clone(), role.id);
        info!("Created role '{}' with ID {}", role.name, role.id);
        Ok(role.id)
    }

    /// Get role ID by name from cache or fetch from the guild
    pub async fn role_id(&self, name: &str) -> Result<RoleId> {
        if let Some(id) = self.cache.read().await.get(name) {
            return Ok(*id);
        }

        self.refresh().await?;
        self.cache
            .read()
            .await
            .get(name)
            .copied()
            .ok_or_else(|| BotError::RoleNotFound {
                name: name.to_string(),
            })
    }

    /// Look the role up, creating it if the guild has none by that name
    pub async fn ensure_role(&self, name: &str) -> Result<RoleId> {
        self.ensure_role_created(name).await.map(|(id, _)| id)
    }

    /// Like `ensure_role`, also telling whether the role had to be created
    pub async fn ensure_role_created(&self, name: &str) -> Result<(RoleId, bool)> {
        match self.role_id(name).await {
            Ok(id) => Ok((id, false)),
            Err(BotError::RoleNotFound { .. }) => self.create(name).await.map(|id| (id, true)),
            Err(e) => Err(e),
        }
    }

    /// Drop a role from the cache after it was deleted
    pub async fn forget(&self, name: &str) {
        self.cache.write().await.remove(name);
    }

    pub async fn assign_role_to_user(&self, user_id: UserId, role_name: &str) -> Result<()> {
        let role_id = self.ensure_role(role_name).await?;
        self.platform.add_member_role(user_id, role_id).await?;
        info!("Assigned role '{}' to user {}", role_name, user_id);
        Ok(())
    }

    pub async fn remove_role_from_user(&self, user_id: UserId, role_name: &str) -> Result<()> {
        let role_id = self.role_id(role_name).await?;
        self.platform.remove_member_role(user_id, role_id).await?;
        info!("Removed role '{}' from user {}", role_name, user_id);
        Ok(())
    }

    /// Whether the member currently holds the named role
    pub async fn member_has_role(&self, user_id: UserId, role_name: &str) -> Result<bool> {
        let Some(member) = self.platform.member(user_id).await? else {
            return Ok(false);
        };
        match self.role_id(role_name).await {
            Ok(role_id) => Ok(member.has_role(role_id)),
            Err(BotError::RoleNotFound { .. }) => {
                warn!("Role '{}' does not exist in the guild", role_name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Shared role manager type
pub type SharedRoleManager = Arc<RoleManager>;

pub fn create_shared_role_manager(platform: SharedPlatform) -> SharedRoleManager {
    Arc::new(RoleManager::new(platform))
}

use async_trait::async_trait;
use std::sync::Arc;

use super::types::{LeagueGroup, PlayerSnapshot, WarDetail};
use crate::error::Result;

/// Read access to the game API.
///
/// Every method fails with [`crate::error::BotError::Unavailable`] on network,
/// rate-limit or HTTP errors; callers retry on their next tick.
#[async_trait]
pub trait GameDataProvider: Send + Sync {
    /// Current clan roster
    async fn clan_members(&self, clan_tag: &str) -> Result<Vec<PlayerSnapshot>>;

    /// Full player profile, including heroes and equipment
    async fn player(&self, tag: &str) -> Result<PlayerSnapshot>;

    async fn current_war(&self, clan_tag: &str) -> Result<WarDetail>;

    /// `None` when the clan is not part of a league group
    async fn league_group(&self, clan_tag: &str) -> Result<Option<LeagueGroup>>;

    async fn league_war(&self, war_tag: &str) -> Result<WarDetail>;
}

pub type SharedGameProvider = Arc<dyn GameDataProvider>;

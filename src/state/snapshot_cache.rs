use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::game::{normalize_tag, PlayerSnapshot, WarDetail};

/// Latest fetched game state. Replaced wholesale on every refresh and never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    members: Vec<PlayerSnapshot>,
    refreshed_at: Option<DateTime<Utc>>,
    current_war: Option<WarDetail>,
    league_war: Option<WarDetail>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_members(&mut self, members: Vec<PlayerSnapshot>) {
        self.members = members;
        self.refreshed_at = Some(Utc::now());
    }

    pub fn members(&self) -> &[PlayerSnapshot] {
        &self.members
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<&PlayerSnapshot> {
        self.members.iter().find(|member| member.has_tag(tag))
    }

    /// Members matching the query: an exact tag match wins outright,
    /// otherwise every case-insensitive name match.
    pub fn search(&self, query: &str) -> Vec<PlayerSnapshot> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let tag = normalize_tag(query);
        if let Some(member) = self.members.iter().find(|m| normalize_tag(&m.tag) == tag) {
            return vec![member.clone()];
        }

        let name = query.to_lowercase();
        self.members
            .iter()
            .filter(|m| m.name.to_lowercase() == name)
            .cloned()
            .collect()
    }

    pub fn set_current_war(&mut self, war: WarDetail) {
        self.current_war = Some(war);
    }

    pub fn current_war(&self) -> Option<&WarDetail> {
        self.current_war.as_ref()
    }

    pub fn set_league_war(&mut self, war: Option<WarDetail>) {
        self.league_war = war;
    }

    pub fn league_war(&self) -> Option<&WarDetail> {
        self.league_war.as_ref()
    }
}

/// Shared snapshot cache type
pub type SharedSnapshotCache = Arc<tokio::sync::RwLock<SnapshotCache>>;

pub fn create_shared_snapshot_cache() -> SharedSnapshotCache {
    Arc::new(tokio::sync::RwLock::new(SnapshotCache::new()))
}

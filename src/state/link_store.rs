use poise::serenity_prelude::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, warn};

use crate::game::normalize_tag;

const LINK_STORE_VERSION: u32 = 1;

/// Durable Discord user <-> game account links.
///
/// A user has at most one link and a game tag belongs to at most one user:
/// writing a link for a tag that someone else holds displaces their link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStore {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp
    pub last_updated: u64,

    /// Map of Discord ID (as string) to link
    links: HashMap<String, Link>,

    /// Where `persist` writes to; unset for in-memory stores
    #[serde(skip)]
    path: Option<String>,
}

impl Default for LinkStore {
    fn default() -> Self {
        Self {
            version: LINK_STORE_VERSION,
            last_updated: current_timestamp(),
            links: HashMap::new(),
            path: None,
        }
    }
}

impl LinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, or create new if not exists
    pub async fn load(path: &str) -> crate::error::Result<Self> {
        let mut store = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<Self>(&content).map_err(|e| {
                crate::error::BotError::ConfigParse {
                    path: path.to_string(),
                    source: e,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::new(),
            Err(e) => {
                return Err(crate::error::BotError::StateLoad {
                    path: path.to_string(),
                    source: e,
                })
            }
        };
        store.path = Some(path.to_string());
        Ok(store)
    }

    /// Empty store that persists to `path`
    pub fn at(path: &str) -> Self {
        Self {
            path: Some(path.to_string()),
            ..Self::default()
        }
    }

    /// Like `load`, but an unreadable file is moved aside to `<path>.corrupt`
    /// and an empty store bound to `path` is returned instead.
    pub async fn load_or_recover(path: &str) -> Self {
        match Self::load(path).await {
            Ok(store) => store,
            Err(e) => {
                let backup = format!("{}.corrupt", path);
                warn!("Could not load links: {}, moving it to {} and starting empty", e, backup);
                if let Err(e) = tokio::fs::rename(path, &backup).await {
                    error!("Could not move {} aside: {}", path, e);
                }
                Self::at(path)
            }
        }
    }

    /// Save to the load path atomically
    pub async fn persist(&self) -> crate::error::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(self)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content).await.map_err(|e| {
            crate::error::BotError::StateSave {
                path: path.clone(),
                source: e,
            }
        })?;

        tokio::fs::rename(&temp_path, path).await.map_err(|e| {
            crate::error::BotError::StateSave {
                path: path.clone(),
                source: e,
            }
        })?;

        Ok(())
    }

    pub fn get_link(&self, user_id: UserId) -> Option<&Link> {
        self.links.get(&user_id.to_string())
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<&Link> {
        let tag = normalize_tag(tag);
        self.links.values().find(|link| link.game_tag == tag)
    }

    /// Insert or replace the user's link. Returns links of other users that
    /// held the same tag and were removed.
    pub fn put_link(&mut self, mut link: Link) -> Vec<Link> {
        link.game_tag = normalize_tag(&link.game_tag);

        let displaced_ids: Vec<String> = self
            .links
            .values()
            .filter(|other| other.game_tag == link.game_tag && other.discord_id != link.discord_id)
            .map(|other| other.discord_id.clone())
            .collect();
        let displaced = displaced_ids
            .iter()
            .filter_map(|id| self.links.remove(id))
            .collect();

        self.links.insert(link.discord_id.clone(), link);
        self.last_updated = current_timestamp();
        displaced
    }

    pub fn delete_link(&mut self, user_id: UserId) -> Option<Link> {
        let removed = self.links.remove(&user_id.to_string());
        if removed.is_some() {
            self.last_updated = current_timestamp();
        }
        removed
    }

    /// All links, ordered by game name
    pub fn list_links(&self) -> Vec<Link> {
        let mut links: Vec<Link> = self.links.values().cloned().collect();
        links.sort_by(|a, b| {
            a.game_name
                .to_lowercase()
                .cmp(&b.game_name.to_lowercase())
                .then_with(|| a.game_tag.cmp(&b.game_tag))
        });
        links
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

/// A verified association between a Discord user and a game account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Discord user ID (snowflake as string)
    pub discord_id: String,

    /// Normalized player tag
    pub game_tag: String,

    /// In-game name at the time of linking
    pub game_name: String,

    /// When the link was written (Unix timestamp)
    pub linked_at: u64,

    pub source: LinkSource,
}

impl Link {
    pub fn new(user_id: UserId, game_tag: &str, game_name: &str, source: LinkSource) -> Self {
        Self {
            discord_id: user_id.to_string(),
            game_tag: normalize_tag(game_tag),
            game_name: game_name.to_string(),
            linked_at: current_timestamp(),
            source,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.discord_id
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(UserId::new)
    }
}

/// How a link came to exist
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    Verification,
    Admin,
}

/// Shared link store type
pub type SharedLinkStore = Arc<tokio::sync::RwLock<LinkStore>>;

pub fn create_shared_link_store(store: LinkStore) -> SharedLinkStore {
    Arc::new(tokio::sync::RwLock::new(store))
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

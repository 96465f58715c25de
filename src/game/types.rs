use serde::{Deserialize, Serialize};

/// League rounds list "#0" for wars that are not scheduled yet
pub const PLACEHOLDER_WAR_TAG: &str = "#0";

/// Canonical tag form: uppercase, no whitespace, leading '#'
pub fn normalize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .trim()
        .trim_start_matches('#')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    format!("#{}", cleaned.to_uppercase())
}

/// In-game clan rank. The API calls elders "admin".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClanRole {
    NotMember,
    Member,
    Admin,
    CoLeader,
    Leader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    #[serde(default)]
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub max_level: u32,
    #[serde(default)]
    pub village: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hero {
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub village: String,
    /// Currently equipped items
    #[serde(default)]
    pub equipment: Vec<Equipment>,
}

/// One player as returned by the clan roster or player endpoint.
/// Roster entries carry no heroes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub town_hall_level: u32,
    #[serde(default)]
    pub trophies: u32,
    #[serde(default)]
    pub league: Option<League>,
    #[serde(default)]
    pub role: Option<ClanRole>,
    #[serde(default)]
    pub heroes: Vec<Hero>,
    /// Every equipment piece the player owns
    #[serde(default)]
    pub hero_equipment: Vec<Equipment>,
}

impl PlayerSnapshot {
    pub fn hero(&self, name: &str) -> Option<&Hero> {
        self.heroes.iter().find(|h| h.name == name)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        normalize_tag(&self.tag) == normalize_tag(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarState {
    NotInWar,
    Preparation,
    InWar,
    WarEnded,
    #[serde(other)]
    Unknown,
}

impl WarState {
    pub fn is_active(self) -> bool {
        matches!(self, WarState::Preparation | WarState::InWar)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarAttack {
    pub attacker_tag: String,
    pub defender_tag: String,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub destruction_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarMember {
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub map_position: u32,
    #[serde(default)]
    pub attacks: Vec<WarAttack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarClan {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<WarMember>,
}

impl WarClan {
    pub fn is_clan(&self, clan_tag: &str) -> bool {
        self.tag
            .as_deref()
            .map(|tag| normalize_tag(tag) == normalize_tag(clan_tag))
            .unwrap_or(false)
    }
}

/// A regular war or a single league war
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarDetail {
    pub state: WarState,
    #[serde(default)]
    pub team_size: u32,
    #[serde(default)]
    pub attacks_per_member: Option<u32>,
    #[serde(default)]
    pub preparation_start_time: Option<String>,
    #[serde(default)]
    pub clan: Option<WarClan>,
    #[serde(default)]
    pub opponent: Option<WarClan>,
}

impl WarDetail {
    /// The tracked clan's side, whichever slot the API put it in
    pub fn side_of(&self, clan_tag: &str) -> Option<&WarClan> {
        [self.clan.as_ref(), self.opponent.as_ref()]
            .into_iter()
            .flatten()
            .find(|side| side.is_clan(clan_tag))
    }

    /// The side facing the tracked clan
    pub fn enemy_of(&self, clan_tag: &str) -> Option<&WarClan> {
        [self.clan.as_ref(), self.opponent.as_ref()]
            .into_iter()
            .flatten()
            .find(|side| !side.is_clan(clan_tag))
    }

    pub fn involves(&self, clan_tag: &str) -> bool {
        self.side_of(clan_tag).is_some()
    }

    /// Stable identifier for one war, used to announce each war only once
    pub fn war_key(&self) -> String {
        let mut tags: Vec<String> = [self.clan.as_ref(), self.opponent.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|side| side.tag.as_deref().map(normalize_tag))
            .collect();
        tags.sort();
        format!(
            "{}|{}",
            self.preparation_start_time.as_deref().unwrap_or("unknown"),
            tags.join("-")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeagueGroupState {
    Preparation,
    InWar,
    Ended,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueRound {
    #[serde(default)]
    pub war_tags: Vec<String>,
}

/// Clan War League group descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueGroup {
    pub state: LeagueGroupState,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub rounds: Vec<LeagueRound>,
}

use serde::{Deserialize, Serialize};

use crate::game::{ClanRole, PlayerSnapshot};

/// Names of every role the bot manages, and the rules that derive them from
/// a player's game state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RoleLayout {
    /// Granted to every linked member
    pub verified_role: String,

    /// Held while a verification session is open
    pub pending_role: String,

    pub leader_role: String,
    pub co_leader_role: String,
    pub elder_role: String,

    /// Town-hall roles are named `{prefix}{level}`, e.g. "TH14"
    pub town_hall_prefix: String,

    /// Players below this town-hall level get no town-hall role
    pub min_town_hall: u32,

    /// Highest town-hall level to pre-create at startup
    pub max_town_hall: u32,

    /// League tier role names, matched as a prefix of the API league name
    /// ("Titan League II" -> "Titan League")
    pub league_tiers: Vec<String>,

    /// Trophy roles are named `{prefix}{trophies}`, one role per exact count
    pub trophy_role_prefix: String,
}

impl Default for RoleLayout {
    fn default() -> Self {
        Self {
            verified_role: "Verified".to_string(),
            pending_role: "Verification Pending".to_string(),
            leader_role: "Leader".to_string(),
            co_leader_role: "Co-Leader".to_string(),
            elder_role: "Elder".to_string(),
            town_hall_prefix: "TH".to_string(),
            min_town_hall: 9,
            max_town_hall: 17,
            league_tiers: vec![
                "Bronze League".to_string(),
                "Silver League".to_string(),
                "Gold League".to_string(),
                "Crystal League".to_string(),
                "Master League".to_string(),
                "Champion League".to_string(),
                "Titan League".to_string(),
                "Legend League".to_string(),
            ],
            trophy_role_prefix: "Trophies: ".to_string(),
        }
    }
}

impl RoleLayout {
    /// Clan-rank role for an in-game role; plain members and non-members have none
    pub fn rank_role(&self, role: Option<ClanRole>) -> Option<&str> {
        match role? {
            ClanRole::Leader => Some(&self.leader_role),
            ClanRole::CoLeader => Some(&self.co_leader_role),
            ClanRole::Admin => Some(&self.elder_role),
            ClanRole::Member | ClanRole::NotMember => None,
        }
    }

    pub fn is_rank_role(&self, name: &str) -> bool {
        name == self.leader_role || name == self.co_leader_role || name == self.elder_role
    }

    pub fn town_hall_role(&self, level: u32) -> Option<String> {
        (level >= self.min_town_hall).then(|| format!("{}{}", self.town_hall_prefix, level))
    }

    pub fn is_town_hall_role(&self, name: &str) -> bool {
        name.strip_prefix(self.town_hall_prefix.as_str())
            .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    }

    /// Longest configured tier that prefixes the league name
    pub fn league_role(&self, league_name: &str) -> Option<&str> {
        self.league_tiers
            .iter()
            .filter(|tier| league_name.starts_with(tier.as_str()))
            .max_by_key(|tier| tier.len())
            .map(|tier| tier.as_str())
    }

    pub fn is_league_role(&self, name: &str) -> bool {
        self.league_tiers.iter().any(|tier| tier == name)
    }

    pub fn trophy_role(&self, trophies: u32) -> String {
        format!("{}{}", self.trophy_role_prefix, trophies)
    }

    pub fn is_trophy_role(&self, name: &str) -> bool {
        name.strip_prefix(self.trophy_role_prefix.as_str())
            .map(|rest| rest.parse::<u32>().is_ok())
            .unwrap_or(false)
    }

    /// Whether the reconciler owns this role
    pub fn is_managed(&self, name: &str) -> bool {
        name == self.verified_role
            || self.is_rank_role(name)
            || self.is_town_hall_role(name)
            || self.is_league_role(name)
            || self.is_trophy_role(name)
    }

    /// Every managed role for this player, in a stable order
    pub fn desired_roles(&self, player: &PlayerSnapshot) -> Vec<String> {
        let mut roles = vec![self.verified_role.clone()];
        if let Some(rank) = self.rank_role(player.role) {
            roles.push(rank.to_string());
        }
        if let Some(town_hall) = self.town_hall_role(player.town_hall_level) {
            roles.push(town_hall);
        }
        if let Some(league) = player
            .league
            .as_ref()
            .and_then(|league| self.league_role(&league.name))
        {
            roles.push(league.to_string());
        }
        roles.push(self.trophy_role(player.trophies));
        roles
    }

    /// Roles created up front when the bot joins the guild. Trophy roles are
    /// created on demand.
    pub fn static_roles(&self) -> Vec<String> {
        let mut roles = vec![
            self.verified_role.clone(),
            self.pending_role.clone(),
            self.leader_role.clone(),
            self.co_leader_role.clone(),
            self.elder_role.clone(),
        ];
        roles.extend(
            (self.min_town_hall..=self.max_town_hall)
                .map(|level| format!("{}{}", self.town_hall_prefix, level)),
        );
        roles.extend(self.league_tiers.iter().cloned());
        roles
    }

    pub fn validate(&self) -> Result<(), String> {
        let names = [
            &self.verified_role,
            &self.pending_role,
            &self.leader_role,
            &self.co_leader_role,
            &self.elder_role,
            &self.town_hall_prefix,
            &self.trophy_role_prefix,
        ];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err("role names and prefixes must not be empty".to_string());
        }
        if self.min_town_hall > self.max_town_hall {
            return Err(format!(
                "min_town_hall ({}) is above max_town_hall ({})",
                self.min_town_hall, self.max_town_hall
            ));
        }
        if self.is_managed(&self.pending_role) {
            return Err("pending_role must not collide with a managed role".to_string());
        }
        Ok(())
    }
}

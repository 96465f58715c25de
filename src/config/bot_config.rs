use poise::serenity_prelude::{ChannelId, GuildId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::RoleLayout;
use crate::error::{BotError, Result};

/// Bot configuration - one guild, one clan.
/// Loaded from data/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// The managed Discord guild
    pub guild_id: u64,

    /// The managed clan, e.g. "#2PP"
    pub clan_tag: String,

    /// Public channel that receives "welcome" notices after verification
    #[serde(default)]
    pub welcome_channel_id: Option<u64>,

    /// Channel for war-end reports
    #[serde(default)]
    pub war_channel_id: Option<u64>,

    /// Category that private verification channels are created under
    #[serde(default)]
    pub verification_category_id: Option<u64>,

    #[serde(default)]
    pub intervals: Intervals,

    #[serde(default)]
    pub roles: RoleLayout,
}

/// Timer settings, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Intervals {
    /// Roster refresh + reconciliation + war tracking
    pub refresh_secs: u64,

    /// Delay between verification checks
    pub verification_poll_secs: u64,

    /// Total budget of a verification session
    pub verification_timeout_secs: u64,

    /// Delay before a finished verification channel is deleted
    pub channel_grace_secs: u64,

    /// How long a disambiguation prompt stays answerable
    pub choice_timeout_secs: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            refresh_secs: 300,
            verification_poll_secs: 300,
            verification_timeout_secs: 1200,
            channel_grace_secs: 5,
            choice_timeout_secs: 30,
        }
    }
}

impl Intervals {
    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn verification_poll(&self) -> Duration {
        Duration::from_secs(self.verification_poll_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn channel_grace(&self) -> Duration {
        Duration::from_secs(self.channel_grace_secs)
    }

    pub fn choice_timeout(&self) -> Duration {
        Duration::from_secs(self.choice_timeout_secs)
    }
}

impl BotConfig {
    /// Load from a JSON file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BotError::ConfigLoad {
            path: path.to_string(),
            source: e,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| BotError::ConfigParse {
            path: path.to_string(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.guild_id == 0 {
            return Err(BotError::ConfigValidation {
                message: "guild_id must be set".to_string(),
            });
        }
        if self.clan_tag.trim().trim_start_matches('#').is_empty() {
            return Err(BotError::ConfigValidation {
                message: "clan_tag must be set".to_string(),
            });
        }
        let intervals = &self.intervals;
        if intervals.refresh_secs == 0 || intervals.verification_poll_secs == 0 {
            return Err(BotError::ConfigValidation {
                message: "refresh and poll intervals must be positive".to_string(),
            });
        }
        if intervals.verification_timeout_secs < intervals.verification_poll_secs {
            return Err(BotError::ConfigValidation {
                message: format!(
                    "verification_timeout_secs ({}) is shorter than one poll ({})",
                    intervals.verification_timeout_secs, intervals.verification_poll_secs
                ),
            });
        }
        self.roles
            .validate()
            .map_err(|message| BotError::ConfigValidation { message })
    }

    pub fn guild(&self) -> GuildId {
        GuildId::new(self.guild_id)
    }

    pub fn welcome_channel(&self) -> Option<ChannelId> {
        self.welcome_channel_id.map(ChannelId::new)
    }

    pub fn war_channel(&self) -> Option<ChannelId> {
        self.war_channel_id.map(ChannelId::new)
    }

    pub fn verification_category(&self) -> Option<ChannelId> {
        self.verification_category_id.map(ChannelId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = r##"{
            "guild_id": 1234,
            "clan_tag": "#2PP"
        }"##;

        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.intervals.verification_timeout_secs, 1200);
        assert_eq!(config.roles.verified_role, "Verified");
        assert!(config.welcome_channel().is_none());
    }

    #[test]
    fn test_parse_overrides() {
        let json = r##"{
            "guild_id": 1234,
            "clan_tag": "#2PP",
            "welcome_channel_id": 55,
            "intervals": { "verification_poll_secs": 60 },
            "roles": { "min_town_hall": 11 }
        }"##;

        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.intervals.verification_poll_secs, 60);
        assert_eq!(config.intervals.refresh_secs, 300);
        assert_eq!(config.roles.min_town_hall, 11);
        assert_eq!(config.welcome_channel(), Some(ChannelId::new(55)));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let json = r##"{ "guild_id": 1, "clan_tag": "#2PP", "colour": "red" }"##;
        assert!(serde_json::from_str::<BotConfig>(json).is_err());
    }

    #[test]
    fn test_timeout_shorter_than_poll_is_invalid() {
        let json = r##"{
            "guild_id": 1,
            "clan_tag": "#2PP",
            "intervals": { "verification_poll_secs": 600, "verification_timeout_secs": 60 }
        }"##;
        let config: BotConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(BotError::ConfigValidation { .. })
        ));
    }
}

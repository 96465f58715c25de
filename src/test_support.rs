//! In-memory guild, game API and prompt doubles for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use poise::serenity_prelude::{ChannelId, RoleId, UserId};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BotError, Result};
use crate::game::{
    ClanRole, Equipment, GameDataProvider, Hero, LeagueGroup, LeagueGroupState, LeagueRound,
    PlayerSnapshot, WarAttack, WarClan, WarDetail, WarMember, WarState,
};
use crate::managers::choice::{ChoiceOutcome, ChoicePrompter};
use crate::platform::{CommunityPlatform, MemberInfo, RoleInfo};
use crate::state::SharedSyncGate;

pub const CLAN_TAG: &str = "#2PP";

pub fn player(
    tag: &str,
    name: &str,
    town_hall: u32,
    trophies: u32,
    role: Option<ClanRole>,
) -> PlayerSnapshot {
    PlayerSnapshot {
        tag: tag.to_string(),
        name: name.to_string(),
        town_hall_level: town_hall,
        trophies,
        league: None,
        role,
        heroes: vec![],
        hero_equipment: vec![],
    }
}

/// Player with heroes (and what they have equipped) plus owned equipment levels
pub fn player_with_equipment(
    heroes: &[(&str, &[&str])],
    owned: &[(&str, u32)],
) -> PlayerSnapshot {
    let level_of = |name: &str| {
        owned
            .iter()
            .find(|(owned_name, _)| *owned_name == name)
            .map(|(_, level)| *level)
            .unwrap_or(1)
    };

    let mut snapshot = player("#ABC123", "Ash", 14, 3200, Some(ClanRole::Member));
    snapshot.heroes = heroes
        .iter()
        .map(|(hero, equipped)| Hero {
            name: hero.to_string(),
            level: 50,
            village: "home".to_string(),
            equipment: equipped
                .iter()
                .map(|name| equipment(name, level_of(name)))
                .collect(),
        })
        .collect();
    snapshot.hero_equipment = owned
        .iter()
        .map(|(name, level)| equipment(name, *level))
        .collect();
    snapshot
}

fn equipment(name: &str, level: u32) -> Equipment {
    Equipment {
        name: name.to_string(),
        level,
        max_level: 18,
        village: "home".to_string(),
    }
}

/// Swap `item` into the hero's first equipment slot
pub fn equip(player: &mut PlayerSnapshot, hero: &str, item: &str) {
    let level = player
        .hero_equipment
        .iter()
        .find(|e| e.name == item)
        .map(|e| e.level)
        .unwrap_or(1);
    if let Some(hero) = player.heroes.iter_mut().find(|h| h.name == hero) {
        if hero.equipment.is_empty() {
            hero.equipment.push(equipment(item, level));
        } else {
            hero.equipment[0] = equipment(item, level);
        }
    }
}

pub fn war_member(tag: &str, name: &str, attacks: usize) -> WarMember {
    WarMember {
        tag: tag.to_string(),
        name: name.to_string(),
        map_position: 1,
        attacks: (0..attacks)
            .map(|_| WarAttack {
                attacker_tag: tag.to_string(),
                defender_tag: "#ENEMY".to_string(),
                stars: 2,
                destruction_percentage: 75.0,
            })
            .collect(),
    }
}

pub fn war(state: WarState, our_members: Vec<WarMember>, attacks_per_member: u32) -> WarDetail {
    war_between(state, CLAN_TAG, "#ENEMY", our_members, attacks_per_member)
}

pub fn war_between(
    state: WarState,
    clan: &str,
    opponent: &str,
    clan_members: Vec<WarMember>,
    attacks_per_member: u32,
) -> WarDetail {
    WarDetail {
        state,
        team_size: clan_members.len() as u32,
        attacks_per_member: Some(attacks_per_member),
        preparation_start_time: Some(format!("20260101T000000.000Z-{}", opponent)),
        clan: Some(WarClan {
            tag: Some(clan.to_string()),
            name: Some(format!("Clan {}", clan)),
            members: clan_members,
        }),
        opponent: Some(WarClan {
            tag: Some(opponent.to_string()),
            name: Some(format!("Clan {}", opponent)),
            members: vec![],
        }),
    }
}

pub fn league_group(state: LeagueGroupState, rounds: Vec<Vec<&str>>) -> LeagueGroup {
    LeagueGroup {
        state,
        season: Some("2026-10".to_string()),
        rounds: rounds
            .into_iter()
            .map(|tags| LeagueRound {
                war_tags: tags.into_iter().map(String::from).collect(),
            })
            .collect(),
    }
}

// ========== Game API ==========

#[derive(Default)]
pub struct FakeGame {
    pub members: Mutex<Vec<PlayerSnapshot>>,
    pub players: Mutex<HashMap<String, PlayerSnapshot>>,
    pub current_war: Mutex<Option<WarDetail>>,
    pub league_group: Mutex<Option<LeagueGroup>>,
    pub league_wars: Mutex<HashMap<String, WarDetail>>,
    /// Every call fails with `Unavailable` while set
    pub offline: Mutex<bool>,
    pub player_fetches: Mutex<usize>,
}

impl FakeGame {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_online(&self) -> Result<()> {
        if *self.offline.lock() {
            return Err(BotError::Unavailable {
                message: "fake game API offline".to_string(),
            });
        }
        Ok(())
    }

    pub fn set_player(&self, player: PlayerSnapshot) {
        self.players.lock().insert(player.tag.clone(), player);
    }

    pub fn update_player(&self, tag: &str, update: impl FnOnce(&mut PlayerSnapshot)) {
        if let Some(player) = self.players.lock().get_mut(tag) {
            update(player);
        }
    }

    pub fn set_league_war(&self, war_tag: &str, war: WarDetail) {
        self.league_wars.lock().insert(war_tag.to_string(), war);
    }
}

#[async_trait]
impl GameDataProvider for FakeGame {
    async fn clan_members(&self, _clan_tag: &str) -> Result<Vec<PlayerSnapshot>> {
        self.check_online()?;
        Ok(self.members.lock().clone())
    }

    async fn player(&self, tag: &str) -> Result<PlayerSnapshot> {
        self.check_online()?;
        *self.player_fetches.lock() += 1;
        self.players
            .lock()
            .get(tag)
            .cloned()
            .ok_or_else(|| BotError::NotFound {
                query: tag.to_string(),
            })
    }

    async fn current_war(&self, _clan_tag: &str) -> Result<WarDetail> {
        self.check_online()?;
        self.current_war
            .lock()
            .clone()
            .ok_or_else(|| BotError::Unavailable {
                message: "no war".to_string(),
            })
    }

    async fn league_group(&self, _clan_tag: &str) -> Result<Option<LeagueGroup>> {
        self.check_online()?;
        Ok(self.league_group.lock().clone())
    }

    async fn league_war(&self, war_tag: &str) -> Result<WarDetail> {
        self.check_online()?;
        self.league_wars
            .lock()
            .get(war_tag)
            .cloned()
            .ok_or_else(|| BotError::Unavailable {
                message: format!("no league war {}", war_tag),
            })
    }
}

// ========== Guild ==========

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    AddRole(UserId, String),
    RemoveRole(UserId, String),
    CreateRole(String),
    DeleteRole(String),
}

#[derive(Default)]
pub struct FakeGuild {
    pub roles: Vec<RoleInfo>,
    pub members: HashMap<UserId, MemberInfo>,
    pub channels: HashMap<ChannelId, String>,
    pub messages: Vec<(ChannelId, String)>,
    pub direct_messages: Vec<(UserId, String)>,
    pub nicknames: HashMap<UserId, String>,
    pub mutations: Vec<Mutation>,
    /// Role names the bot may not grant or revoke
    pub protected_roles: Vec<String>,
    /// (action, gate paused) for nickname changes and role grants while a
    /// gate is watched
    pub gate_log: Vec<(String, bool)>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakePlatform {
    pub guild: Mutex<FakeGuild>,
    pub watched_gate: Mutex<Option<SharedSyncGate>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let platform = Self::default();
        platform.guild.lock().next_id = 10_000;
        platform
    }

    pub fn add_member(&self, user_id: UserId, name: &str) {
        self.guild.lock().members.insert(
            user_id,
            MemberInfo {
                user_id,
                display_name: name.to_string(),
                roles: vec![],
                is_bot: false,
            },
        );
    }

    pub fn add_role(&self, name: &str) -> RoleId {
        let mut guild = self.guild.lock();
        guild.next_id += 1;
        let id = RoleId::new(guild.next_id);
        guild.roles.push(RoleInfo {
            id,
            name: name.to_string(),
        });
        id
    }

    /// Give a member a role by name, creating the role if needed
    pub fn grant(&self, user_id: UserId, name: &str) {
        let id = self.role_id(name).unwrap_or_else(|| self.add_role(name));
        let mut guild = self.guild.lock();
        if let Some(member) = guild.members.get_mut(&user_id) {
            if !member.roles.contains(&id) {
                member.roles.push(id);
            }
        }
    }

    pub fn role_id(&self, name: &str) -> Option<RoleId> {
        self.guild
            .lock()
            .roles
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub fn role_names_of(&self, user_id: UserId) -> Vec<String> {
        let guild = self.guild.lock();
        let Some(member) = guild.members.get(&user_id) else {
            return vec![];
        };
        let mut names: Vec<String> = member
            .roles
            .iter()
            .filter_map(|id| guild.roles.iter().find(|r| r.id == *id))
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.guild.lock().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.guild.lock().mutations.clear();
    }

    pub fn channel_count(&self) -> usize {
        self.guild.lock().channels.len()
    }

    pub fn messages_to(&self, channel_id: ChannelId) -> Vec<String> {
        self.guild
            .lock()
            .messages
            .iter()
            .filter(|(c, _)| *c == channel_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn watch_gate(&self, gate: SharedSyncGate) {
        *self.watched_gate.lock() = Some(gate);
    }

    pub fn gate_log(&self) -> Vec<(String, bool)> {
        self.guild.lock().gate_log.clone()
    }

    fn note_gate(&self, guild: &mut FakeGuild, action: String) {
        if let Some(gate) = self.watched_gate.lock().as_ref() {
            guild.gate_log.push((action, gate.is_paused()));
        }
    }

    fn role_name(guild: &FakeGuild, role_id: RoleId) -> Result<String> {
        guild
            .roles
            .iter()
            .find(|r| r.id == role_id)
            .map(|r| r.name.clone())
            .ok_or_else(|| BotError::RoleNotFound {
                name: role_id.to_string(),
            })
    }
}

#[async_trait]
impl CommunityPlatform for FakePlatform {
    async fn roles(&self) -> Result<Vec<RoleInfo>> {
        Ok(self.guild.lock().roles.clone())
    }

    async fn create_role(&self, name: &str) -> Result<RoleInfo> {
        let id = self.add_role(name);
        self.guild
            .lock()
            .mutations
            .push(Mutation::CreateRole(name.to_string()));
        Ok(RoleInfo {
            id,
            name: name.to_string(),
        })
    }

    async fn delete_role(&self, role_id: RoleId) -> Result<()> {
        let mut guild = self.guild.lock();
        let name = Self::role_name(&guild, role_id)?;
        guild.roles.retain(|r| r.id != role_id);
        for member in guild.members.values_mut() {
            member.roles.retain(|r| *r != role_id);
        }
        guild.mutations.push(Mutation::DeleteRole(name));
        Ok(())
    }

    async fn members(&self) -> Result<Vec<MemberInfo>> {
        Ok(self.guild.lock().members.values().cloned().collect())
    }

    async fn member(&self, user_id: UserId) -> Result<Option<MemberInfo>> {
        Ok(self.guild.lock().members.get(&user_id).cloned())
    }

    async fn add_member_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        let mut guild = self.guild.lock();
        let name = Self::role_name(&guild, role_id)?;
        if guild.protected_roles.contains(&name) {
            return Err(BotError::PermissionDenied {
                message: format!("cannot grant {}", name),
            });
        }
        let member = guild
            .members
            .get_mut(&user_id)
            .ok_or_else(|| BotError::MemberNotFound {
                user_id: user_id.to_string(),
            })?;
        if !member.roles.contains(&role_id) {
            member.roles.push(role_id);
        }
        self.note_gate(&mut guild, format!("add {}", name));
        guild.mutations.push(Mutation::AddRole(user_id, name));
        Ok(())
    }

    async fn remove_member_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        let mut guild = self.guild.lock();
        let name = Self::role_name(&guild, role_id)?;
        if guild.protected_roles.contains(&name) {
            return Err(BotError::PermissionDenied {
                message: format!("cannot revoke {}", name),
            });
        }
        let member = guild
            .members
            .get_mut(&user_id)
            .ok_or_else(|| BotError::MemberNotFound {
                user_id: user_id.to_string(),
            })?;
        member.roles.retain(|r| *r != role_id);
        guild.mutations.push(Mutation::RemoveRole(user_id, name));
        Ok(())
    }

    async fn set_nickname(&self, user_id: UserId, nickname: &str) -> Result<()> {
        let mut guild = self.guild.lock();
        guild.nicknames.insert(user_id, nickname.to_string());
        self.note_gate(&mut guild, format!("nickname {}", nickname));
        Ok(())
    }

    async fn create_private_channel(&self, _user_id: UserId, name: &str) -> Result<ChannelId> {
        let mut guild = self.guild.lock();
        guild.next_id += 1;
        let id = ChannelId::new(guild.next_id);
        guild.channels.insert(id, name.to_string());
        Ok(id)
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        self.guild.lock().channels.remove(&channel_id);
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        self.guild
            .lock()
            .messages
            .push((channel_id, content.to_string()));
        Ok(())
    }

    async fn send_direct_message(&self, user_id: UserId, content: &str) -> Result<()> {
        self.guild
            .lock()
            .direct_messages
            .push((user_id, content.to_string()));
        Ok(())
    }
}

// ========== Prompts ==========

/// Answers every prompt with a fixed outcome and records what was offered
pub struct ScriptedPrompter {
    outcome: ChoiceOutcome,
    pub offered: Mutex<Vec<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new(outcome: ChoiceOutcome) -> Self {
        Self {
            outcome,
            offered: Mutex::new(vec![]),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.offered.lock().len()
    }
}

#[async_trait]
impl ChoicePrompter for ScriptedPrompter {
    async fn choose(&self, _user_id: UserId, options: &[String], _timeout: Duration) -> ChoiceOutcome {
        self.offered.lock().push(options.to_vec());
        self.outcome
    }
}

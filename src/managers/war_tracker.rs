use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::game::{
    LeagueGroupState, SharedGameProvider, WarDetail, WarMember, WarState, PLACEHOLDER_WAR_TAG,
};
use crate::state::SharedSnapshotCache;

/// Attacks per member in a regular war when the API omits the field
pub const DEFAULT_ATTACKS: u32 = 2;

/// Attacks per member in a league war
pub const LEAGUE_ATTACKS: u32 = 1;

/// Clan War League round tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarRoundState {
    pub cwl_active: bool,

    /// Always within the group's rounds while active
    pub current_round_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAttacks {
    pub tag: String,
    pub name: String,
    pub used: u32,
}

/// Attack usage of the tracked clan in one war
#[derive(Debug, Clone, PartialEq)]
pub struct WarReport {
    pub war_key: String,
    pub state: WarState,
    pub league: bool,
    pub opponent: String,
    pub allowance: u32,
    pub missing: Vec<MissingAttacks>,
}

impl WarReport {
    pub fn format(&self) -> String {
        let kind = if self.league { "League war" } else { "War" };
        match self.state {
            WarState::NotInWar | WarState::Preparation | WarState::Unknown => {
                format!("{} against {}: no attacks to track yet.", kind, self.opponent)
            }
            _ if self.missing.is_empty() => {
                format!("{} against {}: everyone has used their attacks.", kind, self.opponent)
            }
            state => {
                let verb = if state == WarState::WarEnded {
                    "missed attacks"
                } else {
                    "still have attacks left"
                };
                let mut out = format!(
                    "{} against {}: **{}** members {}:\n",
                    kind,
                    self.opponent,
                    self.missing.len(),
                    verb
                );
                for member in &self.missing {
                    out.push_str(&format!(
                        "- {} ({}): {}/{}\n",
                        member.name, member.tag, member.used, self.allowance
                    ));
                }
                out
            }
        }
    }
}

/// Members of the tracked clan who still owe attacks. Empty for wars that
/// have not started.
pub fn unattacked<'a>(war: &'a WarDetail, clan_tag: &str, allowance: u32) -> Vec<&'a WarMember> {
    let Some(side) = war.side_of(clan_tag) else {
        return Vec::new();
    };
    match war.state {
        WarState::WarEnded => side
            .members
            .iter()
            .filter(|m| m.attacks.is_empty())
            .collect(),
        WarState::InWar => side
            .members
            .iter()
            .filter(|m| (m.attacks.len() as u32) < allowance)
            .collect(),
        WarState::NotInWar | WarState::Preparation | WarState::Unknown => Vec::new(),
    }
}

pub fn process_war(war: &WarDetail, clan_tag: &str, allowance: u32, league: bool) -> WarReport {
    let opponent = war
        .enemy_of(clan_tag)
        .and_then(|side| side.name.clone().or_else(|| side.tag.clone()))
        .unwrap_or_else(|| "unknown opponent".to_string());
    WarReport {
        war_key: war.war_key(),
        state: war.state,
        league,
        opponent,
        allowance,
        missing: unattacked(war, clan_tag, allowance)
            .into_iter()
            .map(|m| MissingAttacks {
                tag: m.tag.clone(),
                name: m.name.clone(),
                used: m.attacks.len() as u32,
            })
            .collect(),
    }
}

fn regular_allowance(war: &WarDetail) -> u32 {
    war.attacks_per_member.unwrap_or(DEFAULT_ATTACKS)
}

/// Polls the current war and walks league rounds
pub struct WarTracker {
    game: SharedGameProvider,
    snapshot: SharedSnapshotCache,
    clan_tag: String,
    state: Mutex<WarRoundState>,

    /// Key of the current war while it was last seen in preparation or battle
    live_war: Mutex<Option<String>>,

    /// Same for the tracked league war
    live_league_war: Mutex<Option<String>>,
}

impl WarTracker {
    pub fn new(game: SharedGameProvider, snapshot: SharedSnapshotCache, clan_tag: &str) -> Self {
        Self {
            game,
            snapshot,
            clan_tag: clan_tag.to_string(),
            state: Mutex::new(WarRoundState::default()),
            live_war: Mutex::new(None),
            live_league_war: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WarRoundState {
        *self.state.lock()
    }

    fn reset(&self) {
        *self.state.lock() = WarRoundState::default();
        *self.live_league_war.lock() = None;
    }

    /// One heartbeat. Returns reports for wars that ended since the last tick.
    pub async fn tick(&self) -> Vec<WarReport> {
        let mut ended = Vec::new();
        if let Some(report) = self.refresh_current_war().await {
            ended.push(report);
        }
        if let Some(report) = self.track_league().await {
            ended.push(report);
        }
        ended
    }

    pub async fn refresh_current_war(&self) -> Option<WarReport> {
        match self.game.current_war(&self.clan_tag).await {
            Ok(war) => {
                let report = self.observe(&self.live_war, &war, regular_allowance(&war), false);
                self.snapshot.write().await.set_current_war(war);
                report
            }
            Err(e) => {
                warn!("Failed to refresh current war: {}", e);
                None
            }
        }
    }

    /// Advance the league state machine by one tick
    pub async fn track_league(&self) -> Option<WarReport> {
        let state = self.state();

        if !state.cwl_active {
            match self.game.league_group(&self.clan_tag).await {
                Ok(Some(group))
                    if matches!(
                        group.state,
                        LeagueGroupState::Preparation | LeagueGroupState::InWar
                    ) =>
                {
                    info!(
                        "League season {} started, tracking {} rounds",
                        group.season.as_deref().unwrap_or("?"),
                        group.rounds.len()
                    );
                    *self.state.lock() = WarRoundState {
                        cwl_active: true,
                        current_round_index: 0,
                    };
                }
                Ok(_) => debug!("Clan is not in an active league group"),
                Err(e) => debug!("League group lookup failed: {}", e),
            }
            return None;
        }

        let group = match self.game.league_group(&self.clan_tag).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                info!("League group is gone, league tracking stopped");
                self.reset();
                self.snapshot.write().await.set_league_war(None);
                return None;
            }
            Err(e) if e.is_transient() => {
                warn!("League group unavailable, keeping round {}: {}", state.current_round_index, e);
                return None;
            }
            Err(e) => {
                warn!("League group unreachable, league tracking stopped: {}", e);
                self.reset();
                return None;
            }
        };

        let Some(round) = group.rounds.get(state.current_round_index) else {
            warn!(
                "Round index {} is outside the {} league rounds, resetting",
                state.current_round_index,
                group.rounds.len()
            );
            self.reset();
            return None;
        };

        let mut report = None;
        let mut ended = false;
        for war_tag in &round.war_tags {
            if war_tag == PLACEHOLDER_WAR_TAG {
                continue;
            }
            let war = match self.game.league_war(war_tag).await {
                Ok(war) => war,
                Err(e) => {
                    warn!("Failed to fetch league war {}: {}", war_tag, e);
                    continue;
                }
            };
            if !war.involves(&self.clan_tag) {
                continue;
            }

            report = self.observe(&self.live_league_war, &war, LEAGUE_ATTACKS, true);
            ended = war.state == WarState::WarEnded;
            self.snapshot.write().await.set_league_war(Some(war));
            break;
        }

        if ended {
            let next = state.current_round_index + 1;
            if next >= group.rounds.len() {
                info!("Final league round ended, league tracking stopped");
                self.reset();
            } else {
                info!("League round {} ended, moving to round {}", next, next + 1);
                self.state.lock().current_round_index = next;
            }
        }
        report
    }

    /// Record the war's state in `live` and report it when it moves from
    /// preparation or battle to ended. A war first seen already ended is not
    /// reported.
    fn observe(
        &self,
        live: &Mutex<Option<String>>,
        war: &WarDetail,
        allowance: u32,
        league: bool,
    ) -> Option<WarReport> {
        if !war.involves(&self.clan_tag) {
            return None;
        }
        let key = war.war_key();
        let mut live = live.lock();
        match war.state {
            WarState::Preparation | WarState::InWar => {
                *live = Some(key);
                None
            }
            WarState::WarEnded if live.as_deref() == Some(key.as_str()) => {
                *live = None;
                Some(process_war(war, &self.clan_tag, allowance, league))
            }
            WarState::WarEnded => None,
            WarState::NotInWar | WarState::Unknown => {
                *live = None;
                None
            }
        }
    }

    /// Reports for the cached current and league wars
    pub async fn cached_reports(&self) -> Vec<WarReport> {
        let cache = self.snapshot.read().await;
        let mut reports = Vec::new();
        if let Some(war) = cache.current_war().filter(|w| w.involves(&self.clan_tag)) {
            reports.push(process_war(war, &self.clan_tag, regular_allowance(war), false));
        }
        if let Some(war) = cache.league_war() {
            reports.push(process_war(war, &self.clan_tag, LEAGUE_ATTACKS, true));
        }
        reports
    }

    #[cfg(test)]
    fn set_state(&self, state: WarRoundState) {
        *self.state.lock() = state;
    }
}

/// Shared war tracker type
pub type SharedWarTracker = Arc<WarTracker>;

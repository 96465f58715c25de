use futures::future::join_all;
use poise::serenity_prelude::{RoleId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::role_manager::SharedRoleManager;
use crate::config::RoleLayout;
use crate::error::{BotError, Result};
use crate::game::PlayerSnapshot;
use crate::platform::{MemberInfo, RoleInfo, SharedPlatform};
use crate::state::Link;

/// Counters for one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub members_checked: usize,
    pub skipped_no_snapshot: usize,
    pub skipped_not_in_guild: usize,
    pub roles_added: usize,
    pub roles_removed: usize,
    pub roles_created: usize,
    pub trophy_roles_deleted: usize,
    pub failures: usize,
}

impl ReconcileSummary {
    /// Guild changes made by the pass
    pub fn mutations(&self) -> usize {
        self.roles_added + self.roles_removed + self.roles_created + self.trophy_roles_deleted
    }

    pub fn format(&self) -> String {
        format!(
            "Checked {} members: +{} / -{} roles, {} roles created, {} stale trophy roles deleted, \
             {} skipped (no game data), {} skipped (not in server), {} failures",
            self.members_checked,
            self.roles_added,
            self.roles_removed,
            self.roles_created,
            self.trophy_roles_deleted,
            self.skipped_no_snapshot,
            self.skipped_not_in_guild,
            self.failures
        )
    }
}

/// Role changes for one member
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RolePlan {
    /// Rank roles to drop before any rank role is added
    pub strip_ranks: Vec<String>,
    pub remove: Vec<String>,
    pub add: Vec<String>,
}

impl RolePlan {
    pub fn is_empty(&self) -> bool {
        self.strip_ranks.is_empty() && self.remove.is_empty() && self.add.is_empty()
    }
}

/// Diff desired managed roles against the managed roles a member holds
pub fn plan_roles(layout: &RoleLayout, desired: &[String], current: &[String]) -> RolePlan {
    let mut plan = RolePlan::default();

    for name in current {
        if desired.contains(name) {
            continue;
        }
        if layout.is_rank_role(name) {
            plan.strip_ranks.push(name.clone());
        } else {
            plan.remove.push(name.clone());
        }
    }

    plan.add = desired
        .iter()
        .filter(|name| !current.contains(name))
        .cloned()
        .collect();

    plan
}

#[derive(Debug, Clone, Copy)]
enum RoleOp {
    Add,
    Remove,
}

/// Converges managed guild roles to the game snapshot
pub struct Reconciler {
    platform: SharedPlatform,
    role_manager: SharedRoleManager,
    layout: RoleLayout,
}

impl Reconciler {
    pub fn new(platform: SharedPlatform, role_manager: SharedRoleManager, layout: RoleLayout) -> Self {
        Self {
            platform,
            role_manager,
            layout,
        }
    }

    pub fn layout(&self) -> &RoleLayout {
        &self.layout
    }

    /// Full pass over every link. Links without game data or without a guild
    /// member are skipped, never stripped.
    pub async fn reconcile(&self, links: &[Link], snapshot: &[PlayerSnapshot]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        let role_names = match self.role_manager.refresh().await {
            Ok(roles) => names_by_id(&roles),
            Err(e) => {
                error!("Reconcile aborted, could not list roles: {}", e);
                summary.failures += 1;
                return summary;
            }
        };

        let members: HashMap<UserId, MemberInfo> = match self.platform.members().await {
            Ok(members) => members
                .into_iter()
                .filter(|m| !m.is_bot)
                .map(|m| (m.user_id, m))
                .collect(),
            Err(e) => {
                error!("Reconcile aborted, could not list members: {}", e);
                summary.failures += 1;
                return summary;
            }
        };

        for link in links {
            let Some(player) = snapshot.iter().find(|p| p.has_tag(&link.game_tag)) else {
                warn!(
                    "No snapshot for {} ({}), leaving roles of {} untouched",
                    link.game_name, link.game_tag, link.discord_id
                );
                summary.skipped_no_snapshot += 1;
                continue;
            };

            let Some(member) = link.user_id().and_then(|id| members.get(&id)) else {
                debug!("Linked user {} is not in the guild", link.discord_id);
                summary.skipped_not_in_guild += 1;
                continue;
            };

            self.sync_member(member, player, &role_names, &mut summary)
                .await;
        }

        self.collect_stale_trophy_roles(&mut summary).await;

        if summary.mutations() > 0 || summary.failures > 0 {
            info!("Reconcile pass: {}", summary.format());
        } else {
            debug!("Reconcile pass: {}", summary.format());
        }
        summary
    }

    /// Reconcile a single identity, e.g. right after verification
    pub async fn reconcile_member(
        &self,
        link: &Link,
        player: &PlayerSnapshot,
    ) -> Result<ReconcileSummary> {
        let user_id = link.user_id().ok_or_else(|| BotError::Inconsistent {
            message: format!("link has invalid discord id '{}'", link.discord_id),
        })?;
        let role_names = names_by_id(&self.role_manager.refresh().await?);
        let member = self
            .platform
            .member(user_id)
            .await?
            .ok_or_else(|| BotError::MemberNotFound {
                user_id: user_id.to_string(),
            })?;

        let mut summary = ReconcileSummary::default();
        self.sync_member(&member, player, &role_names, &mut summary)
            .await;
        Ok(summary)
    }

    /// Remove every managed role from a member, e.g. after unlinking
    pub async fn strip_managed_roles(&self, user_id: UserId) -> Result<ReconcileSummary> {
        let role_names = names_by_id(&self.role_manager.refresh().await?);
        let mut summary = ReconcileSummary::default();
        let Some(member) = self.platform.member(user_id).await? else {
            return Ok(summary);
        };

        let held: Vec<(String, RoleId)> = member
            .roles
            .iter()
            .filter_map(|id| role_names.get(id).map(|name| (name.clone(), *id)))
            .filter(|(name, _)| self.layout.is_managed(name))
            .collect();

        let ops = held
            .into_iter()
            .map(|(name, id)| self.apply_op(user_id, RoleOp::Remove, name, id));
        for (op, name, result) in join_all(ops).await {
            record(&mut summary, user_id, op, &name, result);
        }
        Ok(summary)
    }

    async fn sync_member(
        &self,
        member: &MemberInfo,
        player: &PlayerSnapshot,
        role_names: &HashMap<RoleId, String>,
        summary: &mut ReconcileSummary,
    ) {
        summary.members_checked += 1;

        let desired = self.layout.desired_roles(player);
        let current: Vec<String> = member
            .roles
            .iter()
            .filter_map(|id| role_names.get(id))
            .filter(|name| self.layout.is_managed(name))
            .cloned()
            .collect();

        let plan = plan_roles(&self.layout, &desired, &current);
        if plan.is_empty() {
            return;
        }
        debug!("Role plan for {} ({}): {:?}", member.display_name, player.tag, plan);

        let user_id = member.user_id;
        let by_name: HashMap<&String, RoleId> =
            role_names.iter().map(|(id, name)| (name, *id)).collect();

        // Rank roles go first so the member never ends up with two
        let strips = plan
            .strip_ranks
            .iter()
            .filter_map(|name| by_name.get(name).map(|id| (name.clone(), *id)))
            .map(|(name, id)| self.apply_op(user_id, RoleOp::Remove, name, id));
        for (op, name, result) in join_all(strips).await {
            record(summary, user_id, op, &name, result);
        }

        let mut ops = Vec::new();
        for name in &plan.remove {
            if let Some(id) = by_name.get(name) {
                ops.push(self.apply_op(user_id, RoleOp::Remove, name.clone(), *id));
            }
        }
        for name in &plan.add {
            let id = match by_name.get(name) {
                Some(id) => *id,
                None => match self.role_manager.ensure_role_created(name).await {
                    Ok((id, created)) => {
                        if created {
                            summary.roles_created += 1;
                        }
                        id
                    }
                    Err(e) => {
                        warn!("Could not create role '{}': {}", name, e);
                        summary.failures += 1;
                        continue;
                    }
                },
            };
            ops.push(self.apply_op(user_id, RoleOp::Add, name.clone(), id));
        }

        // Independent operations: one failure does not block the rest
        for (op, name, result) in join_all(ops).await {
            record(summary, user_id, op, &name, result);
        }
    }

    async fn apply_op(
        &self,
        user_id: UserId,
        op: RoleOp,
        name: String,
        role_id: RoleId,
    ) -> (RoleOp, String, Result<()>) {
        let result = match op {
            RoleOp::Add => self.platform.add_member_role(user_id, role_id).await,
            RoleOp::Remove => self.platform.remove_member_role(user_id, role_id).await,
        };
        (op, name, result)
    }

    /// Delete trophy roles nobody holds any more
    async fn collect_stale_trophy_roles(&self, summary: &mut ReconcileSummary) {
        let roles = match self.role_manager.refresh().await {
            Ok(roles) => roles,
            Err(e) => {
                warn!("Skipping trophy role cleanup: {}", e);
                return;
            }
        };
        let trophy_roles: Vec<RoleInfo> = roles
            .into_iter()
            .filter(|role| self.layout.is_trophy_role(&role.name))
            .collect();
        if trophy_roles.is_empty() {
            return;
        }

        let members = match self.platform.members().await {
            Ok(members) => members,
            Err(e) => {
                warn!("Skipping trophy role cleanup: {}", e);
                return;
            }
        };

        for role in trophy_roles {
            if members.iter().any(|m| m.has_role(role.id)) {
                continue;
            }
            match self.platform.delete_role(role.id).await {
                Ok(()) => {
                    debug!("Deleted stale trophy role '{}'", role.name);
                    self.role_manager.forget(&role.name).await;
                    summary.trophy_roles_deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to delete stale role '{}': {}", role.name, e);
                    summary.failures += 1;
                }
            }
        }
    }
}

fn names_by_id(roles: &[RoleInfo]) -> HashMap<RoleId, String> {
    roles.iter().map(|r| (r.id, r.name.clone())).collect()
}

fn record(
    summary: &mut ReconcileSummary,
    user_id: UserId,
    op: RoleOp,
    name: &str,
    result: Result<()>,
) {
    match (op, result) {
        (RoleOp::Add, Ok(())) => summary.roles_added += 1,
        (RoleOp::Remove, Ok(())) => summary.roles_removed += 1,
        (op, Err(e)) => {
            warn!("Failed to {:?} role '{}' for {}: {}", op, name, user_id, e);
            summary.failures += 1;
        }
    }
}

/// Shared reconciler type
pub type SharedReconciler = Arc<Reconciler>;

pub fn create_shared_reconciler(
    platform: SharedPlatform,
    role_manager: SharedRoleManager,
    layout: RoleLayout,
) -> SharedReconciler {
    Arc::new(Reconciler::new(platform, role_manager, layout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{ClanRole, League};
    use crate::managers::role_manager::create_shared_role_manager;
    use crate::state::LinkSource;
    use crate::test_support::{player, FakePlatform, Mutation};

    fn setup() -> (Arc<FakePlatform>, Reconciler) {
        let platform = Arc::new(FakePlatform::new());
        let role_manager = create_shared_role_manager(platform.clone());
        let reconciler = Reconciler::new(platform.clone(), role_manager, RoleLayout::default());
        (platform, reconciler)
    }

    fn link(user: u64, tag: &str, name: &str) -> Link {
        Link::new(UserId::new(user), tag, name, LinkSource::Verification)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_strips_other_ranks() {
        let layout = RoleLayout::default();
        let plan = plan_roles(
            &layout,
            &names(&["Verified", "Elder", "TH14"]),
            &names(&["Verified", "Leader", "Co-Leader", "TH13"]),
        );
        assert_eq!(plan.strip_ranks, names(&["Leader", "Co-Leader"]));
        assert_eq!(plan.remove, names(&["TH13"]));
        assert_eq!(plan.add, names(&["Elder", "TH14"]));
    }

    #[test]
    fn test_plan_empty_when_converged() {
        let layout = RoleLayout::default();
        let roles = names(&["Verified", "Elder", "TH14", "Trophies: 3200"]);
        assert!(plan_roles(&layout, &roles, &roles).is_empty());
    }

    #[tokio::test]
    async fn test_ash_scenario() {
        let (platform, reconciler) = setup();
        let ash = UserId::new(1);
        platform.add_member(ash, "ash_discord");
        for role in ["TH13", "Trophies: 3000", "Co-Leader", "Friends"] {
            platform.grant(ash, role);
        }

        let snapshot = vec![player("#ABC123", "Ash", 14, 3200, Some(ClanRole::Admin))];
        let summary = reconciler
            .reconcile(&[link(1, "#ABC123", "Ash")], &snapshot)
            .await;

        assert_eq!(summary.failures, 0);
        assert_eq!(
            platform.role_names_of(ash),
            names(&["Elder", "Friends", "TH14", "Trophies: 3200", "Verified"])
        );
        // The old trophy role has no holders left and is garbage-collected
        assert!(platform.role_id("Trophies: 3000").is_none());
        assert_eq!(summary.trophy_roles_deleted, 1);

        // Co-Leader is revoked before Elder is granted
        let mutations = platform.mutations();
        let strip = mutations
            .iter()
            .position(|m| *m == Mutation::RemoveRole(ash, "Co-Leader".to_string()))
            .unwrap();
        let grant = mutations
            .iter()
            .position(|m| *m == Mutation::AddRole(ash, "Elder".to_string()))
            .unwrap();
        assert!(strip < grant);
    }

    #[tokio::test]
    async fn test_shared_new_role_created_once() {
        let (platform, reconciler) = setup();
        platform.add_member(UserId::new(1), "ash_discord");
        platform.add_member(UserId::new(2), "bo_discord");

        let snapshot = vec![
            player("#A1", "Ash", 14, 3200, None),
            player("#B2", "Bo", 14, 3200, None),
        ];
        let summary = reconciler
            .reconcile(&[link(1, "#A1", "Ash"), link(2, "#B2", "Bo")], &snapshot)
            .await;

        let created = platform
            .mutations()
            .iter()
            .filter(|m| matches!(m, Mutation::CreateRole(_)))
            .count();
        assert_eq!(summary.roles_created, created);
        assert_eq!(summary.failures, 0);
        assert_eq!(
            platform.role_names_of(UserId::new(2)),
            names(&["TH14", "Trophies: 3200", "Verified"])
        );
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let (platform, reconciler) = setup();
        let mut snapshot = Vec::new();
        let mut links = Vec::new();
        let ranks = [
            Some(ClanRole::Leader),
            Some(ClanRole::CoLeader),
            Some(ClanRole::Admin),
            Some(ClanRole::Member),
            None,
        ];
        for i in 0..10u64 {
            let user = UserId::new(100 + i);
            platform.add_member(user, &format!("user{}", i));
            if i % 2 == 0 {
                platform.grant(user, "TH10");
                platform.grant(user, "Leader");
            }
            let tag = format!("#P{}", i);
            let mut p = player(&tag, &format!("P{}", i), 7 + i as u32, 1000 + 100 * i as u32, ranks[i as usize % 5]);
            if i % 3 == 0 {
                p.league = Some(League {
                    id: 1,
                    name: "Crystal League I".to_string(),
                });
            }
            snapshot.push(p);
            links.push(link(100 + i, &tag, &format!("P{}", i)));
        }

        let first = reconciler.reconcile(&links, &snapshot).await;
        assert!(first.mutations() > 0);
        assert_eq!(first.failures, 0);

        platform.clear_mutations();
        let second = reconciler.reconcile(&links, &snapshot).await;
        assert_eq!(second.mutations(), 0);
        assert!(platform.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_at_most_one_rank_role() {
        let (platform, reconciler) = setup();
        let layout = RoleLayout::default();
        let cases = [
            (Some(ClanRole::Leader), Some("Leader")),
            (Some(ClanRole::CoLeader), Some("Co-Leader")),
            (Some(ClanRole::Admin), Some("Elder")),
            (Some(ClanRole::Member), None),
        ];

        let mut links = Vec::new();
        let mut snapshot = Vec::new();
        for (i, (role, _)) in cases.iter().enumerate() {
            let user = UserId::new(i as u64 + 1);
            platform.add_member(user, "m");
            for rank in ["Leader", "Co-Leader", "Elder"] {
                platform.grant(user, rank);
            }
            let tag = format!("#R{}", i);
            snapshot.push(player(&tag, "m", 12, 2000, *role));
            links.push(link(i as u64 + 1, &tag, "m"));
        }

        reconciler.reconcile(&links, &snapshot).await;

        for (i, (_, expected)) in cases.iter().enumerate() {
            let ranks: Vec<String> = platform
                .role_names_of(UserId::new(i as u64 + 1))
                .into_iter()
                .filter(|n| layout.is_rank_role(n))
                .collect();
            match expected {
                Some(rank) => assert_eq!(ranks, vec![rank.to_string()]),
                None => assert!(ranks.is_empty()),
            }
        }
    }

    #[tokio::test]
    async fn test_missing_snapshot_never_strips() {
        let (platform, reconciler) = setup();
        let user = UserId::new(5);
        platform.add_member(user, "gone");
        platform.grant(user, "Verified");
        platform.grant(user, "TH15");

        // Transient empty roster
        let summary = reconciler.reconcile(&[link(5, "#GONE", "Gone")], &[]).await;

        assert_eq!(summary.skipped_no_snapshot, 1);
        assert_eq!(summary.roles_removed, 0);
        assert_eq!(platform.role_names_of(user), names(&["TH15", "Verified"]));
    }

    #[tokio::test]
    async fn test_below_threshold_has_no_town_hall_role() {
        let (platform, reconciler) = setup();
        let user = UserId::new(6);
        platform.add_member(user, "low");
        platform.grant(user, "TH9");

        let snapshot = vec![player("#LOW", "Low", 8, 500, Some(ClanRole::Member))];
        reconciler.reconcile(&[link(6, "#LOW", "Low")], &snapshot).await;

        assert!(!platform
            .role_names_of(user)
            .iter()
            .any(|n| n.starts_with("TH")));
    }

    #[tokio::test]
    async fn test_permission_failure_does_not_block_other_roles() {
        let (platform, reconciler) = setup();
        let user = UserId::new(7);
        platform.add_member(user, "ash");
        platform.add_role("TH14");
        platform.guild.lock().protected_roles.push("TH14".to_string());

        let snapshot = vec![player("#ABC123", "Ash", 14, 3200, Some(ClanRole::Admin))];
        let summary = reconciler
            .reconcile(&[link(7, "#ABC123", "Ash")], &snapshot)
            .await;

        assert_eq!(summary.failures, 1);
        assert_eq!(
            platform.role_names_of(user),
            names(&["Elder", "Trophies: 3200", "Verified"])
        );
    }

    #[tokio::test]
    async fn test_member_outside_guild_is_skipped() {
        let (_platform, reconciler) = setup();
        let snapshot = vec![player("#ABC123", "Ash", 14, 3200, None)];
        let summary = reconciler
            .reconcile(&[link(99, "#ABC123", "Ash")], &snapshot)
            .await;
        assert_eq!(summary.skipped_not_in_guild, 1);
        assert_eq!(summary.mutations(), 0);
    }

    #[tokio::test]
    async fn test_strip_managed_roles_keeps_others() {
        let (platform, reconciler) = setup();
        let user = UserId::new(8);
        platform.add_member(user, "ash");
        for role in ["Verified", "Elder", "TH14", "Friends"] {
            platform.grant(user, role);
        }

        let summary = reconciler.strip_managed_roles(user).await.unwrap();
        assert_eq!(summary.roles_removed, 3);
        assert_eq!(platform.role_names_of(user), names(&["Friends"]));
    }
}

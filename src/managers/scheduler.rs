use poise::serenity_prelude::ChannelId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::reconciler::{ReconcileSummary, SharedReconciler};
use super::war_tracker::SharedWarTracker;
use crate::game::SharedGameProvider;
use crate::platform::SharedPlatform;
use crate::state::{SharedLinkStore, SharedSnapshotCache, SharedSyncGate};

/// What one heartbeat did
#[derive(Debug, Default)]
pub struct TickReport {
    pub roster_refreshed: bool,

    /// `None` when reconciliation was paused
    pub reconcile: Option<ReconcileSummary>,

    pub war_reports_posted: usize,
}

/// Heartbeat: refresh the roster, reconcile roles, track wars
pub struct Scheduler {
    game: SharedGameProvider,
    platform: SharedPlatform,
    links: SharedLinkStore,
    snapshot: SharedSnapshotCache,
    reconciler: SharedReconciler,
    war_tracker: SharedWarTracker,
    sync_gate: SharedSyncGate,
    clan_tag: String,
    interval: Duration,
    war_channel: Option<ChannelId>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        game: SharedGameProvider,
        platform: SharedPlatform,
        links: SharedLinkStore,
        snapshot: SharedSnapshotCache,
        reconciler: SharedReconciler,
        war_tracker: SharedWarTracker,
        sync_gate: SharedSyncGate,
        clan_tag: &str,
        interval: Duration,
        war_channel: Option<ChannelId>,
    ) -> Self {
        Self {
            game,
            platform,
            links,
            snapshot,
            reconciler,
            war_tracker,
            sync_gate,
            clan_tag: clan_tag.to_string(),
            interval,
            war_channel,
        }
    }

    /// Run forever. The first tick fires immediately.
    pub async fn run(self: Arc<Self>) {
        info!("Scheduler started, ticking every {:?}", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let report = self.tick().await;
            debug!("Scheduler tick finished: {:?}", report);
        }
    }

    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        match self.game.clan_members(&self.clan_tag).await {
            Ok(members) => {
                debug!("Roster refreshed with {} members", members.len());
                self.snapshot.write().await.replace_members(members);
                report.roster_refreshed = true;
            }
            Err(e) => warn!("Roster refresh failed, keeping previous snapshot: {}", e),
        }

        report.reconcile = self.reconcile_all().await;

        for war_report in self.war_tracker.tick().await {
            let Some(channel_id) = self.war_channel else {
                info!("War ended: {}", war_report.format());
                continue;
            };
            match self
                .platform
                .send_message(channel_id, &war_report.format())
                .await
            {
                Ok(()) => report.war_reports_posted += 1,
                Err(e) => error!("Failed to post war report: {}", e),
            }
        }

        report
    }

    /// Full reconcile pass unless a verification commit holds the gate
    pub async fn reconcile_all(&self) -> Option<ReconcileSummary> {
        if self.sync_gate.is_paused() {
            info!("Role sync paused by a verification commit, skipping this tick");
            return None;
        }

        let links = self.links.read().await.list_links();
        let snapshot = self.snapshot.read().await.members().to_vec();
        if snapshot.is_empty() {
            warn!("No roster snapshot yet, skipping role sync");
            return None;
        }
        Some(self.reconciler.reconcile(&links, &snapshot).await)
    }
}

/// Shared scheduler type
pub type SharedScheduler = Arc<Scheduler>;

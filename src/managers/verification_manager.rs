use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, UserId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::choice::{ChoiceOutcome, ChoicePrompter};
use super::reconciler::SharedReconciler;
use super::role_manager::SharedRoleManager;
use crate::config::{BotConfig, RoleLayout};
use crate::error::{BotError, Result};
use crate::game::{
    choose_distinguishing_item, is_equipped, DistinguishingItem, PlayerSnapshot,
    SharedGameProvider,
};
use crate::platform::SharedPlatform;
use crate::state::{Link, LinkSource, SharedLinkStore, SharedSnapshotCache, SharedSyncGate};

/// Name searches matching more accounts than this are rejected outright
pub const MAX_CHOICES: usize = 3;

/// Timing and destinations for verification sessions
#[derive(Debug, Clone)]
pub struct VerificationSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub choice_timeout: Duration,

    /// Delay between the success notice and deleting the private channel
    pub channel_grace: Duration,

    pub welcome_channel: Option<ChannelId>,
}

impl VerificationSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            poll_interval: config.intervals.verification_poll(),
            timeout: config.intervals.verification_timeout(),
            choice_timeout: config.intervals.choice_timeout(),
            channel_grace: config.intervals.channel_grace(),
            welcome_channel: config.welcome_channel(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCandidateItemSelection,
    AwaitingItemEquip,
    Verified,
    Expired,
    Aborted,
}

/// One user's attempt to prove they own a game account
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub game_tag: String,
    pub game_name: String,
    pub channel_id: Option<ChannelId>,
    pub item: Option<DistinguishingItem>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,

    /// Fixed when the session is created
    pub expires_at: DateTime<Utc>,
}

impl VerificationSession {
    fn new(user_id: UserId, candidate: &PlayerSnapshot, timeout: Duration) -> Self {
        let created_at = Utc::now();
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero());
        Self {
            id: Uuid::new_v4(),
            user_id,
            game_tag: candidate.tag.clone(),
            game_name: candidate.name.clone(),
            channel_id: None,
            item: None,
            state: SessionState::AwaitingCandidateItemSelection,
            created_at,
            expires_at: created_at + timeout,
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    Verified,
    Wait,
    Expired,
}

/// Decide what one poll means for the session. A missing `latest` is a
/// failed fetch. An observed equip counts even if it lands past the deadline.
pub fn evaluate_poll(
    session: &VerificationSession,
    latest: Option<&PlayerSnapshot>,
    now: DateTime<Utc>,
) -> PollAction {
    if let (Some(player), Some(item)) = (latest, session.item.as_ref()) {
        if is_equipped(player, item) {
            return PollAction::Verified;
        }
    }
    if now >= session.expires_at {
        PollAction::Expired
    } else {
        PollAction::Wait
    }
}

/// Candidates found for a search
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Single(PlayerSnapshot),
    Choose(Vec<PlayerSnapshot>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    UserRequested,
    MemberLeft,
    Administrative,
    /// Someone else linked the account while the session was open
    TagTaken,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::UserRequested => write!(f, "cancelled by the user"),
            CancelReason::MemberLeft => write!(f, "the member left the server"),
            CancelReason::Administrative => write!(f, "cancelled by an administrator"),
            CancelReason::TagTaken => write!(f, "the account was linked to someone else"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Verified(Link),
    Expired,
    Aborted(CancelReason),
}

struct ActiveSession {
    session: VerificationSession,
    cancel: watch::Sender<Option<CancelReason>>,
}

/// A started session and the task polling it
pub struct VerificationHandle {
    pub session: VerificationSession,
    pub task: JoinHandle<SessionOutcome>,
}

/// Runs verification sessions, one per user
pub struct VerificationManager {
    game: SharedGameProvider,
    platform: SharedPlatform,
    links: SharedLinkStore,
    snapshot: SharedSnapshotCache,
    role_manager: SharedRoleManager,
    reconciler: SharedReconciler,
    sync_gate: SharedSyncGate,
    layout: RoleLayout,
    settings: VerificationSettings,

    /// Open sessions (user_id -> session). Only the polling task removes
    /// its own entry.
    sessions: DashMap<UserId, ActiveSession>,
}

impl VerificationManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        game: SharedGameProvider,
        platform: SharedPlatform,
        links: SharedLinkStore,
        snapshot: SharedSnapshotCache,
        role_manager: SharedRoleManager,
        reconciler: SharedReconciler,
        sync_gate: SharedSyncGate,
        settings: VerificationSettings,
    ) -> Self {
        let layout = reconciler.layout().clone();
        Self {
            game,
            platform,
            links,
            snapshot,
            role_manager,
            reconciler,
            sync_gate,
            layout,
            settings,
            sessions: DashMap::new(),
        }
    }

    pub fn is_pending(&self, user_id: UserId) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn session(&self, user_id: UserId) -> Option<VerificationSession> {
        self.sessions.get(&user_id).map(|a| a.session.clone())
    }

    pub fn active_sessions(&self) -> Vec<VerificationSession> {
        self.sessions.iter().map(|a| a.session.clone()).collect()
    }

    /// Look the query up in the cached roster
    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let mut matches = self.snapshot.read().await.search(query);
        match matches.len() {
            0 => Err(BotError::NotFound {
                query: query.to_string(),
            }),
            1 => Ok(SearchOutcome::Single(matches.remove(0))),
            n if n <= MAX_CHOICES => Ok(SearchOutcome::Choose(matches)),
            n => Err(BotError::AmbiguousTooMany {
                query: query.to_string(),
                count: n,
            }),
        }
    }

    /// Identify the account, open the session and start polling
    pub async fn begin_verification(
        self: &Arc<Self>,
        user_id: UserId,
        query: &str,
        prompter: &dyn ChoicePrompter,
    ) -> Result<VerificationHandle> {
        self.ensure_not_pending(user_id).await?;

        let candidate = match self.search(query).await? {
            SearchOutcome::Single(player) => player,
            SearchOutcome::Choose(candidates) => {
                let options: Vec<String> = candidates.iter().map(describe_candidate).collect();
                match prompter
                    .choose(user_id, &options, self.settings.choice_timeout)
                    .await
                {
                    ChoiceOutcome::Selected(index) => candidates
                        .into_iter()
                        .nth(index)
                        .ok_or_else(|| BotError::Aborted {
                            reason: "invalid selection".to_string(),
                        })?,
                    ChoiceOutcome::TimedOut => {
                        return Err(BotError::Aborted {
                            reason: "no account was selected in time".to_string(),
                        })
                    }
                    ChoiceOutcome::Cancelled => {
                        return Err(BotError::Aborted {
                            reason: "selection cancelled".to_string(),
                        })
                    }
                }
            }
        };

        if let Some(existing) = self.links.read().await.find_by_tag(&candidate.tag) {
            if existing.discord_id != user_id.to_string() {
                return Err(BotError::TagAlreadyLinked {
                    tag: candidate.tag.clone(),
                });
            }
        }

        let mut session = VerificationSession::new(user_id, &candidate, self.settings.timeout);
        let (cancel_tx, cancel_rx) = watch::channel(None);
        match self.sessions.entry(user_id) {
            Entry::Occupied(_) => {
                return Err(BotError::VerificationPending {
                    discord_id: user_id.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(ActiveSession {
                    session: session.clone(),
                    cancel: cancel_tx,
                });
            }
        }

        if let Err(e) = self.prepare(&mut session).await {
            warn!(
                "Verification setup for {} ({}) failed: {}",
                user_id, session.game_tag, e
            );
            self.cleanup(&session).await;
            self.unregister(&session);
            return Err(e);
        }

        info!(
            "Verification session {} started for {} as {} ({})",
            session.id, user_id, session.game_name, session.game_tag
        );
        let task = tokio::spawn(self.clone().run_session(session.clone(), cancel_rx));
        Ok(VerificationHandle { session, task })
    }

    /// Signal an open session to stop. The polling task does the cleanup.
    pub fn cancel(&self, user_id: UserId, reason: CancelReason) -> bool {
        match self.sessions.get(&user_id) {
            Some(active) => {
                debug!("Cancelling verification for {}: {}", user_id, reason);
                active.cancel.send(Some(reason)).is_ok()
            }
            None => false,
        }
    }

    async fn ensure_not_pending(&self, user_id: UserId) -> Result<()> {
        let pending = self.is_pending(user_id)
            || self
                .role_manager
                .member_has_role(user_id, &self.layout.pending_role)
                .await?;
        if pending {
            return Err(BotError::VerificationPending {
                discord_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// Pending role, private channel, challenge item and instructions
    async fn prepare(&self, session: &mut VerificationSession) -> Result<()> {
        if let Err(e) = self
            .role_manager
            .assign_role_to_user(session.user_id, &self.layout.pending_role)
            .await
        {
            warn!("Could not grant pending role to {}: {}", session.user_id, e);
        }

        let channel_id = self
            .platform
            .create_private_channel(session.user_id, &channel_name(&session.game_name))
            .await?;
        session.channel_id = Some(channel_id);
        self.update_registry(session);

        let player = self.game.player(&session.game_tag).await?;
        let item = {
            let mut rng = rand::thread_rng();
            choose_distinguishing_item(&player, &mut rng)
        }
        .ok_or_else(|| BotError::NoEligibleEquipment {
            tag: session.game_tag.clone(),
        })?;

        let instructions = format!(
            "Hi <@{}>! To prove you own **{}** (`{}`), equip **{}** on your **{}** in game.\n\
             I check every {} and this session ends <t:{}:R>.",
            session.user_id,
            session.game_name,
            session.game_tag,
            item.name,
            item.hero.api_name(),
            format_duration(self.settings.poll_interval),
            session.expires_at.timestamp()
        );
        session.item = Some(item);
        session.state = SessionState::AwaitingItemEquip;
        self.update_registry(session);

        if let Err(e) = self.platform.send_message(channel_id, &instructions).await {
            warn!("Failed to post verification instructions: {}", e);
        }
        Ok(())
    }

    async fn run_session(
        self: Arc<Self>,
        session: VerificationSession,
        mut cancel_rx: watch::Receiver<Option<CancelReason>>,
    ) -> SessionOutcome {
        loop {
            let wait = session
                .remaining(Utc::now())
                .min(self.settings.poll_interval);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = cancel_rx.changed() => {
                    let reason = match changed {
                        Ok(()) => (*cancel_rx.borrow()).unwrap_or(CancelReason::Administrative),
                        Err(_) => CancelReason::Administrative,
                    };
                    return self.abort(session, reason).await;
                }
            }

            let latest = match self.game.player(&session.game_tag).await {
                Ok(player) => Some(player),
                Err(e) => {
                    warn!(
                        "Verification poll for {} failed, retrying: {}",
                        session.game_tag, e
                    );
                    None
                }
            };

            match (evaluate_poll(&session, latest.as_ref(), Utc::now()), latest) {
                (PollAction::Verified, Some(player)) => return self.commit(session, player).await,
                (PollAction::Expired, _) => return self.expire(session).await,
                (_, Some(_)) => self.post_waiting_notice(&session).await,
                (_, None) => {}
            }
        }
    }

    async fn post_waiting_notice(&self, session: &VerificationSession) {
        let (Some(channel_id), Some(item)) = (session.channel_id, session.item.as_ref()) else {
            return;
        };
        let notice = format!(
            "Not yet: **{}** is not equipped on your **{}**. Checking again in {}.",
            item.name,
            item.hero.api_name(),
            format_duration(
                session
                    .remaining(Utc::now())
                    .min(self.settings.poll_interval)
            )
        );
        if let Err(e) = self.platform.send_message(channel_id, &notice).await {
            debug!("Failed to post waiting notice: {}", e);
        }
    }

    async fn commit(
        &self,
        mut session: VerificationSession,
        player: PlayerSnapshot,
    ) -> SessionOutcome {
        let user_id = session.user_id;
        let link = Link::new(user_id, &player.tag, &player.name, LinkSource::Verification);

        let _pause = self.sync_gate.pause();
        {
            let mut store = self.links.write().await;
            let holder = store
                .find_by_tag(&link.game_tag)
                .filter(|existing| existing.discord_id != link.discord_id)
                .map(|existing| existing.discord_id.clone());
            if let Some(holder) = holder {
                drop(store);
                warn!(
                    "{} was linked to {} while {} was verifying",
                    link.game_tag, holder, user_id
                );
                return self.abort(session, CancelReason::TagTaken).await;
            }
            store.put_link(link.clone());
            if let Err(e) = store.persist().await {
                error!("Failed to persist link for {}: {}", user_id, e);
            }
        }

        session.state = SessionState::Verified;
        self.update_registry(&session);
        info!("{} verified as {} ({})", user_id, player.name, player.tag);

        if let Err(e) = self.platform.set_nickname(user_id, &player.name).await {
            warn!("Could not rename {} to {}: {}", user_id, player.name, e);
        }
        if let Err(e) = self
            .role_manager
            .assign_role_to_user(user_id, &self.layout.verified_role)
            .await
        {
            warn!("Could not grant verified role to {}: {}", user_id, e);
        }
        match self.reconciler.reconcile_member(&link, &player).await {
            Ok(summary) => debug!("Post-verification sync: {}", summary.format()),
            Err(e) => warn!("Post-verification sync for {} failed: {}", user_id, e),
        }

        if let Some(channel_id) = session.channel_id {
            let notice = format!(
                "Verified! You are now linked to **{}** (`{}`). This channel closes shortly.",
                player.name, player.tag
            );
            if let Err(e) = self.platform.send_message(channel_id, &notice).await {
                debug!("Failed to post success notice: {}", e);
            }
        }
        if let Some(welcome) = self.settings.welcome_channel {
            let message = format!(
                "Welcome <@{}>, verified as **{}** (`{}`)!",
                user_id, player.name, player.tag
            );
            if let Err(e) = self.platform.send_message(welcome, &message).await {
                warn!("Failed to post welcome message: {}", e);
            }
        }

        tokio::time::sleep(self.settings.channel_grace).await;
        self.cleanup(&session).await;
        self.unregister(&session);
        SessionOutcome::Verified(link)
    }

    async fn expire(&self, mut session: VerificationSession) -> SessionOutcome {
        session.state = SessionState::Expired;
        self.update_registry(&session);
        let error = BotError::Expired {
            tag: session.game_tag.clone(),
        };
        info!("{} (user {})", error, session.user_id);

        self.cleanup(&session).await;
        let notice = format!(
            "Your verification for **{}** (`{}`) expired before the item was equipped. \
             Run /verify again to retry.",
            session.game_name, session.game_tag
        );
        if let Err(e) = self
            .platform
            .send_direct_message(session.user_id, &notice)
            .await
        {
            debug!("Could not DM {}: {}", session.user_id, e);
        }
        self.unregister(&session);
        SessionOutcome::Expired
    }

    async fn abort(&self, mut session: VerificationSession, reason: CancelReason) -> SessionOutcome {
        session.state = SessionState::Aborted;
        self.update_registry(&session);
        info!(
            "Verification for {} as {} aborted: {}",
            session.user_id, session.game_tag, reason
        );

        self.cleanup(&session).await;
        if reason != CancelReason::MemberLeft {
            let notice = format!(
                "Your verification for **{}** was stopped: {}.",
                session.game_name, reason
            );
            if let Err(e) = self
                .platform
                .send_direct_message(session.user_id, &notice)
                .await
            {
                debug!("Could not DM {}: {}", session.user_id, e);
            }
        }
        self.unregister(&session);
        SessionOutcome::Aborted(reason)
    }

    /// Best-effort: delete the private channel and drop the pending role
    async fn cleanup(&self, session: &VerificationSession) {
        if let Some(channel_id) = session.channel_id {
            if let Err(e) = self.platform.delete_channel(channel_id).await {
                warn!("Failed to delete verification channel {}: {}", channel_id, e);
            }
        }
        if let Err(e) = self
            .role_manager
            .remove_role_from_user(session.user_id, &self.layout.pending_role)
            .await
        {
            debug!("Could not remove pending role from {}: {}", session.user_id, e);
        }
    }

    fn update_registry(&self, session: &VerificationSession) {
        if let Some(mut active) = self.sessions.get_mut(&session.user_id) {
            if active.session.id == session.id {
                active.session = session.clone();
            }
        }
    }

    fn unregister(&self, session: &VerificationSession) {
        self.sessions
            .remove_if(&session.user_id, |_, active| active.session.id == session.id);
    }
}

fn describe_candidate(player: &PlayerSnapshot) -> String {
    format!(
        "{} ({}), TH{}, {} trophies",
        player.name, player.tag, player.town_hall_level, player.trophies
    )
}

/// Channel names are lowercase with dashes
fn channel_name(game_name: &str) -> String {
    let slug: String = game_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "verify".to_string()
    } else {
        format!("verify-{}", slug)
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{} min", secs / 60)
    } else {
        format!("{} s", secs)
    }
}

/// Shared verification manager type
pub type SharedVerificationManager = Arc<VerificationManager>;

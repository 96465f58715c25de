//! Game-side data: API payload types, hero equipment rules and the
//! provider abstraction the rest of the bot fetches through.

pub mod client;
pub mod equipment;
pub mod provider;
pub mod types;

pub use client::ClashClient;
pub use equipment::{choose_distinguishing_item, is_equipped, DistinguishingItem, HeroKind};
pub use provider::{GameDataProvider, SharedGameProvider};
pub use types::{
    normalize_tag, ClanRole, Equipment, Hero, League, LeagueGroup, LeagueGroupState, LeagueRound,
    PlayerSnapshot, WarAttack, WarClan, WarDetail, WarMember, WarState, PLACEHOLDER_WAR_TAG,
};

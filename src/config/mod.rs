pub mod bot_config;
pub mod role_layout;

pub use bot_config::{BotConfig, Intervals};
pub use role_layout::RoleLayout;

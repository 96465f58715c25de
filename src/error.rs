use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Failed to load config file '{path}': {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // State errors
    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Game API errors
    #[error("Game API unavailable: {message}")]
    Unavailable { message: String },

    // Verification errors
    #[error("No clan member matches '{query}'")]
    NotFound { query: String },

    #[error("'{query}' matches {count} clan members, please use your exact player tag")]
    AmbiguousTooMany { query: String, count: usize },

    #[error("Player {tag} has no hero equipment that can be used for verification")]
    NoEligibleEquipment { tag: String },

    #[error("Verification already in progress for user: {discord_id}")]
    VerificationPending { discord_id: String },

    #[error("Player {tag} is already linked to another account")]
    TagAlreadyLinked { tag: String },

    #[error("Verification for {tag} expired")]
    Expired { tag: String },

    #[error("Verification aborted: {reason}")]
    Aborted { reason: String },

    #[error("Inconsistent state: {message}")]
    Inconsistent { message: String },

    // Discord errors
    #[error("Discord API error: {message}")]
    Discord { message: String },

    #[error("Role not found: {name}")]
    RoleNotFound { name: String },

    #[error("Member not found: {user_id}")]
    MemberNotFound { user_id: String },

    // Permission errors
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    /// Errors that clear up on their own and should be retried on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Unavailable { .. })
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        let message = err.to_string();
        if message.contains("Missing Permissions") || message.contains("50013") {
            BotError::PermissionDenied { message }
        } else {
            BotError::Discord { message }
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::Unavailable {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

use poise::serenity_prelude as serenity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BotError::Unavailable {
            message: "timeout".to_string()
        }
        .is_transient());
        assert!(!BotError::PermissionDenied {
            message: "nope".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_ambiguous_message_mentions_tag() {
        let err = BotError::AmbiguousTooMany {
            query: "ash".to_string(),
            count: 4,
        };
        assert!(err.to_string().contains("exact player tag"));
    }
}

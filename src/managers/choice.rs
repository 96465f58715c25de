use async_trait::async_trait;
use poise::serenity_prelude::UserId;
use std::time::Duration;

/// Result of asking a user to pick one of a few options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceOutcome {
    /// Index into the offered options
    Selected(usize),
    TimedOut,
    Cancelled,
}

/// Presents a bounded choice to one user and waits for the answer.
///
/// Only `user_id` may answer; implementations return `TimedOut` once
/// `timeout` elapses without a selection.
#[async_trait]
pub trait ChoicePrompter: Send + Sync {
    async fn choose(&self, user_id: UserId, options: &[String], timeout: Duration)
        -> ChoiceOutcome;
}

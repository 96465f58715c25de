use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::BotError;
use crate::managers::{CancelReason, ChoiceOutcome, ChoicePrompter};
use crate::{Context, Error};

const CHOICE_PREFIX: &str = "verify_choice_";
const CHOICE_CANCEL: &str = "verify_choice_cancel";

/// Asks the command author to pick an account with buttons
pub struct ButtonPrompter<'a> {
    ctx: Context<'a>,
}

impl<'a> ButtonPrompter<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl<'a> ChoicePrompter for ButtonPrompter<'a> {
    async fn choose(
        &self,
        user_id: serenity::UserId,
        options: &[String],
        timeout: Duration,
    ) -> ChoiceOutcome {
        let mut content = String::from("Several clan members match that name. Which one is you?\n");
        let mut buttons = Vec::new();
        for (i, option) in options.iter().enumerate() {
            content.push_str(&format!("**{}.** {}\n", i + 1, option));
            buttons.push(
                serenity::CreateButton::new(format!("{}{}", CHOICE_PREFIX, i))
                    .label(format!("{}", i + 1))
                    .style(serenity::ButtonStyle::Primary),
            );
        }
        buttons.push(
            serenity::CreateButton::new(CHOICE_CANCEL)
                .label("Cancel")
                .style(serenity::ButtonStyle::Secondary),
        );

        let reply = match self
            .ctx
            .send(
                poise::CreateReply::default()
                    .content(content)
                    .components(vec![serenity::CreateActionRow::Buttons(buttons)])
                    .ephemeral(true),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Failed to send account choice: {}", e);
                return ChoiceOutcome::Cancelled;
            }
        };
        let message = match reply.message().await {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to read account choice message: {}", e);
                return ChoiceOutcome::Cancelled;
            }
        };

        let Some(interaction) = message
            .await_component_interaction(self.ctx.serenity_context().shard.clone())
            .author_id(user_id)
            .timeout(timeout)
            .await
        else {
            return ChoiceOutcome::TimedOut;
        };

        if let Err(e) = interaction
            .create_response(
                self.ctx.http(),
                serenity::CreateInteractionResponse::UpdateMessage(
                    serenity::CreateInteractionResponseMessage::new()
                        .content("Got it.")
                        .components(vec![]),
                ),
            )
            .await
        {
            warn!("Failed to acknowledge account choice: {}", e);
        }

        parse_choice(&interaction.data.custom_id, options.len())
    }
}

fn parse_choice(custom_id: &str, option_count: usize) -> ChoiceOutcome {
    if custom_id == CHOICE_CANCEL {
        return ChoiceOutcome::Cancelled;
    }
    custom_id
        .strip_prefix(CHOICE_PREFIX)
        .and_then(|index| index.parse::<usize>().ok())
        .filter(|index| *index < option_count)
        .map(ChoiceOutcome::Selected)
        .unwrap_or(ChoiceOutcome::Cancelled)
}

/// What to tell the user when verification cannot start
pub fn verification_error_message(error: &BotError) -> String {
    match error {
        BotError::NotFound { query } => format!(
            "No clan member matches `{}`. Check the spelling or use your player tag (e.g. `#ABC123`).",
            query
        ),
        BotError::AmbiguousTooMany { query, count } => format!(
            "{} clan members are named `{}`. Run `/verify` again with your player tag instead.",
            count, query
        ),
        BotError::NoEligibleEquipment { .. } => "That account has no hero equipment I can use \
            for verification. You need an upgraded (level 2+) equipment piece that is not \
            currently equipped."
            .to_string(),
        BotError::VerificationPending { .. } => "You already have a verification in progress. \
            Use `/cancel-verification` to stop it."
            .to_string(),
        BotError::TagAlreadyLinked { tag } => format!(
            "`{}` is already linked to another member. Ask a leader if this is wrong.",
            tag
        ),
        BotError::Aborted { reason } => format!("Verification cancelled: {}.", reason),
        e if e.is_transient() => {
            "The game API is not responding right now. Try again in a few minutes.".to_string()
        }
        e => format!("Verification could not start: {}", e),
    }
}

/// Link your Discord account to your clan account
///
/// You will be asked to equip a specific hero equipment piece in game to prove
/// the account is yours.
#[poise::command(slash_command, guild_only)]
pub async fn verify(
    ctx: Context<'_>,
    #[description = "Your in-game name or player tag"] account: String,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let user_id = ctx.author().id;

    let existing = ctx.data().links.read().await.get_link(user_id).cloned();
    if let Some(link) = existing {
        ctx.send(
            poise::CreateReply::default()
                .content(format!(
                    "You are already linked to **{}** (`{}`).",
                    link.game_name, link.game_tag
                ))
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let prompter = ButtonPrompter::new(ctx);
    let result = ctx
        .data()
        .verification_manager
        .begin_verification(user_id, &account, &prompter)
        .await;

    let content = match result {
        Ok(handle) => {
            info!(
                "{} started verification for {}",
                ctx.author().name,
                handle.session.game_tag
            );
            let place = handle
                .session
                .channel_id
                .map(|c| format!("<#{}>", c))
                .unwrap_or_else(|| "your private channel".to_string());
            let content = format!(
                "Verification started for **{}** (`{}`). Head to {} for instructions.",
                handle.session.game_name, handle.session.game_tag, place
            );
            let session_id = handle.session.id;
            tokio::spawn(async move {
                match handle.task.await {
                    Ok(outcome) => debug!("Session {} finished: {:?}", session_id, outcome),
                    Err(e) => error!("Session {} task failed: {}", session_id, e),
                }
            });
            content
        }
        Err(e) => {
            info!("Verification for {} not started: {}", ctx.author().name, e);
            verification_error_message(&e)
        }
    };

    ctx.send(poise::CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Stop your verification in progress
#[poise::command(slash_command, guild_only, rename = "cancel-verification")]
pub async fn cancel_verification(ctx: Context<'_>) -> Result<(), Error> {
    let manager = &ctx.data().verification_manager;
    let content = match manager.session(ctx.author().id) {
        Some(session) if manager.cancel(ctx.author().id, CancelReason::UserRequested) => format!(
            "Verification for **{}** cancelled. Your private channel will be removed.",
            session.game_name
        ),
        _ => "You have no verification in progress.".to_string(),
    };
    ctx.send(poise::CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("verify_choice_1", 3), ChoiceOutcome::Selected(1));
        assert_eq!(parse_choice("verify_choice_cancel", 3), ChoiceOutcome::Cancelled);
        assert_eq!(parse_choice("verify_choice_3", 3), ChoiceOutcome::Cancelled);
        assert_eq!(parse_choice("other", 3), ChoiceOutcome::Cancelled);
    }

    #[test]
    fn test_error_messages() {
        let too_many = verification_error_message(&BotError::AmbiguousTooMany {
            query: "Dup".to_string(),
            count: 4,
        });
        assert!(too_many.contains("player tag"));

        let offline = verification_error_message(&BotError::Unavailable {
            message: "timeout".to_string(),
        });
        assert!(offline.contains("Try again"));
    }
}

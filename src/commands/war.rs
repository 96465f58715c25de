use crate::{Context, Error};

/// Members who still owe attacks in the current war
#[poise::command(slash_command, guild_only, rename = "missing-attacks")]
pub async fn missing_attacks(ctx: Context<'_>) -> Result<(), Error> {
    let reports = ctx.data().war_tracker.cached_reports().await;
    let content = if reports.is_empty() {
        "No war data yet. The clan may not be in a war, or the first refresh has not run."
            .to_string()
    } else {
        reports
            .iter()
            .map(|report| report.format())
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    ctx.say(content).await?;
    Ok(())
}

/// Clan War League tracking status
#[poise::command(slash_command, guild_only, rename = "cwl-status")]
pub async fn cwl_status(ctx: Context<'_>) -> Result<(), Error> {
    let tracker = &ctx.data().war_tracker;
    let state = tracker.state();

    let mut content = if state.cwl_active {
        format!(
            "Clan War League in progress, tracking round **{}**.",
            state.current_round_index + 1
        )
    } else {
        "The clan is not in an active Clan War League.".to_string()
    };

    if state.cwl_active {
        if let Some(report) = tracker
            .cached_reports()
            .await
            .into_iter()
            .find(|report| report.league)
        {
            content.push_str("\n\n");
            content.push_str(&report.format());
        }
    }

    ctx.say(content).await?;
    Ok(())
}

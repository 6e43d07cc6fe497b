//! Latency check.

use std::time::{Duration, Instant};

use poise::serenity_prelude as serenity;
use poise::CreateReply;
use serenity::{Colour, CreateEmbed};

use crate::utils::{requested_by, Context, Error, INFO};

/// Green under 150 ms, yellow under 300 ms, red beyond.
pub(crate) fn latency_colour(latency: Duration) -> Colour {
    match latency.as_millis() {
        0..=149 => Colour(0x2ECC71),
        150..=299 => Colour(0xF1C40F),
        _ => Colour(0xE74C3C),
    }
}

/// Checks the bot's latency.
#[poise::command(prefix_command, category = "Utility")]
pub(crate) async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let started = Instant::now();
    let reply = ctx
        .send(
            CreateReply::default().embed(
                CreateEmbed::new()
                    .title("🏓 Pinging...")
                    .colour(INFO),
            ),
        )
        .await?;
    let api = started.elapsed();
    let gateway = ctx.ping().await;

    let gateway_text = if gateway.is_zero() {
        "Not measured yet".to_string()
    } else {
        format!("{} ms", gateway.as_millis())
    };
    let embed = CreateEmbed::new()
        .title("🏓 Pong!")
        .colour(latency_colour(api))
        .field("API Latency", format!("{} ms", api.as_millis()), true)
        .field("Gateway Latency", gateway_text, true)
        .footer(requested_by(ctx.author()));
    reply.edit(ctx, CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_colour() {
        assert_eq!(latency_colour(Duration::from_millis(20)), Colour(0x2ECC71));
        assert_eq!(latency_colour(Duration::from_millis(150)), Colour(0xF1C40F));
        assert_eq!(latency_colour(Duration::from_millis(299)), Colour(0xF1C40F));
        assert_eq!(latency_colour(Duration::from_millis(300)), Colour(0xE74C3C));
    }

    #[test]
    fn test_prefix_only() {
        let command = ping();
        assert!(command.prefix_action.is_some());
        assert!(command.slash_action.is_none());
    }
}

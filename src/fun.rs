//! Gives very real, totally-not-random responses to any yes-or-no question your heart desires,
//! and measures how compatible two people are.

use poise::serenity_prelude as serenity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serenity::{Colour, CreateEmbed, Member};

use crate::utils::{progress_bar, reply_embed, warning, Context, Error, BLURPLE};

const CHOICES: [&str; 20] = [
    "It is certain.",
    "It is decidedly so.",
    "Without a doubt.",
    "Yes, definitely.",
    "You may rely on it.",
    "As I see it, yes.",
    "Most likely.",
    "Outlook good.",
    "Yes.",
    "Signs point to yes.",
    "Reply hazy, try again...",
    "Ask again later...",
    "Better not tell you now!",
    "Cannot predict now...",
    "Concentrate and ask again.",
    "Don't count on it.",
    "My reply is no.",
    "My sources say no.",
    "Outlook not so good.",
    "Very doubtful.",
];

/// Gives very real, totally-not-random responses to any yes-or-no question your heart desires.
#[poise::command(prefix_command, category = "Fun", aliases("8ball"))]
pub(crate) async fn ball(
    ctx: Context<'_>,
    #[description = "The question to ask"]
    #[rest]
    question: Option<String>,
) -> Result<(), Error> {
    let question = match question.filter(|q| !q.trim().is_empty()) {
        Some(q) => q,
        None => {
            reply_embed(ctx, warning("Magic 8-Ball", "You need to ask a question!")).await?;
            return Ok(());
        }
    };

    let choice = CHOICES[rand::thread_rng().gen_range(0..CHOICES.len())];
    let embed = CreateEmbed::new()
        .title("🎱 Magic 8-Ball")
        .colour(BLURPLE)
        .field("Question", question, false)
        .field("Answer", choice, false);
    reply_embed(ctx, embed).await?;
    Ok(())
}

/// The same pair always gets the same score, in either order.
pub(crate) fn love_percentage(a: u64, b: u64) -> u8 {
    let mut rng = StdRng::seed_from_u64(a.wrapping_add(b));
    rng.gen_range(0..=100)
}

/// Remark and colour for a score.
pub(crate) fn love_remark(percent: u8) -> (&'static str, Colour) {
    match percent {
        69 => ("Nice.", Colour(0xFF69B4)),
        0..=10 => ("Not a chance. Maybe stay friends?", Colour(0x808080)),
        11..=30 => ("There's a tiny spark... somewhere.", Colour(0x3498DB)),
        31..=60 => ("Could work with some effort!", Colour(0xF1C40F)),
        61..=80 => ("Now we're talking!", Colour(0xE67E22)),
        81..=99 => ("A match made in heaven!", Colour(0xE91E63)),
        _ => ("Soulmates. Perfect match!", Colour(0xFF0000)),
    }
}

/// 25-cell heart meter.
pub(crate) fn love_meter(percent: u8) -> String {
    progress_bar(f64::from(percent) / 100.0, 25)
}

/// Measures the love between two people.
#[poise::command(prefix_command, guild_only, category = "Fun", aliases("ship"))]
pub(crate) async fn love(
    ctx: Context<'_>,
    #[description = "First person"] first: Option<Member>,
    #[description = "Second person"] second: Option<Member>,
) -> Result<(), Error> {
    let (a, b) = match (first, second) {
        (Some(a), Some(b)) => (a.user, b.user),
        (Some(b), None) => (ctx.author().clone(), b.user),
        _ => {
            reply_embed(
                ctx,
                warning(
                    "Love Calculator",
                    format!("Mention someone! Usage: `{}love @user [@user]`", ctx.prefix()),
                ),
            )
            .await?;
            return Ok(());
        }
    };

    let percent = love_percentage(a.id.get(), b.id.get());
    let (remark, colour) = love_remark(percent);
    let embed = CreateEmbed::new()
        .title("💘 Love Calculator")
        .colour(colour)
        .description(format!(
            "**{}** ❤️ **{}**\n\n**{}%**\n`{}`\n\n{}",
            a.name,
            b.name,
            percent,
            love_meter(percent),
            remark
        ));
    reply_embed(ctx, embed).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_love_is_symmetric_and_stable() {
        let ab = love_percentage(1234, 98765);
        assert_eq!(ab, love_percentage(98765, 1234));
        assert_eq!(ab, love_percentage(1234, 98765));
        // seeded by the sum of both ids
        assert_eq!(ab, love_percentage(1234 + 98765, 0));
        assert_eq!(love_percentage(u64::MAX, 2), love_percentage(1, 0));
        assert!(ab <= 100);
    }

    #[test]
    fn test_love_bands() {
        assert_eq!(love_remark(69).0, "Nice.");
        assert_eq!(love_remark(0).0, love_remark(10).0);
        assert_ne!(love_remark(10).0, love_remark(11).0);
        assert_eq!(love_remark(100).0, "Soulmates. Perfect match!");
    }

    #[test]
    fn test_love_meter() {
        assert_eq!(love_meter(0).chars().count(), 25);
        assert_eq!(love_meter(100), "█".repeat(25));
        assert_eq!(love_meter(50).chars().filter(|c| *c == '█').count(), 13);
    }
}

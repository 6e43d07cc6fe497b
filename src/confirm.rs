//! Confirmation prompts for destructive commands: typed codes and ✅/❌ reactions.

use std::fmt;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use rand::Rng;
use serenity::{Message, ReactionType};

use crate::utils::{Context, Error};

pub(crate) const CONFIRM: &str = "✅";
pub(crate) const CANCEL: &str = "❌";

/// What came of a prompt. Only `Confirmed` may lead to a side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Confirmed,
    /// Wrong code, or ❌.
    Declined,
    TimedOut,
}

/// A random six-digit code the owner must type back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConfirmationCode(u32);

impl ConfirmationCode {
    pub(crate) fn random() -> Self {
        Self(rand::thread_rng().gen_range(100_000..=999_999))
    }

    /// Exact match, ignoring surrounding whitespace.
    pub(crate) fn matches(&self, reply: &str) -> bool {
        reply.trim() == self.0.to_string()
    }

    /// Maps the invoker's reply (or lack of one) to an outcome.
    pub(crate) fn judge(&self, reply: Option<&str>) -> Outcome {
        match reply {
            None => Outcome::TimedOut,
            Some(text) if self.matches(text) => Outcome::Confirmed,
            Some(_) => Outcome::Declined,
        }
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `Some(true)` for ✅, `Some(false)` for ❌, `None` for anything else.
pub(crate) fn verdict(emoji: &ReactionType) -> Option<bool> {
    match emoji {
        ReactionType::Unicode(s) if s == CONFIRM => Some(true),
        ReactionType::Unicode(s) if s == CANCEL => Some(false),
        _ => None,
    }
}

/// Waits for the invoker's next message in this channel and checks it against `code`.
pub(crate) async fn wait_for_code(
    ctx: Context<'_>,
    code: ConfirmationCode,
    timeout: Duration,
) -> Result<Outcome, Error> {
    let reply = ctx
        .channel_id()
        .await_reply(ctx.serenity_context())
        .author_id(ctx.author().id)
        .timeout(timeout)
        .await;
    Ok(code.judge(reply.as_ref().map(|m| m.content.as_str())))
}

/// Adds ✅ and ❌ to `prompt` and waits for the invoker to pick one.
pub(crate) async fn wait_for_reaction(
    ctx: Context<'_>,
    prompt: &Message,
    timeout: Duration,
) -> Result<Outcome, Error> {
    prompt
        .react(ctx, ReactionType::Unicode(CONFIRM.to_string()))
        .await?;
    prompt
        .react(ctx, ReactionType::Unicode(CANCEL.to_string()))
        .await?;

    let reaction = prompt
        .await_reaction(ctx.serenity_context())
        .author_id(ctx.author().id)
        .filter(|r| verdict(&r.emoji).is_some())
        .timeout(timeout)
        .await;

    Ok(match reaction.and_then(|r| verdict(&r.emoji)) {
        Some(true) => Outcome::Confirmed,
        Some(false) => Outcome::Declined,
        None => Outcome::TimedOut,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_six_digits() {
        for _ in 0..200 {
            let code = ConfirmationCode::random();
            assert_eq!(code.to_string().len(), 6);
        }
    }

    #[test]
    fn test_only_exact_code_confirms() {
        let code = ConfirmationCode(482913);
        assert_eq!(code.judge(Some("482913")), Outcome::Confirmed);
        assert_eq!(code.judge(Some("  482913\n")), Outcome::Confirmed);
        assert_eq!(code.judge(Some("482914")), Outcome::Declined);
        assert_eq!(code.judge(Some("482913 please")), Outcome::Declined);
        assert_eq!(code.judge(Some("")), Outcome::Declined);
        assert_eq!(code.judge(None), Outcome::TimedOut);
    }

    #[test]
    fn test_verdict() {
        assert_eq!(verdict(&ReactionType::Unicode("✅".into())), Some(true));
        assert_eq!(verdict(&ReactionType::Unicode("❌".into())), Some(false));
        assert_eq!(verdict(&ReactionType::Unicode("👍".into())), None);
    }
}

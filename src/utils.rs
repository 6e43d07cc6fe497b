//! Utilities: the framework types, the shared state every command sees, and small embed helpers.
use std::fmt::Debug;
use std::time::{Instant, SystemTime};

use poise::serenity_prelude as serenity;
use poise::CreateReply;
use serenity::{Colour, CreateEmbed, CreateEmbedFooter};

use crate::ai::AiClient;
use crate::config::Config;
use crate::eng::words::DailyWord;
use crate::eng::VocabStore;
use crate::moderation::CaseStore;
use crate::modping::ModPingStore;
use crate::music::Music;
use crate::prefix::PrefixStore;

pub(crate) type Error = anyhow::Error;
pub(crate) type Context<'a> = poise::Context<'a, Data, Error>;
pub(crate) type Command = poise::Command<Data, Error>;

/// State shared by every command invocation.
pub(crate) struct Data {
    pub(crate) config: Config,
    pub(crate) started: Instant,
    pub(crate) started_at: SystemTime,
    pub(crate) prefixes: PrefixStore,
    pub(crate) cases: CaseStore,
    pub(crate) vocab: VocabStore,
    pub(crate) modping: ModPingStore,
    /// `None` when no Gemini key is configured.
    pub(crate) ai: Option<AiClient>,
    pub(crate) words: Vec<DailyWord>,
    /// `None` when no Lavalink node is configured.
    pub(crate) music: Option<Music>,
    pub(crate) http: reqwest::Client,
}

pub(crate) const SUCCESS: Colour = Colour(0x2ECC71);
pub(crate) const FAILURE: Colour = Colour(0xE74C3C);
pub(crate) const WARNING: Colour = Colour(0xF39C12);
pub(crate) const INFO: Colour = Colour(0x3498DB);
pub(crate) const BLURPLE: Colour = Colour(0x7289DA);

/// Log errors to the console. Used for actions like sending a message where the fallback is "do nothing".
pub(crate) fn log_err<T, E: Debug>(res: Result<T, E>) {
    if let Err(e) = res {
        tracing::warn!("Errored: {:?}", e);
    }
}

pub(crate) fn embed(title: impl Into<String>, description: impl Into<String>, colour: Colour) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(description)
        .colour(colour)
}

pub(crate) fn success(title: impl Into<String>, description: impl Into<String>) -> CreateEmbed {
    embed(title, description, SUCCESS)
}

pub(crate) fn failure(title: impl Into<String>, description: impl Into<String>) -> CreateEmbed {
    embed(title, description, FAILURE)
}

pub(crate) fn warning(title: impl Into<String>, description: impl Into<String>) -> CreateEmbed {
    embed(title, description, WARNING)
}

pub(crate) fn info(title: impl Into<String>, description: impl Into<String>) -> CreateEmbed {
    embed(title, description, INFO)
}

/// Footer naming whoever asked for the embed.
pub(crate) fn requested_by(user: &serenity::User) -> CreateEmbedFooter {
    CreateEmbedFooter::new(format!("Requested by {}", user.name)).icon_url(user.face())
}

/// Replies with a single embed.
pub(crate) async fn reply_embed<'a>(
    ctx: Context<'a>,
    embed: CreateEmbed,
) -> Result<poise::ReplyHandle<'a>, Error> {
    Ok(ctx.send(CreateReply::default().embed(embed)).await?)
}

/// A fixed-width bar like `███████░░░`, `fraction` clamped to `0..=1`.
pub(crate) fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Whether a serenity error is an HTTP response with the given status.
pub(crate) fn is_http_status(err: &serenity::Error, status: u16) -> bool {
    matches!(
        err,
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == status
    )
}

/// Joins `lines` with newlines, keeping the result within `limit` characters. Lines that don't
/// fit are dropped from the end and counted in a closing `… and N more` line.
pub(crate) fn fit_lines<S: AsRef<str>>(lines: &[S], limit: usize) -> String {
    let joined = lines.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n");
    if joined.chars().count() <= limit {
        return joined;
    }

    // the note is sized for the largest count it could ever show
    let reserve = format!("\n… and {} more", lines.len()).chars().count();
    let mut out = String::new();
    let mut used = 0;
    let mut shown = 0;
    for line in lines {
        let line = line.as_ref();
        let len = line.chars().count() + usize::from(shown > 0);
        if used + len + reserve > limit {
            break;
        }
        if shown > 0 {
            out.push('\n');
        }
        out.push_str(line);
        used += len;
        shown += 1;
    }
    if shown > 0 {
        out.push('\n');
    }
    out.push_str(&format!("… and {} more", lines.len() - shown));
    out
}

/// Drops a trailing `s` so counts read naturally.
pub(crate) fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0, 10), "░░░░░░░░░░");
        assert_eq!(progress_bar(0.5, 10), "█████░░░░░");
        assert_eq!(progress_bar(1.0, 4), "████");
        assert_eq!(progress_bar(3.0, 4), "████");
        assert_eq!(progress_bar(-1.0, 2), "░░");
    }

    #[test]
    fn test_fit_lines_short_list_untouched() {
        let lines = vec!["one".to_string(), "two".to_string()];
        assert_eq!(fit_lines(&lines, 4096), "one\ntwo");
        assert_eq!(fit_lines::<String>(&[], 10), "");
    }

    #[test]
    fn test_fit_lines_long_list_truncated() {
        let lines: Vec<String> = (0..1000).map(|i| format!("• word number {:04}", i)).collect();
        let text = fit_lines(&lines, 4096);
        assert!(text.chars().count() <= 4096);
        assert!(text.starts_with("• word number 0000\n"));

        let kept = text.lines().count() - 1;
        assert!(kept > 0);
        assert!(text.ends_with(&format!("… and {} more", 1000 - kept)));
    }

    #[test]
    fn test_fit_lines_single_oversized_line() {
        let lines = vec!["x".repeat(2000)];
        let text = fit_lines(&lines, 1024);
        assert_eq!(text, "… and 1 more");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "track"), "1 track");
        assert_eq!(plural(3, "track"), "3 tracks");
        assert_eq!(plural(0, "case"), "0 cases");
    }
}

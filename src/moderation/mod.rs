//! Moderation commands. Every action that goes through leaves a case behind, is DMed to the
//! target when possible, and is mirrored to the guild's modlog channel if one is set.

pub(crate) mod cases;

use std::time::Duration;

use poise::serenity_prelude as serenity;
use poise::CreateReply;
use serenity::{
    ArgumentConvert, CreateEmbed, CreateEmbedFooter, CreateMessage, EditMessage, GuildChannel,
    Member, Mentionable, Message, Timestamp, User, UserId,
};
use time::OffsetDateTime;

pub(crate) use cases::{Action, Case, CaseStore, NewCase};

use crate::config::{
    CASE_HISTORY_PREVIEW, EMBED_DESCRIPTION_LIMIT, MAX_TIMEOUT, REACTION_CONFIRM_TIMEOUT,
};
use crate::confirm::{wait_for_reaction, Outcome, CANCEL, CONFIRM};
use crate::error::{denied, invalid, BotError};
use crate::utils::{
    failure, fit_lines, info, is_http_status, reply_embed, success, warning, Context, Error,
};

const NO_REASON: &str = "No reason provided";
/// Numbers at or above this are user ids, below it case ids.
const SNOWFLAKE_FLOOR: u64 = 1_000_000_000_000_000;

fn reason_or_default(reason: Option<String>) -> String {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| NO_REASON.to_string())
}

/// Role positions of the people involved in an action.
#[derive(Debug, Clone, Copy)]
struct Hierarchy {
    target: u16,
    invoker: u16,
    bot: u16,
    invoker_is_owner: bool,
    target_is_owner: bool,
}

impl Hierarchy {
    fn check(&self) -> Result<(), &'static str> {
        if self.target_is_owner {
            Err("You can't moderate the server owner.")
        } else if !self.invoker_is_owner && self.target >= self.invoker {
            Err("You can't moderate someone with an equal or higher role than yours.")
        } else if self.target >= self.bot {
            Err("I can't moderate someone with an equal or higher role than mine.")
        } else {
            Ok(())
        }
    }
}

fn top_role_position(guild: &serenity::Guild, member: &Member) -> u16 {
    member
        .roles
        .iter()
        .filter_map(|r| guild.roles.get(r))
        .map(|r| r.position)
        .max()
        .unwrap_or(0)
}

/// Refuses self-targeting, targeting the bot, and anything the role hierarchy forbids.
async fn guard_target(ctx: Context<'_>, target: &Member) -> Result<(), Error> {
    let bot_id = ctx.cache().current_user().id;
    if target.user.id == ctx.author().id {
        return Err(invalid("You can't moderate yourself."));
    }
    if target.user.id == bot_id {
        return Err(invalid("I can't moderate myself."));
    }

    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let bot = guild_id.member(ctx, bot_id).await?;
    let invoker = ctx
        .author_member()
        .await
        .ok_or_else(|| invalid("Couldn't find you in this server."))?
        .into_owned();

    let hierarchy = {
        let guild = ctx
            .guild()
            .ok_or_else(|| BotError::External("This server isn't cached yet.".into()))?;
        Hierarchy {
            target: top_role_position(&guild, target),
            invoker: top_role_position(&guild, &invoker),
            bot: top_role_position(&guild, &bot),
            invoker_is_owner: guild.owner_id == invoker.user.id,
            target_is_owner: guild.owner_id == target.user.id,
        }
    };
    hierarchy.check().map_err(denied)
}

/// Maps Discord API failures to something a moderator can act on.
fn api_error(e: serenity::Error) -> Error {
    if is_http_status(&e, 403) {
        denied("Discord refused: I'm missing permissions or my role is too low.")
    } else {
        BotError::External(format!("Discord API error: {}", e)).into()
    }
}

fn case_embed(case: &Case) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(format!("Case #{} | {}", case.case_id, case.action))
        .colour(case.action.colour())
        .field("User", format!("<@{}> ({})", case.user_id, case.user_id), true)
        .field("Moderator", format!("<@{}>", case.moderator_id), true)
        .field("Reason", &case.reason, false);
    if let Some(duration) = &case.duration {
        embed = embed.field("Duration", duration, true);
    }
    embed.field("Date", format!("<t:{}:F>", case.created_at), true)
}

async fn record(
    ctx: Context<'_>,
    user: &User,
    action: Action,
    reason: &str,
    duration: Option<&str>,
) -> Result<Case, Error> {
    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let case = ctx
        .data()
        .cases
        .record(&NewCase {
            guild_id,
            user_id: user.id,
            moderator_id: ctx.author().id,
            action,
            reason,
            duration,
        })
        .await?;
    tracing::info!(
        "Case #{} in {}: {} {} by {}",
        case.case_id,
        guild_id,
        user.name,
        action.past_tense(),
        ctx.author().name
    );
    Ok(case)
}

/// Tells the target what happened. They may have DMs closed, which is fine.
async fn notify(ctx: Context<'_>, user: &User, action: Action, reason: &str, extra: Option<String>) {
    let guild_name = ctx
        .guild()
        .map(|g| g.name.clone())
        .unwrap_or_else(|| "a server".to_string());
    let mut description = format!(
        "You were **{}** in **{}**.\n**Reason:** {}",
        action.past_tense(),
        guild_name,
        reason
    );
    if let Some(extra) = extra {
        description.push('\n');
        description.push_str(&extra);
    }
    let embed = CreateEmbed::new()
        .title(format!("{} Notice", action))
        .colour(action.colour())
        .description(description);
    if let Err(e) = user
        .direct_message(ctx, CreateMessage::new().embed(embed))
        .await
    {
        tracing::debug!("Couldn't DM {}: {:?}", user.name, e);
    }
}

/// Best-effort copy of the case to the modlog channel.
async fn post_modlog(ctx: Context<'_>, case: &Case) {
    let channel = match ctx.data().cases.modlog_channel(case.guild_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("Couldn't look up modlog channel: {:?}", e);
            return;
        }
    };
    if let Err(e) = channel
        .send_message(ctx, CreateMessage::new().embed(case_embed(case)))
        .await
    {
        tracing::warn!("Couldn't post case #{} to modlog: {:?}", case.case_id, e);
    }
}

/// Asks for a ✅ on a kick/ban. Returns the prompt when confirmed.
async fn confirm_action(
    ctx: Context<'_>,
    action: Action,
    target: &User,
    reason: &str,
) -> Result<Option<Message>, Error> {
    let mut prompt = ctx
        .send(CreateReply::default().embed(warning(
            format!("Confirm {}", action),
            format!(
                "Are you sure you want to {} {}?\n**Reason:** {}\n\nReact with {} to confirm or {} to cancel.",
                action.as_str(),
                target.mention(),
                reason,
                CONFIRM,
                CANCEL
            ),
        )))
        .await?
        .into_message()
        .await?;

    match wait_for_reaction(ctx, &prompt, REACTION_CONFIRM_TIMEOUT).await? {
        Outcome::Confirmed => Ok(Some(prompt)),
        outcome => {
            let why = if outcome == Outcome::TimedOut {
                "No response in time."
            } else {
                "Cancelled by moderator."
            };
            prompt
                .edit(ctx, EditMessage::new().embed(failure("Action Cancelled", why)))
                .await?;
            Ok(None)
        }
    }
}

/// Records, mirrors, and announces a finished action.
async fn conclude(
    ctx: Context<'_>,
    user: &User,
    action: Action,
    reason: &str,
    duration: Option<&str>,
    prompt: Option<Message>,
) -> Result<(), Error> {
    let case = record(ctx, user, action, reason, duration).await?;
    post_modlog(ctx, &case).await;

    let embed = success(
        format!("{} | Case #{}", action, case.case_id),
        format!("{} was {}.\n**Reason:** {}", user.mention(), action.past_tense(), reason),
    );
    match prompt {
        Some(mut prompt) => {
            prompt.edit(ctx, EditMessage::new().embed(embed)).await?;
        }
        None => {
            reply_embed(ctx, embed).await?;
        }
    }
    Ok(())
}

/// Parses `1h30m`, `1d`, `30s`; must be between one second and 28 days.
fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(raw.trim())
        .map_err(|_| format!("`{}` isn't a duration. Try `30s`, `10m`, `1h30m` or `1d`.", raw))?;
    if duration < Duration::from_secs(1) {
        Err("Timeouts must be at least one second.".to_string())
    } else if duration > MAX_TIMEOUT {
        Err("Timeouts can't be longer than 28 days.".to_string())
    } else {
        Ok(duration)
    }
}

/// What the `case` command was asked about.
#[derive(Debug, PartialEq, Eq)]
enum CaseQuery {
    Case(i64),
    User(UserId),
    Other(String),
}

impl CaseQuery {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let bare = raw
            .strip_prefix("<@")
            .and_then(|s| s.strip_suffix('>'))
            .map(|s| s.trim_start_matches('!'));
        if let Some(id) = bare.and_then(|s| s.parse::<u64>().ok()) {
            return Self::User(UserId::new(id.max(1)));
        }
        match raw.trim_start_matches('#').parse::<u64>() {
            Ok(n) if n >= SNOWFLAKE_FLOOR => Self::User(UserId::new(n)),
            Ok(n) => Self::Case(n as i64),
            Err(_) => Self::Other(raw.to_string()),
        }
    }
}

/// Kicks a member.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    required_permissions = "KICK_MEMBERS",
    required_bot_permissions = "KICK_MEMBERS | ADD_REACTIONS | MANAGE_MESSAGES"
)]
pub(crate) async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] member: Member,
    #[description = "Why"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    guard_target(ctx, &member).await?;
    let reason = reason_or_default(reason);
    let Some(prompt) = confirm_action(ctx, Action::Kick, &member.user, &reason).await? else {
        return Ok(());
    };

    notify(ctx, &member.user, Action::Kick, &reason, None).await;
    member
        .kick_with_reason(ctx, &reason)
        .await
        .map_err(api_error)?;
    conclude(ctx, &member.user, Action::Kick, &reason, None, Some(prompt)).await
}

/// Bans a user, whether or not they are in the server.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS | ADD_REACTIONS | MANAGE_MESSAGES"
)]
pub(crate) async fn ban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: User,
    #[description = "Why"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    match guild_id.member(ctx, user.id).await {
        Ok(member) => guard_target(ctx, &member).await?,
        Err(_) if user.id == ctx.author().id => return Err(invalid("You can't moderate yourself.")),
        Err(_) => {}
    }
    let reason = reason_or_default(reason);
    let Some(prompt) = confirm_action(ctx, Action::Ban, &user, &reason).await? else {
        return Ok(());
    };

    notify(ctx, &user, Action::Ban, &reason, None).await;
    guild_id
        .ban_with_reason(ctx, user.id, 0, &reason)
        .await
        .map_err(api_error)?;
    conclude(ctx, &user, Action::Ban, &reason, None, Some(prompt)).await
}

/// Lifts a ban.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub(crate) async fn unban(
    ctx: Context<'_>,
    #[description = "User to unban"] user: User,
    #[description = "Why"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let reason = reason_or_default(reason);
    if let Err(e) = guild_id.unban(ctx, user.id).await {
        if is_http_status(&e, 404) {
            return Err(invalid(format!("{} is not banned.", user.name)));
        }
        return Err(api_error(e));
    }
    conclude(ctx, &user, Action::Unban, &reason, None, None).await
}

/// Times a member out.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    aliases("mute"),
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub(crate) async fn timeout(
    ctx: Context<'_>,
    #[description = "Member to time out"] mut member: Member,
    #[description = "How long, e.g. 10m or 1h30m"] duration: String,
    #[description = "Why"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    guard_target(ctx, &member).await?;
    let length = parse_timeout(&duration).map_err(invalid)?;
    let reason = reason_or_default(reason);

    let until_unix = OffsetDateTime::now_utc().unix_timestamp() + length.as_secs() as i64;
    let until = Timestamp::from_unix_timestamp(until_unix)
        .map_err(|_| invalid("That timeout ends at an invalid time."))?;
    member
        .disable_communication_until_datetime(ctx, until)
        .await
        .map_err(api_error)?;

    let pretty = humantime::format_duration(length).to_string();
    notify(
        ctx,
        &member.user,
        Action::Timeout,
        &reason,
        Some(format!("**Duration:** {} (ends <t:{}:R>)", pretty, until_unix)),
    )
    .await;
    conclude(ctx, &member.user, Action::Timeout, &reason, Some(&pretty), None).await
}

/// Lifts a member's timeout.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    aliases("removetimeout", "unmute"),
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub(crate) async fn untimeout(
    ctx: Context<'_>,
    #[description = "Member to release"] mut member: Member,
    #[description = "Why"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let timed_out = member
        .communication_disabled_until
        .map_or(false, |until| until.unix_timestamp() > OffsetDateTime::now_utc().unix_timestamp());
    if !timed_out {
        return Err(invalid(format!("{} is not timed out.", member.user.name)));
    }
    guard_target(ctx, &member).await?;
    let reason = reason_or_default(reason);
    member.enable_communication(ctx).await.map_err(api_error)?;
    notify(ctx, &member.user, Action::Untimeout, &reason, None).await;
    conclude(ctx, &member.user, Action::Untimeout, &reason, None, None).await
}

/// Warns a member. A reason is required.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    required_permissions = "MODERATE_MEMBERS"
)]
pub(crate) async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] member: Member,
    #[description = "Why"]
    #[rest]
    reason: String,
) -> Result<(), Error> {
    guard_target(ctx, &member).await?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(invalid("A warning needs a reason."));
    }
    notify(ctx, &member.user, Action::Warn, reason, None).await;
    conclude(ctx, &member.user, Action::Warn, reason, None, None).await
}

/// Looks up a case by number, or a user's case history.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    aliases("cases", "history"),
    required_permissions = "MODERATE_MEMBERS"
)]
pub(crate) async fn case(
    ctx: Context<'_>,
    #[description = "Case number or user"]
    #[rest]
    identifier: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let user_id = match CaseQuery::parse(&identifier) {
        CaseQuery::Case(id) => {
            match ctx.data().cases.get(guild_id, id).await? {
                Some(case) => reply_embed(ctx, case_embed(&case)).await?,
                None => reply_embed(ctx, warning("Case Not Found", format!("There is no case #{}.", id))).await?,
            };
            return Ok(());
        }
        CaseQuery::User(id) => id,
        CaseQuery::Other(name) => {
            User::convert(ctx, Some(guild_id), Some(ctx.channel_id()), &name)
                .await
                .map_err(|_| invalid(format!("Couldn't find a case or user matching `{}`.", name)))?
                .id
        }
    };

    let history = ctx.data().cases.history(guild_id, user_id).await?;
    if history.is_empty() {
        reply_embed(ctx, info("No Cases", format!("<@{}> has a clean record.", user_id))).await?;
        return Ok(());
    }

    let lines: Vec<String> = history
        .iter()
        .take(CASE_HISTORY_PREVIEW)
        .map(|c| {
            format!(
                "**#{}** {} | {} | <t:{}:R>",
                c.case_id, c.action, c.reason, c.created_at
            )
        })
        .collect();
    let mut embed = CreateEmbed::new()
        .title("Case History")
        .colour(crate::utils::BLURPLE)
        .description({
            let header = format!("Cases for <@{}>:\n\n", user_id);
            let room = EMBED_DESCRIPTION_LIMIT - header.chars().count();
            header + &fit_lines(&lines, room)
        });
    if history.len() > CASE_HISTORY_PREVIEW {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Showing {} of {} cases",
            CASE_HISTORY_PREVIEW,
            history.len()
        )));
    }
    reply_embed(ctx, embed).await?;
    Ok(())
}

/// Shows or sets the channel that receives moderation logs.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    required_permissions = "ADMINISTRATOR"
)]
pub(crate) async fn modlog(
    ctx: Context<'_>,
    #[description = "New modlog channel"] channel: Option<GuildChannel>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or_else(|| invalid("Server only."))?;
    let Some(channel) = channel else {
        let current = ctx.data().cases.modlog_channel(guild_id).await?;
        let text = match current {
            Some(c) => format!("Moderation logs go to <#{}>.", c),
            None => "No modlog channel is set.".to_string(),
        };
        reply_embed(ctx, info("Modlog", text)).await?;
        return Ok(());
    };

    let bot_id = ctx.cache().current_user().id;
    let bot = guild_id.member(ctx, bot_id).await?;
    let permissions = ctx
        .guild()
        .map(|g| g.user_permissions_in(&channel, &bot))
        .unwrap_or_default();
    if !(permissions.send_messages() && permissions.embed_links()) {
        return Err(denied(format!(
            "I need Send Messages and Embed Links in {}.",
            channel.mention()
        )));
    }

    ctx.data()
        .cases
        .set_modlog_channel(guild_id, channel.id)
        .await?;
    channel
        .id
        .send_message(
            ctx,
            CreateMessage::new().embed(info(
                "Modlog Configured",
                format!("Moderation actions will be logged here. Set by {}.", ctx.author().mention()),
            )),
        )
        .await
        .map_err(api_error)?;
    reply_embed(
        ctx,
        success("Modlog Set", format!("Moderation logs will go to {}.", channel.mention())),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy(target: u16, invoker: u16, bot: u16) -> Hierarchy {
        Hierarchy {
            target,
            invoker,
            bot,
            invoker_is_owner: false,
            target_is_owner: false,
        }
    }

    #[test]
    fn test_hierarchy() {
        assert!(hierarchy(1, 5, 10).check().is_ok());
        assert!(hierarchy(5, 5, 10).check().is_err());
        assert!(hierarchy(6, 5, 10).check().is_err());
        assert!(hierarchy(4, 5, 4).check().is_err());
        let owner = Hierarchy {
            invoker_is_owner: true,
            ..hierarchy(7, 0, 10)
        };
        assert!(owner.check().is_ok());
        let target_owner = Hierarchy {
            target_is_owner: true,
            ..hierarchy(0, 9, 10)
        };
        assert_eq!(
            target_owner.check(),
            Err("You can't moderate the server owner.")
        );
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_timeout("1d"), Ok(Duration::from_secs(86_400)));
        assert_eq!(parse_timeout(" 30s "), Ok(Duration::from_secs(30)));
        assert_eq!(parse_timeout("28days"), Ok(MAX_TIMEOUT));
        assert!(parse_timeout("29d").is_err());
        assert!(parse_timeout("0s").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_case_query() {
        assert_eq!(CaseQuery::parse("12"), CaseQuery::Case(12));
        assert_eq!(CaseQuery::parse("#3"), CaseQuery::Case(3));
        assert_eq!(
            CaseQuery::parse("<@!123456789012345678>"),
            CaseQuery::User(UserId::new(123456789012345678))
        );
        assert_eq!(
            CaseQuery::parse("123456789012345678"),
            CaseQuery::User(UserId::new(123456789012345678))
        );
        assert_eq!(CaseQuery::parse("kat"), CaseQuery::Other("kat".to_string()));
    }

    #[test]
    fn test_reason_default() {
        assert_eq!(reason_or_default(None), NO_REASON);
        assert_eq!(reason_or_default(Some("  ".into())), NO_REASON);
        assert_eq!(reason_or_default(Some(" spam ".into())), "spam");
    }
}

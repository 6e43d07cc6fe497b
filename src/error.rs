//! Errors users can be told about, and the one place that turns every framework error into a
//! reply.
//!
//! Anything a command returns that isn't a [`BotError`] is treated as a bug: it gets an incident
//! id, a dump file under the error directory, and a short embed carrying the id.

use std::path::{Path, PathBuf};
use std::time::Duration;

use poise::serenity_prelude as serenity;
use poise::{CreateReply, FrameworkError};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::logging::critical;
use crate::utils::{failure, log_err, warning, Context, Data, Error};

/// Shortest time a cooldown notice stays up.
const MIN_COOLDOWN_NOTICE: Duration = Duration::from_secs(5);

/// Failures whose message is fit to show the user as-is.
#[derive(Debug, thiserror::Error)]
pub(crate) enum BotError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Denied(String),
    #[error("You need to be in a voice channel to use this command.")]
    NotInVoice,
    #[error("You need to be in the same voice channel as me.")]
    WrongVoiceChannel,
    #[error("I'm not connected to a voice channel.")]
    NotConnected,
    #[error("Music is not available right now.")]
    MusicDisabled,
    #[error("AI features are currently unavailable. Please try again later.")]
    AiDisabled,
    #[error("{0}")]
    External(String),
}

impl BotError {
    pub(crate) fn title(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "Invalid Input",
            Self::Denied(_) => "Permission Denied",
            Self::NotInVoice | Self::WrongVoiceChannel | Self::NotConnected => "Voice Channel",
            Self::MusicDisabled => "Music Unavailable",
            Self::AiDisabled => "AI Unavailable",
            Self::External(_) => "Service Error",
        }
    }
}

/// Shorthand for the common `Err(BotError::InvalidInput(..).into())`.
pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    BotError::InvalidInput(msg.into()).into()
}

pub(crate) fn denied(msg: impl Into<String>) -> Error {
    BotError::Denied(msg.into()).into()
}

/// A message that reached the framework but couldn't be turned into a command run.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Misuse<'a> {
    UnknownCommand,
    Argument {
        /// The offending argument, `None` when it was left out.
        input: Option<&'a str>,
        error: &'a str,
        usage: &'a str,
    },
}

/// What to reply with, if anything. Unknown commands are ignored.
pub(crate) fn misuse_reply(misuse: Misuse<'_>) -> Option<serenity::CreateEmbed> {
    match misuse {
        Misuse::UnknownCommand => None,
        Misuse::Argument {
            input: None, usage, ..
        } => Some(warning(
            "Missing Argument",
            format!("You're missing a required argument.\n**Usage:** `{}`", usage),
        )),
        Misuse::Argument {
            input: Some(input),
            error,
            usage,
        } => Some(warning(
            "Invalid Argument",
            format!(
                "Couldn't understand `{}`: {}\n**Usage:** `{}`",
                input, error, usage
            ),
        )),
    }
}

/// Poise's `on_error` hook.
pub(crate) async fn on_error(error: FrameworkError<'_, Data, Error>) {
    if let Err(e) = handle(error).await {
        tracing::error!("Error while handling an error: {:?}", e);
    }
}

async fn handle(error: FrameworkError<'_, Data, Error>) -> Result<(), Error> {
    match error {
        FrameworkError::Setup { error, .. } => critical!("Setup failed: {:?}", error),
        FrameworkError::EventHandler { error, event, .. } => {
            tracing::error!("Error in {} handler: {:?}", event.snake_case_name(), error)
        }
        FrameworkError::UnknownCommand {
            ctx,
            msg,
            msg_content,
            ..
        } => match misuse_reply(Misuse::UnknownCommand) {
            Some(embed) => {
                msg.channel_id
                    .send_message(ctx, serenity::CreateMessage::new().embed(embed))
                    .await?;
            }
            None => tracing::debug!("Ignoring unknown command: {}", msg_content),
        },
        FrameworkError::Command { error, ctx, .. } => report(ctx, &error).await?,
        FrameworkError::CommandCheckFailed { error, ctx, .. } => match error {
            Some(error) => report(ctx, &error).await?,
            None => {
                reply(ctx, failure("Check Failed", "You can't use this command here.")).await?;
            }
        },
        FrameworkError::ArgumentParse {
            error, input, ctx, ..
        } => {
            let usage = crate::help::usage(ctx.prefix(), ctx.command());
            let error = error.to_string();
            let misuse = Misuse::Argument {
                input: input.as_deref(),
                error: &error,
                usage: &usage,
            };
            if let Some(embed) = misuse_reply(misuse) {
                reply(ctx, embed).await?;
            }
        }
        FrameworkError::SubcommandRequired { ctx } => {
            let names: Vec<String> = ctx
                .command()
                .subcommands
                .iter()
                .map(|c| format!("`{}`", c.name))
                .collect();
            reply(
                ctx,
                warning(
                    "Subcommand Required",
                    format!("Try one of: {}", names.join(", ")),
                ),
            )
            .await?;
        }
        FrameworkError::CooldownHit {
            remaining_cooldown,
            ctx,
            ..
        } => {
            let handle = reply(
                ctx,
                warning(
                    "Cooldown",
                    format!(
                        "This command is on cooldown. Try again in {:.1} seconds.",
                        remaining_cooldown.as_secs_f32()
                    ),
                ),
            )
            .await?;
            tokio::time::sleep(remaining_cooldown.max(MIN_COOLDOWN_NOTICE)).await;
            log_err(handle.delete(ctx).await);
        }
        FrameworkError::MissingBotPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            reply(
                ctx,
                failure(
                    "Missing Bot Permissions",
                    format!("I need these permissions: {}", missing_permissions),
                ),
            )
            .await?;
        }
        FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            let description = match missing_permissions {
                Some(p) => format!("You need these permissions: {}", p),
                None => "You don't have permission to use this command.".to_string(),
            };
            reply(ctx, failure("Missing Permissions", description)).await?;
        }
        FrameworkError::NotAnOwner { ctx, .. } => tracing::info!(
            "{} tried owner-only command {}",
            ctx.author().name,
            ctx.command().qualified_name
        ),
        FrameworkError::GuildOnly { ctx, .. } => {
            reply(
                ctx,
                failure("Server Only", "This command can only be used in a server."),
            )
            .await?;
        }
        FrameworkError::CommandPanic { payload, ctx, .. } => {
            let error = anyhow::anyhow!(
                "command panicked: {}",
                payload.unwrap_or_else(|| "<no payload>".to_string())
            );
            report(ctx, &error).await?;
        }
        other => poise::builtins::on_error(other).await?,
    }
    Ok(())
}

async fn reply<'a>(
    ctx: Context<'a>,
    embed: serenity::CreateEmbed,
) -> Result<poise::ReplyHandle<'a>, Error> {
    Ok(ctx.send(CreateReply::default().embed(embed)).await?)
}

/// Shows a [`BotError`] as-is, or files an incident for anything else.
async fn report(ctx: Context<'_>, error: &Error) -> Result<(), Error> {
    if let Some(known) = error.downcast_ref::<BotError>() {
        reply(ctx, failure(known.title(), known.to_string())).await?;
        return Ok(());
    }

    let incident = Incident::new(ctx, error);
    match record(&ctx.data().config.error_dir, &incident).await {
        Ok(path) => tracing::error!(
            "Incident {} in {}: {} (details in {})",
            incident.id,
            incident.command,
            error,
            path.display()
        ),
        Err(io) => tracing::error!(
            "Incident {} could not be written ({}):\n{}",
            incident.id,
            io,
            incident.render()
        ),
    }

    reply(
        ctx,
        failure(
            "Unexpected Error",
            format!(
                "Something went wrong while running this command.\n**Error ID:** `{}`\n**Type:** {}",
                incident.id, incident.kind
            ),
        ),
    )
    .await?;
    Ok(())
}

/// Everything written to an incident file.
pub(crate) struct Incident {
    pub(crate) id: Uuid,
    pub(crate) when: OffsetDateTime,
    pub(crate) user: String,
    pub(crate) location: String,
    pub(crate) command: String,
    pub(crate) input: String,
    pub(crate) kind: &'static str,
    pub(crate) chain: Vec<String>,
    pub(crate) debug: String,
}

impl Incident {
    fn new(ctx: Context<'_>, error: &Error) -> Self {
        let location = match ctx.guild_id() {
            Some(guild) => format!("guild {} / channel {}", guild, ctx.channel_id()),
            None => format!("DM channel {}", ctx.channel_id()),
        };
        Self::from_parts(
            format!("{} ({})", ctx.author().name, ctx.author().id),
            location,
            ctx.command().qualified_name.clone(),
            ctx.invocation_string(),
            error,
        )
    }

    pub(crate) fn from_parts(
        user: String,
        location: String,
        command: String,
        input: String,
        error: &Error,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            when: OffsetDateTime::now_utc(),
            user,
            location,
            command,
            input,
            kind: kind(error),
            chain: error.chain().map(|e| e.to_string()).collect(),
            debug: format!("{:?}", error),
        }
    }

    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Incident: {}\n", self.id));
        out.push_str(&format!(
            "Time: {}\n",
            self.when.format(&Rfc3339).unwrap_or_default()
        ));
        out.push_str(&format!("User: {}\n", self.user));
        out.push_str(&format!("Location: {}\n", self.location));
        out.push_str(&format!("Command: {}\n", self.command));
        out.push_str(&format!("Input: {}\n", self.input));
        out.push_str(&format!("Type: {}\n\n", self.kind));
        out.push_str("Error chain:\n");
        for (depth, cause) in self.chain.iter().enumerate() {
            out.push_str(&format!("  {}: {}\n", depth, cause));
        }
        out.push_str("\nDebug:\n");
        out.push_str(&self.debug);
        out.push('\n');
        out
    }
}

/// A coarse name for where an error came from.
pub(crate) fn kind(error: &Error) -> &'static str {
    if error.downcast_ref::<serenity::Error>().is_some() {
        "Discord API error"
    } else if error.downcast_ref::<sqlx::Error>().is_some() {
        "Database error"
    } else if error.downcast_ref::<reqwest::Error>().is_some() {
        "HTTP error"
    } else if error.downcast_ref::<std::io::Error>().is_some() {
        "I/O error"
    } else {
        "Internal error"
    }
}

/// Writes `<dir>/<id>.log`.
pub(crate) async fn record(dir: &Path, incident: &Incident) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.log", incident.id));
    tokio::fs::write(&path, incident.render()).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    fn sample(error: &Error) -> Incident {
        Incident::from_parts(
            "kat (1)".to_string(),
            "guild 2 / channel 3".to_string(),
            "eng check".to_string(),
            "i.eng check me go store".to_string(),
            error,
        )
    }

    #[test]
    fn test_kind() {
        let io: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(kind(&io), "I/O error");
        assert_eq!(kind(&anyhow::anyhow!("boom")), "Internal error");
        assert_eq!(kind(&sqlx::Error::RowNotFound.into()), "Database error");
    }

    #[test]
    fn test_render_has_chain() {
        let error = Err::<(), _>(anyhow::anyhow!("root cause"))
            .context("outer layer")
            .unwrap_err();
        let text = sample(&error).render();
        assert!(text.contains("Command: eng check"));
        assert!(text.contains("Input: i.eng check me go store"));
        assert!(text.contains("  0: outer layer"));
        assert!(text.contains("  1: root cause"));
    }

    #[tokio::test]
    async fn test_record_writes_named_file() {
        let dir = std::env::temp_dir().join(format!("lazybot-errors-{}", Uuid::new_v4()));
        let incident = sample(&anyhow::anyhow!("boom"));
        let path = record(&dir, &incident).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            format!("{}.log", incident.id)
        );
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(&format!("Incident: {}", incident.id)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    fn title_and_text(embed: &serenity::CreateEmbed) -> (String, String) {
        let json = serde_json::to_value(embed).unwrap();
        (
            json["title"].as_str().unwrap().to_string(),
            json["description"].as_str().unwrap().to_string(),
        )
    }

    #[test]
    fn test_unknown_command_gets_no_reply() {
        assert!(misuse_reply(Misuse::UnknownCommand).is_none());
    }

    #[test]
    fn test_missing_argument_shows_usage() {
        let usage = crate::help::usage("i.", &crate::purge::purge());
        let embed = misuse_reply(Misuse::Argument {
            input: None,
            error: "Too few arguments were supplied",
            usage: &usage,
        })
        .unwrap();
        let (title, text) = title_and_text(&embed);
        assert_eq!(title, "Missing Argument");
        assert!(text.ends_with("**Usage:** `i.purge <amount>`"));
    }

    #[test]
    fn test_invalid_argument_names_input() {
        let embed = misuse_reply(Misuse::Argument {
            input: Some("lots"),
            error: "invalid digit found in string",
            usage: "i.purge <amount>",
        })
        .unwrap();
        let (title, text) = title_and_text(&embed);
        assert_eq!(title, "Invalid Argument");
        assert!(text.starts_with("Couldn't understand `lots`: invalid digit found in string"));
        assert!(text.contains("`i.purge <amount>`"));
    }

    #[test]
    fn test_bot_error_is_user_facing() {
        let error = invalid("Prefix cannot be longer than 10 characters.");
        let known = error.downcast_ref::<BotError>().unwrap();
        assert_eq!(known.title(), "Invalid Input");
        assert_eq!(
            known.to_string(),
            "Prefix cannot be longer than 10 characters."
        );
        assert_eq!(BotError::NotInVoice.title(), "Voice Channel");
    }
}

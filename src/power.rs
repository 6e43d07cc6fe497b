//! Owner-only restart and shutdown, each behind a typed confirmation code.

use std::process::Command;

use crate::config::POWER_CONFIRM_TIMEOUT;
use crate::confirm::{wait_for_code, ConfirmationCode, Outcome};
use crate::logging::system;
use crate::utils::{failure, reply_embed, success, warning, Context, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Power {
    Restart,
    Shutdown,
}

impl Power {
    fn verb(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Shutdown => "shut down",
        }
    }
}

/// Title and text of the reply once the prompt resolves.
fn outcome_message(action: Power, outcome: Outcome) -> (&'static str, String) {
    match (outcome, action) {
        (Outcome::Confirmed, Power::Restart) => ("Restarting", "Be right back.".to_string()),
        (Outcome::Confirmed, Power::Shutdown) => ("Shutting Down", "Goodbye!".to_string()),
        (Outcome::Declined, _) => (
            "Incorrect Code",
            format!("The code didn't match. The bot will not {}.", action.verb()),
        ),
        (Outcome::TimedOut, _) => (
            "Timed Out",
            format!(
                "No code within {} seconds. The bot will not {}.",
                POWER_CONFIRM_TIMEOUT.as_secs(),
                action.verb()
            ),
        ),
    }
}

/// Prompts for the code and reports the result. True only when confirmed.
async fn confirm(ctx: Context<'_>, action: Power) -> Result<bool, Error> {
    let code = ConfirmationCode::random();
    reply_embed(
        ctx,
        warning(
            "Confirmation Required",
            format!(
                "Type `{}` within {} seconds to {} the bot.",
                code,
                POWER_CONFIRM_TIMEOUT.as_secs(),
                action.verb()
            ),
        ),
    )
    .await?;

    let outcome = wait_for_code(ctx, code, POWER_CONFIRM_TIMEOUT).await?;
    let (title, text) = outcome_message(action, outcome);
    let embed = match outcome {
        Outcome::Confirmed => success(title, text),
        _ => failure(title, text),
    };
    reply_embed(ctx, embed).await?;
    Ok(outcome == Outcome::Confirmed)
}

/// Restarts the bot process.
#[poise::command(prefix_command, owners_only, category = "Owner")]
pub(crate) async fn restart(ctx: Context<'_>) -> Result<(), Error> {
    if !confirm(ctx, Power::Restart).await? {
        return Ok(());
    }
    system!("Restart requested by {}", ctx.author().name);
    respawn()
}

/// Shuts the bot down.
#[poise::command(
    prefix_command,
    owners_only,
    category = "Owner",
    aliases("poweroff", "turnoff")
)]
pub(crate) async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    if !confirm(ctx, Power::Shutdown).await? {
        return Ok(());
    }
    system!("Shutdown requested by {}", ctx.author().name);
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}

/// Replaces this process with a fresh copy of itself.
fn respawn() -> Result<(), Error> {
    let exe = std::env::current_exe()?;
    let mut command = Command::new(exe);
    command.args(std::env::args_os().skip(1));

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // exec only returns on failure
        Err(command.exec().into())
    }
    #[cfg(not(unix))]
    {
        command.spawn()?;
        std::process::exit(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_messages() {
        assert_eq!(
            outcome_message(Power::Restart, Outcome::Confirmed).0,
            "Restarting"
        );
        assert_eq!(
            outcome_message(Power::Shutdown, Outcome::Confirmed).0,
            "Shutting Down"
        );
        let (title, text) = outcome_message(Power::Shutdown, Outcome::Declined);
        assert_eq!(title, "Incorrect Code");
        assert!(text.ends_with("will not shut down."));
        let (title, text) = outcome_message(Power::Restart, Outcome::TimedOut);
        assert_eq!(title, "Timed Out");
        assert!(text.contains("15 seconds"));
    }
}

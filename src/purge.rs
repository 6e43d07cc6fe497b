//! Message purging: bulk deletes, and nuking a channel by recreating it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use poise::serenity_prelude as serenity;
use poise::CreateReply;
use serenity::{
    CreateAttachment, CreateChannel, CreateMessage, CreateWebhook, EditMessage, GetMessages,
    Mentionable, MessageId,
};

use crate::config::{MAX_PURGE, REACTION_CONFIRM_TIMEOUT};
use crate::confirm::{wait_for_reaction, Outcome, CANCEL, CONFIRM};
use crate::error::{denied, invalid};
use crate::utils::{failure, is_http_status, log_err, success, warning, Context, Error};

/// Discord only bulk-deletes messages younger than this.
const BULK_DELETE_MAX_AGE: Duration = Duration::from_secs(14 * 24 * 60 * 60);
/// Messages per bulk-delete call.
const BULK_DELETE_CHUNK: usize = 100;
const NOTICE_LIFETIME: Duration = Duration::from_secs(3);
/// 2015-01-01, the zero point of snowflake timestamps.
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

fn snowflake_millis(id: MessageId) -> u64 {
    (id.get() >> 22) + DISCORD_EPOCH_MS
}

/// Splits ids into those that can be bulk-deleted and those that must go one at a time.
fn split_by_age(ids: &[MessageId], now_ms: u64) -> (Vec<MessageId>, Vec<MessageId>) {
    let cutoff = BULK_DELETE_MAX_AGE.as_millis() as u64;
    ids.iter()
        .copied()
        .partition(|id| now_ms.saturating_sub(snowflake_millis(*id)) < cutoff)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Accepts `1..=MAX_PURGE`.
fn check_amount(amount: u32) -> Result<usize, Error> {
    if (1..=MAX_PURGE).contains(&amount) {
        Ok(amount as usize)
    } else {
        Err(invalid(format!(
            "Amount must be between 1 and {}.",
            MAX_PURGE
        )))
    }
}

fn forbidden_to_denied(e: serenity::Error) -> Error {
    if is_http_status(&e, 403) {
        denied("I don't have permission to delete messages here.")
    } else {
        e.into()
    }
}

/// Deletes the newest `count` messages in the channel and returns how many went.
async fn delete_recent(ctx: Context<'_>, count: usize) -> Result<usize, Error> {
    let channel = ctx.channel_id();
    let mut ids: Vec<MessageId> = Vec::new();
    while ids.len() < count {
        let mut request = GetMessages::new().limit((count - ids.len()).min(100) as u8);
        if let Some(oldest) = ids.last() {
            request = request.before(*oldest);
        }
        let page = channel.messages(ctx, request).await?;
        if page.is_empty() {
            break;
        }
        ids.extend(page.iter().map(|m| m.id));
    }

    let (bulk, single) = split_by_age(&ids, now_ms());
    for chunk in bulk.chunks(BULK_DELETE_CHUNK) {
        let result = match chunk {
            [one] => channel.delete_message(ctx, *one).await,
            many => channel.delete_messages(ctx, many).await,
        };
        result.map_err(forbidden_to_denied)?;
    }
    for id in &single {
        channel
            .delete_message(ctx, *id)
            .await
            .map_err(forbidden_to_denied)?;
    }
    Ok(ids.len())
}

/// Deletes the given number of messages.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    aliases("clear"),
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "MANAGE_MESSAGES | READ_MESSAGE_HISTORY"
)]
pub(crate) async fn purge(
    ctx: Context<'_>,
    #[description = "How many messages to delete (1 to 1000)"] amount: u32,
) -> Result<(), Error> {
    let amount = check_amount(amount)?;
    // the command message goes too
    let deleted = delete_recent(ctx, amount + 1).await?;

    let notice = ctx
        .channel_id()
        .send_message(
            ctx,
            CreateMessage::new().embed(success(
                "Messages Purged",
                format!("Deleted {} messages.", deleted.saturating_sub(1)),
            )),
        )
        .await?;
    tokio::time::sleep(NOTICE_LIFETIME).await;
    log_err(notice.delete(ctx).await);
    Ok(())
}

/// Deletes every message in this channel by recreating it.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Moderation",
    required_permissions = "MANAGE_CHANNELS | MANAGE_ROLES",
    required_bot_permissions = "MANAGE_CHANNELS | MANAGE_ROLES | MANAGE_WEBHOOKS | ADD_REACTIONS"
)]
pub(crate) async fn hardpurge(ctx: Context<'_>) -> Result<(), Error> {
    let channel = ctx
        .guild_channel()
        .await
        .ok_or_else(|| invalid("This only works in server channels."))?;

    let mut prompt = ctx
        .send(CreateReply::default().embed(warning(
            "Confirm Hard Purge",
            format!(
                "This deletes and recreates {}. **Every message will be lost.**\nReact with {} to continue or {} to cancel.",
                channel.mention(),
                CONFIRM,
                CANCEL
            ),
        )))
        .await?
        .into_message()
        .await?;

    if wait_for_reaction(ctx, &prompt, REACTION_CONFIRM_TIMEOUT).await? != Outcome::Confirmed {
        prompt
            .edit(
                ctx,
                EditMessage::new().embed(failure("Action Cancelled", "The channel was left alone.")),
            )
            .await?;
        return Ok(());
    }

    let webhooks = match channel.id.webhooks(ctx).await {
        Ok(hooks) => hooks,
        Err(e) => {
            tracing::warn!("Couldn't list webhooks of {}: {:?}", channel.id, e);
            Vec::new()
        }
    };

    let reason = format!("Hard purge by {}", ctx.author().name);
    let mut builder = CreateChannel::new(channel.name.clone())
        .kind(channel.kind)
        .position(channel.position)
        .nsfw(channel.nsfw)
        .permissions(channel.permission_overwrites.clone())
        .audit_log_reason(&reason);
    if let Some(topic) = &channel.topic {
        builder = builder.topic(topic.clone());
    }
    if let Some(parent) = channel.parent_id {
        builder = builder.category(parent);
    }
    if let Some(slowmode) = channel.rate_limit_per_user {
        builder = builder.rate_limit_per_user(slowmode);
    }
    let fresh = channel
        .guild_id
        .create_channel(ctx, builder)
        .await
        .map_err(forbidden_to_denied)?;

    for hook in webhooks {
        let name = hook.name.clone().unwrap_or_else(|| "Webhook".to_string());
        let mut create = CreateWebhook::new(name);
        if let Some(hash) = &hook.avatar {
            let url = format!("https://cdn.discordapp.com/avatars/{}/{}.png", hook.id, hash);
            match CreateAttachment::url(ctx.http(), &url).await {
                Ok(avatar) => create = create.avatar(&avatar),
                Err(e) => tracing::warn!("Couldn't fetch avatar of webhook {}: {:?}", hook.id, e),
            }
        }
        log_err(fresh.id.create_webhook(ctx, create).await);
    }

    channel.id.delete(ctx).await.map_err(forbidden_to_denied)?;
    fresh
        .id
        .send_message(
            ctx,
            CreateMessage::new().embed(success(
                "Channel Purged",
                format!("This channel was recreated by {}.", ctx.author().mention()),
            )),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_at(ms: u64) -> MessageId {
        MessageId::new((ms - DISCORD_EPOCH_MS) << 22 | 1)
    }

    #[test]
    fn test_snowflake_time() {
        let t = 1_700_000_000_000;
        assert_eq!(snowflake_millis(id_at(t)), t);
    }

    #[test]
    fn test_split_by_age() {
        let now = 1_700_000_000_000;
        let day = 24 * 60 * 60 * 1000;
        let fresh = id_at(now - day);
        let edge = id_at(now - 14 * day + 1);
        let stale = id_at(now - 15 * day);
        let (bulk, single) = split_by_age(&[fresh, edge, stale], now);
        assert_eq!(bulk, vec![fresh, edge]);
        assert_eq!(single, vec![stale]);
    }

    #[test]
    fn test_amount_range() {
        assert_eq!(check_amount(1).unwrap(), 1);
        assert_eq!(check_amount(MAX_PURGE).unwrap(), 1000);
        for bad in [0, MAX_PURGE + 1, u32::MAX] {
            let err = check_amount(bad).unwrap_err();
            let known = err.downcast_ref::<crate::error::BotError>().unwrap();
            assert_eq!(known.to_string(), "Amount must be between 1 and 1000.");
        }
    }
}

//! Per-guild command prefixes.
//!
//! The default prefix is always active. Guilds may add up to [`MAX_CUSTOM_PREFIXES`] of their
//! own, which live in SQLite and in an in-memory cache that is consulted on every message.

use std::collections::{BTreeSet, HashMap};

use poise::serenity_prelude as serenity;
use serenity::GuildId;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::config::{DEFAULT_PREFIX, MAX_CUSTOM_PREFIXES, MAX_PREFIX_LEN};
use crate::db::{from_db, to_db};
use crate::logging::database;
use crate::utils::{info, reply_embed, success, warning, Context, Data, Error};

#[derive(Debug, thiserror::Error)]
pub(crate) enum PrefixError {
    #[error("Prefix cannot be empty.")]
    Empty,
    #[error("Prefix cannot be longer than {} characters.", MAX_PREFIX_LEN)]
    TooLong,
    #[error("This server already has the maximum of {} custom prefixes.", MAX_CUSTOM_PREFIXES)]
    TooMany,
    #[error("`{}` is the default prefix and is always active.", DEFAULT_PREFIX)]
    IsDefault,
    #[error("The default prefix `{}` cannot be removed.", DEFAULT_PREFIX)]
    CannotRemoveDefault,
    #[error("Prefix `{0}` already exists.")]
    Duplicate(String),
    #[error("Prefix `{0}` was not found.")]
    NotFound(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Checks a prefix against the guild's current custom prefixes.
fn validate_new(existing: &BTreeSet<String>, prefix: &str) -> Result<(), PrefixError> {
    if prefix.is_empty() {
        Err(PrefixError::Empty)
    } else if prefix.chars().count() > MAX_PREFIX_LEN {
        Err(PrefixError::TooLong)
    } else if existing.len() >= MAX_CUSTOM_PREFIXES {
        Err(PrefixError::TooMany)
    } else if prefix == DEFAULT_PREFIX {
        Err(PrefixError::IsDefault)
    } else if existing.contains(prefix) {
        Err(PrefixError::Duplicate(prefix.to_string()))
    } else {
        Ok(())
    }
}

/// Longest prefix of `content` among `candidates`, split off the rest.
fn strip_longest<'a, 'p>(
    candidates: impl IntoIterator<Item = &'p str>,
    content: &'a str,
) -> Option<(&'a str, &'a str)> {
    candidates
        .into_iter()
        .filter(|p| !p.is_empty() && content.starts_with(*p))
        .max_by_key(|p| p.len())
        .map(|p| content.split_at(p.len()))
}

/// Stored prefixes plus their cache.
pub(crate) struct PrefixStore {
    pool: SqlitePool,
    cache: RwLock<HashMap<GuildId, BTreeSet<String>>>,
}

impl PrefixStore {
    /// Creates the table if needed and loads every stored prefix.
    pub(crate) async fn connect(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS guild_prefixes (
                guild_id INTEGER NOT NULL,
                prefix TEXT NOT NULL,
                PRIMARY KEY (guild_id, prefix)
            )",
        )
        .execute(&pool)
        .await?;

        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT guild_id, prefix FROM guild_prefixes")
            .fetch_all(&pool)
            .await?;
        let mut cache: HashMap<GuildId, BTreeSet<String>> = HashMap::new();
        for (guild, prefix) in rows {
            cache
                .entry(GuildId::new(from_db(guild)))
                .or_default()
                .insert(prefix);
        }
        database!("Loaded prefixes for {} guilds", cache.len());

        Ok(Self {
            pool,
            cache: RwLock::new(cache),
        })
    }

    /// The guild's custom prefixes, without the default.
    pub(crate) async fn custom(&self, guild: GuildId) -> Vec<String> {
        self.cache
            .read()
            .await
            .get(&guild)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every prefix that works in `guild`: the default first, then the custom ones.
    pub(crate) async fn active(&self, guild: Option<GuildId>) -> Vec<String> {
        let mut prefixes = vec![DEFAULT_PREFIX.to_string()];
        if let Some(guild) = guild {
            prefixes.extend(self.custom(guild).await);
        }
        prefixes
    }

    /// Splits `content` into (prefix, rest) if it starts with any active prefix. DMs only get
    /// the default.
    pub(crate) async fn strip<'a>(
        &self,
        guild: Option<GuildId>,
        content: &'a str,
    ) -> Option<(&'a str, &'a str)> {
        let cache = self.cache.read().await;
        let custom = guild.and_then(|g| cache.get(&g));
        let candidates = std::iter::once(DEFAULT_PREFIX)
            .chain(custom.into_iter().flatten().map(String::as_str));
        strip_longest(candidates, content)
    }

    pub(crate) async fn add(&self, guild: GuildId, prefix: &str) -> Result<(), PrefixError> {
        let prefix = prefix.trim();
        let mut cache = self.cache.write().await;
        let existing = cache.entry(guild).or_default();
        validate_new(existing, prefix)?;

        sqlx::query("INSERT INTO guild_prefixes (guild_id, prefix) VALUES (?, ?)")
            .bind(to_db(guild.get()))
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        existing.insert(prefix.to_string());
        Ok(())
    }

    pub(crate) async fn remove(&self, guild: GuildId, prefix: &str) -> Result<(), PrefixError> {
        let prefix = prefix.trim();
        if prefix == DEFAULT_PREFIX {
            return Err(PrefixError::CannotRemoveDefault);
        }
        let mut cache = self.cache.write().await;
        let found = cache.get(&guild).map_or(false, |set| set.contains(prefix));
        if !found {
            return Err(PrefixError::NotFound(prefix.to_string()));
        }

        sqlx::query("DELETE FROM guild_prefixes WHERE guild_id = ? AND prefix = ?")
            .bind(to_db(guild.get()))
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        if let Some(set) = cache.get_mut(&guild) {
            set.remove(prefix);
            if set.is_empty() {
                cache.remove(&guild);
            }
        }
        Ok(())
    }

    /// Drops every custom prefix of a guild, returning how many there were.
    pub(crate) async fn clear(&self, guild: GuildId) -> Result<u64, sqlx::Error> {
        let mut cache = self.cache.write().await;
        let removed = sqlx::query("DELETE FROM guild_prefixes WHERE guild_id = ?")
            .bind(to_db(guild.get()))
            .execute(&self.pool)
            .await?
            .rows_affected();
        cache.remove(&guild);
        Ok(removed)
    }
}

/// Prefix resolver handed to poise.
pub(crate) fn resolve<'a>(
    _ctx: &'a serenity::Context,
    msg: &'a serenity::Message,
    data: &'a Data,
) -> poise::BoxFuture<'a, Result<Option<(&'a str, &'a str)>, Error>> {
    Box::pin(async move { Ok(data.prefixes.strip(msg.guild_id, &msg.content).await) })
}

/// Turns a rejection into a reply, passing database failures on.
async fn reply_rejection(ctx: Context<'_>, error: PrefixError) -> Result<(), Error> {
    match error {
        PrefixError::Database(e) => Err(e.into()),
        rejected => {
            reply_embed(ctx, warning("Prefix Not Changed", rejected.to_string())).await?;
            Ok(())
        }
    }
}

/// Shows or manages this server's prefixes.
#[poise::command(
    prefix_command,
    guild_only,
    category = "Utility",
    subcommands("add", "remove", "clear", "list")
)]
pub(crate) async fn prefix(ctx: Context<'_>) -> Result<(), Error> {
    show(ctx).await
}

/// Adds a custom prefix.
#[poise::command(prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
async fn add(
    ctx: Context<'_>,
    #[description = "The new prefix"] new_prefix: String,
) -> Result<(), Error> {
    let guild = ctx.guild_id().ok_or(crate::error::invalid("Server only."))?;
    match ctx.data().prefixes.add(guild, &new_prefix).await {
        Ok(()) => {
            reply_embed(
                ctx,
                success(
                    "Prefix Added",
                    format!("`{}` is now a prefix in this server.", new_prefix.trim()),
                ),
            )
            .await?;
            Ok(())
        }
        Err(e) => reply_rejection(ctx, e).await,
    }
}

/// Removes a custom prefix.
#[poise::command(
    prefix_command,
    guild_only,
    aliases("delete"),
    required_permissions = "ADMINISTRATOR"
)]
async fn remove(
    ctx: Context<'_>,
    #[description = "The prefix to remove"] old_prefix: String,
) -> Result<(), Error> {
    let guild = ctx.guild_id().ok_or(crate::error::invalid("Server only."))?;
    match ctx.data().prefixes.remove(guild, &old_prefix).await {
        Ok(()) => {
            reply_embed(
                ctx,
                success(
                    "Prefix Removed",
                    format!("`{}` is no longer a prefix here.", old_prefix.trim()),
                ),
            )
            .await?;
            Ok(())
        }
        Err(e) => reply_rejection(ctx, e).await,
    }
}

/// Removes every custom prefix.
#[poise::command(prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
async fn clear(ctx: Context<'_>) -> Result<(), Error> {
    let guild = ctx.guild_id().ok_or(crate::error::invalid("Server only."))?;
    let removed = ctx.data().prefixes.clear(guild).await?;
    reply_embed(
        ctx,
        success(
            "Prefixes Cleared",
            format!(
                "Removed {} custom prefixes. Only `{}` remains.",
                removed, DEFAULT_PREFIX
            ),
        ),
    )
    .await?;
    Ok(())
}

/// Lists the prefixes that work here.
#[poise::command(prefix_command, guild_only, aliases("show"))]
async fn list(ctx: Context<'_>) -> Result<(), Error> {
    show(ctx).await
}

async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let active = ctx.data().prefixes.active(ctx.guild_id()).await;
    if active.len() == 1 {
        ctx.say(format!("My prefix here is `{}`", DEFAULT_PREFIX))
            .await?;
        return Ok(());
    }

    let lines: Vec<String> = active
        .iter()
        .map(|p| {
            if p == DEFAULT_PREFIX {
                format!("`{}` (default)", p)
            } else {
                format!("`{}`", p)
            }
        })
        .collect();
    reply_embed(ctx, info("Server Prefixes", lines.join("\n"))).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(1);
    const OTHER: GuildId = GuildId::new(2);

    async fn store() -> PrefixStore {
        PrefixStore::connect(crate::db::memory().await).await.unwrap()
    }

    #[tokio::test]
    async fn test_active_is_default_plus_stored() {
        let store = store().await;
        assert_eq!(store.active(Some(GUILD)).await, vec!["i."]);
        store.add(GUILD, "!").await.unwrap();
        store.add(GUILD, "?? ").await.unwrap();
        assert_eq!(store.active(Some(GUILD)).await, vec!["i.", "!", "??"]);
        assert_eq!(store.active(Some(OTHER)).await, vec!["i."]);
        assert_eq!(store.active(None).await, vec!["i."]);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = store().await;
        store.add(GUILD, "!").await.unwrap();
        assert!(matches!(
            store.add(GUILD, "!").await,
            Err(PrefixError::Duplicate(p)) if p == "!"
        ));
        assert_eq!(store.custom(GUILD).await, vec!["!"]);
    }

    #[tokio::test]
    async fn test_default_never_added_or_removed() {
        let store = store().await;
        assert!(matches!(store.add(GUILD, "i.").await, Err(PrefixError::IsDefault)));
        assert!(matches!(
            store.remove(GUILD, "i.").await,
            Err(PrefixError::CannotRemoveDefault)
        ));
        store.clear(GUILD).await.unwrap();
        assert_eq!(store.active(Some(GUILD)).await, vec!["i."]);
    }

    #[tokio::test]
    async fn test_limits() {
        let store = store().await;
        assert!(matches!(store.add(GUILD, "   ").await, Err(PrefixError::Empty)));
        assert!(matches!(
            store.add(GUILD, "abcdefghijk").await,
            Err(PrefixError::TooLong)
        ));
        for i in 0..MAX_CUSTOM_PREFIXES {
            store.add(GUILD, &format!("p{}", i)).await.unwrap();
        }
        assert!(matches!(store.add(GUILD, "last").await, Err(PrefixError::TooMany)));
        assert_eq!(store.active(Some(GUILD)).await.len(), 10);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = store().await;
        store.add(GUILD, "!").await.unwrap();
        store.add(GUILD, "$").await.unwrap();
        assert!(matches!(
            store.remove(GUILD, "%").await,
            Err(PrefixError::NotFound(_))
        ));
        store.remove(GUILD, "!").await.unwrap();
        assert_eq!(store.custom(GUILD).await, vec!["$"]);
        assert_eq!(store.clear(GUILD).await.unwrap(), 1);
        assert!(store.custom(GUILD).await.is_empty());
    }

    #[tokio::test]
    async fn test_cache_reloaded_from_disk() {
        let pool = crate::db::memory().await;
        let store = PrefixStore::connect(pool.clone()).await.unwrap();
        store.add(GUILD, "!").await.unwrap();
        drop(store);
        let reloaded = PrefixStore::connect(pool).await.unwrap();
        assert_eq!(reloaded.custom(GUILD).await, vec!["!"]);
    }

    #[tokio::test]
    async fn test_strip_prefers_longest() {
        let store = store().await;
        store.add(GUILD, "i").await.unwrap();
        store.add(GUILD, "i.x").await.unwrap();
        assert_eq!(store.strip(Some(GUILD), "i.ping").await, Some(("i.", "ping")));
        assert_eq!(store.strip(Some(GUILD), "i.xping").await, Some(("i.x", "ping")));
        assert_eq!(store.strip(Some(GUILD), "iping").await, Some(("i", "ping")));
        assert_eq!(store.strip(None, "iping").await, None);
        assert_eq!(store.strip(Some(OTHER), "!ping").await, None);
    }
}

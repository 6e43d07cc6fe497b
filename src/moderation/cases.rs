//! The moderation case log. Cases are append-only; ids count up from 1 in each guild.

use std::fmt;

use poise::serenity_prelude as serenity;
use serenity::{ChannelId, Colour, GuildId, UserId};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::db::{from_db, to_db};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Kick,
    Ban,
    Unban,
    Warn,
    Timeout,
    Untimeout,
}

impl Action {
    pub(crate) const ALL: [Action; 6] = [
        Self::Kick,
        Self::Ban,
        Self::Unban,
        Self::Warn,
        Self::Timeout,
        Self::Untimeout,
    ];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Kick => "kick",
            Self::Ban => "ban",
            Self::Unban => "unban",
            Self::Warn => "warn",
            Self::Timeout => "timeout",
            Self::Untimeout => "untimeout",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    pub(crate) fn past_tense(self) -> &'static str {
        match self {
            Self::Kick => "kicked",
            Self::Ban => "banned",
            Self::Unban => "unbanned",
            Self::Warn => "warned",
            Self::Timeout => "timed out",
            Self::Untimeout => "released from timeout",
        }
    }

    pub(crate) fn colour(self) -> Colour {
        match self {
            Self::Warn => Colour(0xF39C12),
            Self::Timeout => Colour(0xF1C40F),
            Self::Kick => Colour(0xE67E22),
            Self::Ban => Colour(0xE74C3C),
            Self::Unban => Colour(0x2ECC71),
            Self::Untimeout => Colour(0x3498DB),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.as_str();
        let mut chars = name.chars();
        if let Some(first) = chars.next() {
            write!(f, "{}{}", first.to_ascii_uppercase(), chars.as_str())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Case {
    pub(crate) guild_id: GuildId,
    pub(crate) case_id: i64,
    pub(crate) user_id: UserId,
    pub(crate) moderator_id: UserId,
    pub(crate) action: Action,
    pub(crate) reason: String,
    /// Humanised, only for timeouts.
    pub(crate) duration: Option<String>,
    /// Unix seconds.
    pub(crate) created_at: i64,
}

/// A case that hasn't been numbered yet.
pub(crate) struct NewCase<'a> {
    pub(crate) guild_id: GuildId,
    pub(crate) user_id: UserId,
    pub(crate) moderator_id: UserId,
    pub(crate) action: Action,
    pub(crate) reason: &'a str,
    pub(crate) duration: Option<&'a str>,
}

#[derive(sqlx::FromRow)]
struct CaseRow {
    guild_id: i64,
    case_id: i64,
    user_id: i64,
    moderator_id: i64,
    action: String,
    reason: String,
    duration: Option<String>,
    created_at: i64,
}

impl TryFrom<CaseRow> for Case {
    type Error = sqlx::Error;

    fn try_from(row: CaseRow) -> Result<Self, Self::Error> {
        let action = Action::parse(&row.action).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown moderation action {:?}", row.action).into())
        })?;
        Ok(Case {
            guild_id: GuildId::new(from_db(row.guild_id)),
            case_id: row.case_id,
            user_id: UserId::new(from_db(row.user_id)),
            moderator_id: UserId::new(from_db(row.moderator_id)),
            action,
            reason: row.reason,
            duration: row.duration,
            created_at: row.created_at,
        })
    }
}

const CASE_COLUMNS: &str =
    "guild_id, case_id, user_id, moderator_id, action, reason, duration, created_at";

pub(crate) struct CaseStore {
    pool: SqlitePool,
}

impl CaseStore {
    pub(crate) async fn connect(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cases (
                guild_id INTEGER NOT NULL,
                case_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                moderator_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                reason TEXT NOT NULL,
                duration TEXT,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (guild_id, case_id)
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS modlog_channels (
                guild_id INTEGER PRIMARY KEY,
                channel_id INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Appends a case. The id is allocated in the same statement, so concurrent actions in one
    /// guild can't collide.
    pub(crate) async fn record(&self, new: &NewCase<'_>) -> Result<Case, sqlx::Error> {
        let created_at = OffsetDateTime::now_utc().unix_timestamp();
        let case_id: i64 = sqlx::query_scalar(
            "INSERT INTO cases
                (guild_id, case_id, user_id, moderator_id, action, reason, duration, created_at)
             SELECT ?1, COALESCE(MAX(case_id), 0) + 1, ?2, ?3, ?4, ?5, ?6, ?7
             FROM cases WHERE guild_id = ?1
             RETURNING case_id",
        )
        .bind(to_db(new.guild_id.get()))
        .bind(to_db(new.user_id.get()))
        .bind(to_db(new.moderator_id.get()))
        .bind(new.action.as_str())
        .bind(new.reason)
        .bind(new.duration)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(Case {
            guild_id: new.guild_id,
            case_id,
            user_id: new.user_id,
            moderator_id: new.moderator_id,
            action: new.action,
            reason: new.reason.to_string(),
            duration: new.duration.map(str::to_string),
            created_at,
        })
    }

    pub(crate) async fn get(&self, guild: GuildId, case_id: i64) -> Result<Option<Case>, sqlx::Error> {
        let row: Option<CaseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cases WHERE guild_id = ? AND case_id = ?",
            CASE_COLUMNS
        ))
        .bind(to_db(guild.get()))
        .bind(case_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Case::try_from).transpose()
    }

    /// All cases against a user in a guild, newest first.
    pub(crate) async fn history(&self, guild: GuildId, user: UserId) -> Result<Vec<Case>, sqlx::Error> {
        let rows: Vec<CaseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cases WHERE guild_id = ? AND user_id = ? ORDER BY case_id DESC",
            CASE_COLUMNS
        ))
        .bind(to_db(guild.get()))
        .bind(to_db(user.get()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Case::try_from).collect()
    }

    pub(crate) async fn modlog_channel(&self, guild: GuildId) -> Result<Option<ChannelId>, sqlx::Error> {
        let channel: Option<i64> =
            sqlx::query_scalar("SELECT channel_id FROM modlog_channels WHERE guild_id = ?")
                .bind(to_db(guild.get()))
                .fetch_optional(&self.pool)
                .await?;
        Ok(channel.map(|c| ChannelId::new(from_db(c))))
    }

    pub(crate) async fn set_modlog_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO modlog_channels (guild_id, channel_id) VALUES (?, ?)
             ON CONFLICT(guild_id) DO UPDATE SET channel_id = excluded.channel_id",
        )
        .bind(to_db(guild.get()))
        .bind(to_db(channel.get()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(10);
    const OTHER_GUILD: GuildId = GuildId::new(11);
    const ALICE: UserId = UserId::new(100);
    const BOB: UserId = UserId::new(200);
    const MOD: UserId = UserId::new(300);

    async fn store() -> CaseStore {
        CaseStore::connect(crate::db::memory().await).await.unwrap()
    }

    fn new_case<'a>(guild: GuildId, user: UserId, action: Action, reason: &'a str) -> NewCase<'a> {
        NewCase {
            guild_id: guild,
            user_id: user,
            moderator_id: MOD,
            action,
            reason,
            duration: None,
        }
    }

    #[test]
    fn test_action_names() {
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
        assert_eq!(Action::parse("yeet"), None);
        assert_eq!(Action::Untimeout.to_string(), "Untimeout");
        assert_eq!(Action::Ban.colour(), Colour(0xE74C3C));
    }

    #[tokio::test]
    async fn test_ids_are_sequential_per_guild() {
        let store = store().await;
        let first = store.record(&new_case(GUILD, ALICE, Action::Warn, "spam")).await.unwrap();
        let second = store.record(&new_case(GUILD, BOB, Action::Kick, "rude")).await.unwrap();
        let elsewhere = store
            .record(&new_case(OTHER_GUILD, ALICE, Action::Ban, "raid"))
            .await
            .unwrap();
        assert_eq!(first.case_id, 1);
        assert_eq!(second.case_id, 2);
        assert_eq!(elsewhere.case_id, 1);
    }

    #[tokio::test]
    async fn test_recorded_case_reads_back() {
        let store = store().await;
        let recorded = store
            .record(&NewCase {
                duration: Some("1h 30m"),
                ..new_case(GUILD, ALICE, Action::Timeout, "calm down")
            })
            .await
            .unwrap();
        let fetched = store.get(GUILD, recorded.case_id).await.unwrap().unwrap();
        assert_eq!(fetched, recorded);
        assert_eq!(fetched.action, Action::Timeout);
        assert_eq!(fetched.reason, "calm down");
        assert_eq!(fetched.duration.as_deref(), Some("1h 30m"));
        assert!(store.get(GUILD, 99).await.unwrap().is_none());
        assert!(store.get(OTHER_GUILD, recorded.case_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let store = store().await;
        for reason in ["one", "two", "three"] {
            store.record(&new_case(GUILD, ALICE, Action::Warn, reason)).await.unwrap();
        }
        store.record(&new_case(GUILD, BOB, Action::Warn, "other")).await.unwrap();
        let history = store.history(GUILD, ALICE).await.unwrap();
        let reasons: Vec<&str> = history.iter().map(|c| c.reason.as_str()).collect();
        assert_eq!(reasons, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn test_modlog_channel_upsert() {
        let store = store().await;
        assert_eq!(store.modlog_channel(GUILD).await.unwrap(), None);
        store.set_modlog_channel(GUILD, ChannelId::new(5)).await.unwrap();
        store.set_modlog_channel(GUILD, ChannelId::new(6)).await.unwrap();
        assert_eq!(
            store.modlog_channel(GUILD).await.unwrap(),
            Some(ChannelId::new(6))
        );
    }
}

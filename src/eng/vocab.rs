//! Personal vocabulary lists.

use poise::serenity_prelude::UserId;
use sqlx::SqlitePool;

use crate::db::to_db;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Saved {
    New(String),
    AlreadySaved(String),
}

pub(crate) struct VocabStore {
    pool: SqlitePool,
}

/// Words are stored lower-cased and trimmed. `None` if nothing is left.
pub(crate) fn normalize(word: &str) -> Option<String> {
    let word = word.trim().to_lowercase();
    (!word.is_empty()).then_some(word)
}

impl VocabStore {
    pub(crate) async fn connect(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vocabulary (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                word TEXT NOT NULL,
                UNIQUE(user_id, word)
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Callers normalize first; see [`normalize`].
    pub(crate) async fn save(&self, user: UserId, word: &str) -> Result<Saved, sqlx::Error> {
        let inserted = sqlx::query("INSERT OR IGNORE INTO vocabulary (user_id, word) VALUES (?, ?)")
            .bind(to_db(user.get()))
            .bind(word)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(if inserted == 0 {
            Saved::AlreadySaved(word.to_string())
        } else {
            Saved::New(word.to_string())
        })
    }

    /// A user's words in alphabetical order.
    pub(crate) async fn list(&self, user: UserId) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT word FROM vocabulary WHERE user_id = ? ORDER BY word")
            .bind(to_db(user.get()))
            .fetch_all(&self.pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> VocabStore {
        VocabStore::connect(crate::db::memory().await).await.unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Ubiquitous "), Some("ubiquitous".to_string()));
        assert_eq!(normalize("   "), None);
    }

    #[tokio::test]
    async fn test_duplicate_save_is_reported() {
        let store = store().await;
        let me = UserId::new(1);
        assert_eq!(store.save(me, "serene").await.unwrap(), Saved::New("serene".into()));
        assert_eq!(
            store.save(me, "serene").await.unwrap(),
            Saved::AlreadySaved("serene".into())
        );
        // other users have their own lists
        assert_eq!(
            store.save(UserId::new(2), "serene").await.unwrap(),
            Saved::New("serene".into())
        );
        assert_eq!(store.list(me).await.unwrap(), vec!["serene"]);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = store().await;
        let me = UserId::new(1);
        for word in ["ubiquitous", "diligent", "serene"] {
            store.save(me, word).await.unwrap();
        }
        assert_eq!(
            store.list(me).await.unwrap(),
            vec!["diligent", "serene", "ubiquitous"]
        );
        assert!(store.list(UserId::new(9)).await.unwrap().is_empty());
    }
}

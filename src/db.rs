//! SQLite plumbing. Every feature owns its own database file under the data directory.

use std::path::Path;

use anyhow::Context as _;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Opens (creating if needed) `<dir>/<file>`.
pub(crate) async fn open(dir: &Path, file: &str) -> anyhow::Result<SqlitePool> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("could not create {}", dir.display()))?;
    let path = dir.join(file);
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("could not open {}", path.display()))?;
    crate::logging::database!("Opened {}", path.display());
    Ok(pool)
}

/// A throwaway in-memory database. One connection, since each new connection to
/// `sqlite::memory:` would see an empty database.
#[cfg(test)]
pub(crate) async fn memory() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// Snowflakes go into SQLite's signed 64-bit integers bit for bit.
pub(crate) fn to_db(id: u64) -> i64 {
    id as i64
}

pub(crate) fn from_db(id: i64) -> u64 {
    id as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_roundtrip_high_bit() {
        let id = u64::MAX - 7;
        assert!(to_db(id) < 0);
        assert_eq!(from_db(to_db(id)), id);
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let dir = std::env::temp_dir().join(format!("lazybot-db-{}", uuid::Uuid::new_v4()));
        let pool = open(&dir, "test.db").await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
        assert!(dir.join("test.db").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

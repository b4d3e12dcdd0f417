//! Persistence Store: durable storage for scans and targets, single-writer
//! semantics, schedule queries. Backed by SQLite in WAL mode.

mod scan;
mod target;

pub use scan::ScanUpdate;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // Single-writer semantics: cap the pool small so SQLite's own write
        // lock is the only thing that ever serializes writers.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub async fn test_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::connect(path.to_str().unwrap()).await.unwrap();
        std::mem::forget(dir); // keep the tempdir alive for the store's lifetime
        store
    }

    #[tokio::test]
    async fn connect_creates_schema() {
        let store = test_store().await;
        let scans = store.list_scans().await.unwrap();
        assert!(scans.is_empty());
    }
}

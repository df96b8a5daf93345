//! SQLite-backed message store.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::{debug, info};

use tgrelay_core::{
    domain::{DeadLetter, RelayRecord},
    store::{MessageStore, StoreError},
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(db_error)?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database; keep exactly one alive.
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_opts.connect_with(opts).await.map_err(db_error)?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "message store ready");
        Ok(store)
    }

    pub async fn new_in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relayed_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                source_group_id INTEGER NOT NULL,
                source_group_name TEXT NOT NULL,
                target_group_id INTEGER NOT NULL,
                target_group_name TEXT NOT NULL,
                content TEXT,
                media_type TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (message_id, source_group_id, target_group_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dead_letters (
                message_id INTEGER NOT NULL,
                source_group_id INTEGER NOT NULL,
                source_group_name TEXT NOT NULL,
                target_group_id INTEGER NOT NULL,
                target_group_name TEXT NOT NULL,
                content TEXT,
                media_type TEXT,
                created_at TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                last_error TEXT NOT NULL,
                PRIMARY KEY (message_id, source_group_id, target_group_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    /// Number of messages recorded as relayed.
    pub async fn count_relayed(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM relayed_messages")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(&self, record: &RelayRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO relayed_messages
            (message_id, source_group_id, source_group_name, target_group_id,
             target_group_name, content, media_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.message_id.0)
        .bind(record.source_group_id.0)
        .bind(&record.source_group_name)
        .bind(record.target_group_id.0)
        .bind(&record.target_group_name)
        .bind(record.content.as_deref())
        .bind(record.media_type.as_deref())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        debug!(message_id = record.message_id.0, "stored relayed message");
        Ok(())
    }

    async fn park(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        let record = &letter.record;
        sqlx::query(
            r#"
            INSERT INTO dead_letters
            (message_id, source_group_id, source_group_name, target_group_id,
             target_group_name, content, media_type, created_at, attempts, last_error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (message_id, source_group_id, target_group_id)
            DO UPDATE SET attempts = excluded.attempts, last_error = excluded.last_error
            "#,
        )
        .bind(record.message_id.0)
        .bind(record.source_group_id.0)
        .bind(&record.source_group_name)
        .bind(record.target_group_id.0)
        .bind(&record.target_group_name)
        .bind(record.content.as_deref())
        .bind(record.media_type.as_deref())
        .bind(record.created_at)
        .bind(i64::from(letter.attempts))
        .bind(&letter.last_error)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        _ => StoreError::Other(e.to_string()),
    }
}

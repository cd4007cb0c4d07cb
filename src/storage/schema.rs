use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqlitePool, Transaction,
};
use std::str::FromStr;

use super::types::StoreError;
use crate::config::StoreConfig;

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

// ============================================================================
// Database
// ============================================================================

/// Connection pool plus schema management.
///
/// Cloning is cheap; clones share the pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database with default pool settings and run migrations.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Self::open_with(path, &StoreConfig::default()).await
    }

    /// Open a database connection pool and run migrations.
    ///
    /// File databases use WAL so readers never wait on the single writer.
    /// `:memory:` gets exactly one long-lived connection, since an in-memory
    /// database lives and dies with its connection.
    pub async fn open_with(path: &str, config: &StoreConfig) -> Result<Self, StoreError> {
        let in_memory = path == IN_MEMORY;

        let options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };
        let options = options
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());

        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(config.acquire_timeout());
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        tracing::debug!(path = %path, in_memory, "Opened database pool");

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Begin a write transaction that takes the database write lock up front.
    ///
    /// `BEGIN IMMEDIATE` makes concurrent writers queue on `busy_timeout`
    /// instead of failing when a read lock cannot be upgraded. Dropping the
    /// transaction without committing rolls it back.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Begin a read transaction so multi-statement reads share one snapshot.
    pub(crate) async fn begin_read(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self
            .begin_write()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Migration(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }
}

/// Schema, in dependency order.
///
/// Timestamps are UTC microseconds since the epoch. `tag_list` is a JSON
/// array of strings.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        bio TEXT NOT NULL DEFAULT '',
        image TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS follows (
        follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        followed_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (follower_id, followed_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        body TEXT NOT NULL,
        tag_list TEXT NOT NULL DEFAULT '[]',
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        favorites_count INTEGER NOT NULL DEFAULT 0 CHECK (favorites_count >= 0),
        version INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_author ON articles(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_articles_created ON articles(created_at DESC, id DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS favorites (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, article_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_favorites_article ON favorites(article_id)",
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        name TEXT PRIMARY KEY
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY,
        body TEXT NOT NULL,
        article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
        author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_comments_article ON comments(article_id)",
];

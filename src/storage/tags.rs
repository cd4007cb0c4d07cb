use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::types::StoreError;

/// Register tags in the shared vocabulary (idempotent).
///
/// One multi-row `INSERT OR IGNORE`; existing tags are left untouched.
pub(crate) async fn upsert_tags(conn: &mut SqliteConnection, tags: &[String]) -> Result<(), StoreError> {
    if tags.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("INSERT OR IGNORE INTO tags (name) ");
    builder.push_values(tags, |mut b, tag| {
        b.push_bind(tag);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

impl Database {
    // ========================================================================
    // Tag Registry
    // ========================================================================

    /// Add tags to the vocabulary outside of any article transaction.
    pub async fn register_tags(&self, tags: &[String]) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_tags(&mut conn, tags).await
    }

    /// All known tags, sorted by name.
    pub async fn list_tags(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

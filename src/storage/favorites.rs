use super::articles::article_id_for_slug;
use super::listing::ArticleQuery;
use super::schema::Database;
use super::types::{ArticleView, StoreError, Viewer};

impl Database {
    // ========================================================================
    // Favorite Toggling
    // ========================================================================

    /// Favorite an article for `user_id`, returning the refreshed article.
    ///
    /// Lookup, membership insert and counter bump run in one write
    /// transaction. The counter only moves when the insert created a row, so
    /// favoriting twice counts once and concurrent favoriters never lose an
    /// increment.
    pub async fn favorite_article(&self, slug: &str, user_id: i64) -> Result<ArticleView, StoreError> {
        let mut tx = self.begin_write().await?;
        let article_id = article_id_for_slug(&mut tx, slug).await?;

        let inserted = sqlx::query(
            "INSERT INTO favorites (user_id, article_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(article_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            sqlx::query("UPDATE articles SET favorites_count = favorites_count + 1 WHERE id = ?")
                .bind(article_id)
                .execute(&mut *tx)
                .await?;
        }

        let view = ArticleQuery::by_slug(slug, Viewer::User(user_id))
            .fetch_one(&mut tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        tx.commit().await?;
        Ok(view)
    }

    /// Remove `user_id`'s favorite, returning the refreshed article.
    ///
    /// Unfavoriting an article that was not favorited succeeds without
    /// touching the counter. The decrement is clamped at zero.
    pub async fn unfavorite_article(&self, slug: &str, user_id: i64) -> Result<ArticleView, StoreError> {
        let mut tx = self.begin_write().await?;
        let article_id = article_id_for_slug(&mut tx, slug).await?;

        let deleted = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND article_id = ?")
            .bind(user_id)
            .bind(article_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 1 {
            sqlx::query(
                "UPDATE articles SET favorites_count = favorites_count - 1 \
                 WHERE id = ? AND favorites_count > 0",
            )
            .bind(article_id)
            .execute(&mut *tx)
            .await?;
        }

        let view = ArticleQuery::by_slug(slug, Viewer::User(user_id))
            .fetch_one(&mut tx)
            .await?
            .ok_or(StoreError::NotFound)?;

        tx.commit().await?;
        Ok(view)
    }
}

use super::schema::Database;
use super::types::{from_micros, now_micros, Comment, StoreError, ValidationErrors};

impl Database {
    /// Insert a comment on an article.
    pub async fn insert_comment(
        &self,
        article_id: i64,
        author_id: i64,
        body: &str,
    ) -> Result<Comment, StoreError> {
        let mut errors = ValidationErrors::new();
        errors.check(!body.trim().is_empty(), "body", "must not be empty or whitespace only");
        errors.into_result()?;

        let now = now_micros();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO comments (body, article_id, author_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(body)
        .bind(article_id)
        .bind(author_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Comment {
            id,
            body: body.to_string(),
            article_id,
            author_id,
            created_at: from_micros(now),
            updated_at: from_micros(now),
        })
    }
}

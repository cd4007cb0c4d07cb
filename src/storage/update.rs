use sqlx::types::Json;

use super::schema::Database;
use super::types::{from_micros, now_micros, Article, StoreError};
use crate::util::generate_slug;

/// Result of a version-stamped compare-and-swap on an article row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The write landed; carries the new version, `updated_at` (µs) and the
    /// slug now stored for the article.
    Updated {
        version: i64,
        updated_at: i64,
        slug: String,
    },
    /// The row exists but its version moved on.
    Conflict,
    /// No row with that id.
    NotFound,
}

impl Database {
    // ========================================================================
    // Optimistic Updates
    // ========================================================================

    /// Write `article`'s title, description, body, slug and tags if its
    /// `version` still matches the stored one.
    ///
    /// On success the new version, `updated_at` and slug are written back
    /// into `article`. Tags are registered in the vocabulary before the swap
    /// and stay registered even if the swap loses. No retry happens here.
    pub async fn update_article(&self, article: &mut Article) -> Result<(), StoreError> {
        self.register_tags(&article.tag_list).await?;

        match self.compare_and_swap(article).await? {
            UpdateOutcome::Updated {
                version,
                updated_at,
                slug,
            } => {
                article.version = version;
                article.updated_at = from_micros(updated_at);
                article.slug = slug;
                Ok(())
            }
            UpdateOutcome::Conflict => Err(StoreError::EditConflict),
            UpdateOutcome::NotFound => Err(StoreError::NotFound),
        }
    }

    /// Conditional update on `(id, version)`; bumps the version by one and
    /// moves `updated_at` strictly forward.
    ///
    /// When the title differs from the stored one and the caller kept the
    /// stored slug, a fresh slug (never equal to the stored one) is written.
    /// A slug the caller already changed, e.g. via [`Article::retitle`], is
    /// written as given.
    pub async fn compare_and_swap(&self, article: &Article) -> Result<UpdateOutcome, StoreError> {
        let mut tx = self.begin_write().await?;

        let stored: Option<(String, String, i64)> =
            sqlx::query_as("SELECT title, slug, version FROM articles WHERE id = ?")
                .bind(article.id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((stored_title, stored_slug, stored_version)) = stored else {
            return Ok(UpdateOutcome::NotFound);
        };
        if stored_version != article.version {
            return Ok(UpdateOutcome::Conflict);
        }

        let slug = if article.title != stored_title && article.slug == stored_slug {
            let mut slug = generate_slug(&article.title);
            while slug == stored_slug {
                slug = generate_slug(&article.title);
            }
            slug
        } else {
            article.slug.clone()
        };

        let swapped: Option<(i64, i64)> = sqlx::query_as(
            r#"
            UPDATE articles
            SET title = ?, description = ?, body = ?, slug = ?, tag_list = ?,
                updated_at = MAX(?, updated_at + 1),
                version = version + 1
            WHERE id = ? AND version = ?
            RETURNING version, updated_at
        "#,
        )
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.body)
        .bind(&slug)
        .bind(Json(&article.tag_list))
        .bind(now_micros())
        .bind(article.id)
        .bind(article.version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        let outcome = match swapped {
            Some((version, updated_at)) => UpdateOutcome::Updated {
                version,
                updated_at,
                slug,
            },
            None => UpdateOutcome::Conflict,
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

use std::future::Future;
use std::time::Duration;

use super::listing::ListFilter;
use super::schema::Database;
use super::types::{Article, ArticlePage, ArticleView, NewArticle, StoreError, Viewer};
use crate::config::StoreConfig;

/// The article store facade consumed by the HTTP layer.
///
/// Every operation runs under a deadline. When it expires the in-flight
/// future is dropped, which rolls back any open transaction, and the caller
/// gets [`StoreError::Timeout`]. Nothing is retried.
#[derive(Clone)]
pub struct ArticleStore {
    db: Database,
    timeout: Duration,
}

impl ArticleStore {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Open the configured database and wrap it with the configured deadline.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let db = Database::open_with(&config.database_path, config).await?;
        Ok(Self::new(db, config.query_timeout()))
    }

    /// A handle sharing the same pool with a different per-operation deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            db: self.db.clone(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn deadline<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    /// Validate and insert a new article; the slug is derived from the title.
    pub async fn insert(&self, new: &NewArticle) -> Result<Article, StoreError> {
        new.validate()?;
        self.deadline(self.db.insert_article(new)).await
    }

    pub async fn get_by_slug(&self, slug: &str, viewer: Viewer) -> Result<ArticleView, StoreError> {
        self.deadline(self.db.get_article_view(slug, viewer)).await
    }

    pub async fn get_id_by_slug(&self, slug: &str) -> Result<i64, StoreError> {
        self.deadline(self.db.get_article_id_by_slug(slug)).await
    }

    /// The stored article with its version stamp, as input for [`Self::update`].
    pub async fn get_record_by_slug(&self, slug: &str) -> Result<Article, StoreError> {
        self.deadline(self.db.get_article_by_slug(slug)).await
    }

    pub async fn favorite_by_slug(&self, slug: &str, user_id: i64) -> Result<ArticleView, StoreError> {
        self.deadline(self.db.favorite_article(slug, user_id)).await
    }

    pub async fn unfavorite_by_slug(
        &self,
        slug: &str,
        user_id: i64,
    ) -> Result<ArticleView, StoreError> {
        self.deadline(self.db.unfavorite_article(slug, user_id)).await
    }

    /// Delete an article. Non-authors get `NotFound`, same as a missing slug.
    pub async fn delete_by_slug(&self, slug: &str, author_id: i64) -> Result<(), StoreError> {
        self.deadline(self.db.delete_article_by_slug(slug, author_id))
            .await
    }

    /// Optimistic update; fails with `EditConflict` if `article.version` is stale.
    pub async fn update(&self, article: &mut Article) -> Result<(), StoreError> {
        article.validate()?;
        self.deadline(self.db.update_article(article)).await
    }

    pub async fn list(&self, filter: &ListFilter, viewer: Viewer) -> Result<ArticlePage, StoreError> {
        self.deadline(self.db.list_articles(filter, viewer)).await
    }

    pub async fn tags(&self) -> Result<Vec<String>, StoreError> {
        self.deadline(self.db.list_tags()).await
    }
}

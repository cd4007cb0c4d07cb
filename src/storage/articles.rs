use sqlx::types::Json;
use sqlx::SqliteConnection;

use super::listing::ArticleQuery;
use super::schema::Database;
use super::tags::upsert_tags;
use super::types::{
    from_micros, now_micros, Article, ArticleDbRow, ArticleView, NewArticle, StoreError, Viewer,
};
use crate::util::generate_slug;

/// Attempts per insert before a slug collision is reported as `Duplicate`.
const SLUG_ATTEMPTS: usize = 3;

/// Resolve a slug to its article id on an existing connection or transaction.
pub(crate) async fn article_id_for_slug(
    conn: &mut SqliteConnection,
    slug: &str,
) -> Result<i64, StoreError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE slug = ?")
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|(id,)| id).ok_or(StoreError::NotFound)
}

impl Database {
    // ========================================================================
    // Article Mutations
    // ========================================================================

    /// Insert a new article, assigning its slug.
    ///
    /// The slug is not pre-checked. If the random suffix collides with an
    /// existing slug the insert is retried with a fresh one, up to
    /// `SLUG_ATTEMPTS` times. Tags are registered in the shared vocabulary in
    /// the same transaction.
    pub async fn insert_article(&self, new: &NewArticle) -> Result<Article, StoreError> {
        let mut tx = self.begin_write().await?;

        upsert_tags(&mut *tx, &new.tag_list).await?;

        let now = now_micros();
        let mut attempt = 0;
        let (id, slug) = loop {
            attempt += 1;
            let slug = generate_slug(&new.title);
            let result: Result<(i64,), _> = sqlx::query_as(
                r#"
                INSERT INTO articles
                    (slug, title, description, body, tag_list, author_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
            )
            .bind(&slug)
            .bind(&new.title)
            .bind(&new.description)
            .bind(&new.body)
            .bind(Json(&new.tag_list))
            .bind(new.author_id)
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await;

            match result.map_err(StoreError::from_sqlx) {
                Ok((id,)) => break (id, slug),
                Err(e) if e.is_duplicate() && attempt < SLUG_ATTEMPTS => continue,
                Err(e) => return Err(e),
            }
        };

        tx.commit().await?;

        Ok(Article {
            id,
            slug,
            title: new.title.clone(),
            description: new.description.clone(),
            body: new.body.clone(),
            tag_list: new.tag_list.clone(),
            created_at: from_micros(now),
            updated_at: from_micros(now),
            favorites_count: 0,
            version: 1,
            author_id: new.author_id,
        })
    }

    /// Hard-delete an article owned by `author_id`.
    ///
    /// Returns `NotFound` both when the slug does not exist and when the
    /// caller is not the author. Favorites and comments cascade.
    pub async fn delete_article_by_slug(&self, slug: &str, author_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM articles WHERE slug = ? AND author_id = ?")
            .bind(slug)
            .bind(author_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Get one article with body, author profile and flags for `viewer`.
    pub async fn get_article_view(&self, slug: &str, viewer: Viewer) -> Result<ArticleView, StoreError> {
        let mut conn = self.pool.acquire().await?;
        ArticleQuery::by_slug(slug, viewer)
            .fetch_one(&mut conn)
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Get the stored article, including its version stamp.
    pub async fn get_article_by_slug(&self, slug: &str) -> Result<Article, StoreError> {
        let row = sqlx::query_as::<_, ArticleDbRow>(
            r#"
            SELECT id, slug, title, description, body, tag_list, created_at, updated_at,
                   favorites_count, version, author_id
            FROM articles
            WHERE slug = ?
        "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ArticleDbRow::into_article).ok_or(StoreError::NotFound)
    }

    /// Resolve a slug to the article id.
    pub async fn get_article_id_by_slug(&self, slug: &str) -> Result<i64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        article_id_for_slug(&mut conn, slug).await
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, NewArticle, NewUser, StoreError, Viewer};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn test_user(db: &Database, name: &str) -> i64 {
        db.insert_user(&NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            bio: format!("{name}'s bio"),
            image: None,
        })
        .await
        .unwrap()
        .id
    }

    fn test_article(author_id: i64, title: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            description: "Test description".to_string(),
            body: "Test body".to_string(),
            tag_list: vec!["rust".to_string(), "sqlite".to_string()],
            author_id,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_slug_and_defaults() {
        let db = test_db().await;
        let alice = test_user(&db, "alice").await;

        let article = db.insert_article(&test_article(alice, "Hello World")).await.unwrap();
        assert!(article.id > 0);
        assert!(article.slug.starts_with("hello-world-"));
        assert_eq!(article.favorites_count, 0);
        assert_eq!(article.version, 1);
        assert_eq!(article.created_at, article.updated_at);

        let stored = db.get_article_by_slug(&article.slug).await.unwrap();
        assert_eq!(stored, article);
    }

    #[tokio::test]
    async fn test_insert_registers_tags() {
        let db = test_db().await;
        let alice = test_user(&db, "alice").await;
        db.insert_article(&test_article(alice, "Tagged")).await.unwrap();

        assert_eq!(db.list_tags().await.unwrap(), ["rust", "sqlite"]);
    }

    #[tokio::test]
    async fn test_insert_unknown_author_fails() {
        let db = test_db().await;
        let result = db.insert_article(&test_article(999, "Orphan")).await;
        assert!(matches!(result, Err(StoreError::Storage(_))));
    }

    #[tokio::test]
    async fn test_same_title_gets_distinct_slugs() {
        let db = test_db().await;
        let alice = test_user(&db, "alice").await;
        let a = db.insert_article(&test_article(alice, "Same")).await.unwrap();
        let b = db.insert_article(&test_article(alice, "Same")).await.unwrap();
        assert_ne!(a.slug, b.slug);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_get_view_includes_body_and_author() {
        let db = test_db().await;
        let alice = test_user(&db, "alice").await;
        let article = db.insert_article(&test_article(alice, "Viewed")).await.unwrap();

        let view = db.get_article_view(&article.slug, Viewer::Anonymous).await.unwrap();
        assert_eq!(view.body.as_deref(), Some("Test body"));
        assert_eq!(view.author.username, "alice");
        assert_eq!(view.author.bio, "alice's bio");
        assert!(!view.favorited);
        assert!(!view.author.following);
        assert_eq!(view.tag_list, ["rust", "sqlite"]);
    }

    #[tokio::test]
    async fn test_get_missing_slug_is_not_found() {
        let db = test_db().await;
        assert!(matches!(
            db.get_article_view("nope", Viewer::Anonymous).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.get_article_id_by_slug("nope").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.get_article_by_slug("nope").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_id_by_slug() {
        let db = test_db().await;
        let alice = test_user(&db, "alice").await;
        let article = db.insert_article(&test_article(alice, "Lookup")).await.unwrap();
        assert_eq!(db.get_article_id_by_slug(&article.slug).await.unwrap(), article.id);
    }

    #[tokio::test]
    async fn test_delete_by_non_author_is_not_found() {
        let db = test_db().await;
        let alice = test_user(&db, "alice").await;
        let mallory = test_user(&db, "mallory").await;
        let article = db.insert_article(&test_article(alice, "Keep")).await.unwrap();

        let result = db.delete_article_by_slug(&article.slug, mallory).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
        assert!(db.get_article_by_slug(&article.slug).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_cascades_favorites() {
        let db = test_db().await;
        let alice = test_user(&db, "alice").await;
        let bob = test_user(&db, "bob").await;
        let article = db.insert_article(&test_article(alice, "Gone")).await.unwrap();
        db.favorite_article(&article.slug, bob).await.unwrap();

        db.delete_article_by_slug(&article.slug, alice).await.unwrap();

        assert!(matches!(
            db.get_article_by_slug(&article.slug).await,
            Err(StoreError::NotFound)
        ));
        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM favorites")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    /// Counts events emitted from this crate while installed as the default subscriber.
    struct CrateEvents(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CrateEvents {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().target().starts_with("conduit_store") {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_mutations_and_failures_emit_no_events() {
        use tracing_subscriber::layer::SubscriberExt;

        let db = test_db().await;
        let alice = test_user(&db, "alice").await;

        let events = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(CrateEvents(events.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let article = db.insert_article(&test_article(alice, "Quiet")).await.unwrap();
        assert!(db.insert_article(&test_article(999, "Orphan")).await.is_err());
        assert!(db.delete_article_by_slug(&article.slug, 999).await.is_err());
        assert!(db.get_article_by_slug("missing").await.is_err());

        assert_eq!(events.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::schema::Database;
use super::types::{ArticlePage, ArticleView, ArticleViewRow, StoreError, ValidationErrors, Viewer};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Page size when the caller does not pick one
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Largest page a single listing may return
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Longest accepted tag/author/favorited filter value
pub const MAX_FILTER_LEN: usize = 50;

// ============================================================================
// Filters
// ============================================================================

/// Listing filters and pagination. Absent filters do not constrain the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub tag: Option<String>,
    pub author: Option<String>,
    pub favorited_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            tag: None,
            author: None,
            favorited_by: None,
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl ListFilter {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn author(mut self, username: impl Into<String>) -> Self {
        self.author = Some(username.into());
        self
    }

    pub fn favorited_by(mut self, username: impl Into<String>) -> Self {
        self.favorited_by = Some(username.into());
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        let mut errors = ValidationErrors::new();
        for (field, value) in [
            ("tag", &self.tag),
            ("author", &self.author),
            ("favorited", &self.favorited_by),
        ] {
            if let Some(value) = value {
                errors.check(
                    !value.is_empty() && value.len() <= MAX_FILTER_LEN,
                    field,
                    format!("must be between 1 and {MAX_FILTER_LEN} characters"),
                );
                errors.check(
                    value
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
                    field,
                    "must contain only letters, digits, '-' or '_'",
                );
            }
        }
        errors.check(
            (1..=MAX_PAGE_LIMIT).contains(&self.limit),
            "limit",
            format!("must be between 1 and {MAX_PAGE_LIMIT}"),
        );
        errors.check(self.offset >= 0, "offset", "must not be negative");
        errors.into_result()
    }
}

// ============================================================================
// Query Builder
// ============================================================================

/// One conjunctive WHERE clause with its binding.
#[derive(Debug, Clone)]
enum Predicate {
    Slug(String),
    Tag(String),
    Author(String),
    FavoritedBy(String),
}

impl Predicate {
    /// Appends ` AND <clause>` to `qb`. Every clause references `a` only, so
    /// the same predicates work for the projection and the count query.
    fn push(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        match self {
            Predicate::Slug(slug) => {
                qb.push(" AND a.slug = ");
                qb.push_bind(slug.clone());
            }
            Predicate::Tag(tag) => {
                qb.push(" AND EXISTS (SELECT 1 FROM json_each(a.tag_list) jt WHERE jt.value = ");
                qb.push_bind(tag.clone());
                qb.push(")");
            }
            Predicate::Author(username) => {
                qb.push(" AND a.author_id = (SELECT id FROM users WHERE username = ");
                qb.push_bind(username.clone());
                qb.push(")");
            }
            Predicate::FavoritedBy(username) => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM favorites fb JOIN users fu ON fu.id = fb.user_id \
                     WHERE fb.article_id = a.id AND fu.username = ",
                );
                qb.push_bind(username.clone());
                qb.push(")");
            }
        }
    }
}

/// Viewer-aware article query.
///
/// Accumulates predicates and compiles them into a single projection query
/// that joins the author and left-joins the viewer's favorite and follow
/// rows, so every row carries its `favorited`/`following` flags without a
/// second round trip. The matching count query reuses the predicates with
/// no joins.
#[derive(Debug, Clone)]
pub(crate) struct ArticleQuery {
    viewer: Viewer,
    predicates: Vec<Predicate>,
    include_body: bool,
}

impl ArticleQuery {
    pub(crate) fn for_viewer(viewer: Viewer) -> Self {
        Self {
            viewer,
            predicates: Vec::new(),
            include_body: false,
        }
    }

    /// Single-article lookup; includes the body.
    pub(crate) fn by_slug(slug: &str, viewer: Viewer) -> Self {
        let mut query = Self::for_viewer(viewer);
        query.predicates.push(Predicate::Slug(slug.to_string()));
        query.include_body = true;
        query
    }

    /// Adds a predicate for each filter actually supplied.
    pub(crate) fn filtered(mut self, filter: &ListFilter) -> Self {
        if let Some(tag) = &filter.tag {
            self.predicates.push(Predicate::Tag(tag.clone()));
        }
        if let Some(author) = &filter.author {
            self.predicates.push(Predicate::Author(author.clone()));
        }
        if let Some(username) = &filter.favorited_by {
            self.predicates.push(Predicate::FavoritedBy(username.clone()));
        }
        self
    }

    fn push_predicates(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        for predicate in &self.predicates {
            predicate.push(qb);
        }
    }

    /// Projection query, newest first with id as tiebreaker.
    pub(crate) fn select(&self, page: Option<(i64, i64)>) -> QueryBuilder<'static, Sqlite> {
        let viewer_id = self.viewer.id();
        let mut qb: QueryBuilder<'static, Sqlite> = QueryBuilder::new(
            "SELECT a.id, a.slug, a.title, a.description, ",
        );
        qb.push(if self.include_body {
            "a.body"
        } else {
            "NULL AS body"
        });
        qb.push(
            ", a.tag_list, a.created_at, a.updated_at, a.favorites_count, a.version, \
             u.username AS author_username, u.bio AS author_bio, u.image AS author_image, \
             (fav.user_id IS NOT NULL) AS favorited, \
             (fol.follower_id IS NOT NULL AND a.author_id <> ",
        );
        // A user is never shown as following themselves
        qb.push_bind(viewer_id);
        qb.push(
            ") AS following \
             FROM articles a \
             JOIN users u ON u.id = a.author_id \
             LEFT JOIN favorites fav ON fav.article_id = a.id AND fav.user_id = ",
        );
        qb.push_bind(viewer_id);
        qb.push(" LEFT JOIN follows fol ON fol.followed_id = a.author_id AND fol.follower_id = ");
        qb.push_bind(viewer_id);

        self.push_predicates(&mut qb);
        qb.push(" ORDER BY a.created_at DESC, a.id DESC");

        if let Some((limit, offset)) = page {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
            qb.push(" OFFSET ");
            qb.push_bind(offset);
        }
        qb
    }

    /// Total number of matching articles, ignoring pagination.
    pub(crate) fn count(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb: QueryBuilder<'static, Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM articles a");
        self.push_predicates(&mut qb);
        qb
    }

    /// Fetch the first matching article on an existing connection or transaction.
    pub(crate) async fn fetch_one(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Option<ArticleView>, StoreError> {
        let mut qb = self.select(None);
        let row: Option<ArticleViewRow> = qb.build_query_as().fetch_optional(&mut *conn).await?;
        Ok(row.map(ArticleViewRow::into_view))
    }
}

impl Database {
    // ========================================================================
    // Listing
    // ========================================================================

    /// List articles matching `filter`, annotated for `viewer`, plus the
    /// total number of matches.
    ///
    /// The page and the count run inside one read transaction so they agree.
    /// Bodies are omitted from the projection.
    pub async fn list_articles(
        &self,
        filter: &ListFilter,
        viewer: Viewer,
    ) -> Result<ArticlePage, StoreError> {
        filter.validate()?;

        let query = ArticleQuery::for_viewer(viewer).filtered(filter);
        tracing::debug!(
            tag = ?filter.tag,
            author = ?filter.author,
            favorited_by = ?filter.favorited_by,
            limit = filter.limit,
            offset = filter.offset,
            anonymous = viewer.is_anonymous(),
            "list_articles"
        );

        let mut tx = self.begin_read().await?;

        let mut select = query.select(Some((filter.limit, filter.offset)));
        let rows: Vec<ArticleViewRow> = select.build_query_as().fetch_all(&mut *tx).await?;

        let mut count = query.count();
        let (articles_count,): (i64,) = count.build_query_as().fetch_one(&mut *tx).await?;

        tx.commit().await?;

        Ok(ArticlePage {
            articles: rows.into_iter().map(ArticleViewRow::into_view).collect(),
            articles_count,
        })
    }
}

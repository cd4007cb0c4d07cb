use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use thiserror::Error;

use crate::util::generate_slug;

// ============================================================================
// Error Types
// ============================================================================

/// Typed failures returned by every store operation.
///
/// The store never logs a failure; each one is handed back to the caller,
/// which maps it to a transport status.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Slug or id does not resolve, or the caller does not own the row.
    #[error("record not found")]
    NotFound,

    /// The article changed since the caller read it.
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// A unique constraint rejected the write.
    #[error("duplicate value: {0}")]
    Duplicate(String),

    /// Caller-supplied input violates a constraint the store enforces.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// The operation exceeded its deadline; any open transaction was rolled back.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Migration failed
    #[error("database migration failed: {0}")]
    Migration(String),

    /// Unclassified storage failure
    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, surfacing unique-constraint violations as `Duplicate`.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Duplicate(db_err.message().to_string());
            }
        }
        StoreError::Storage(err)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

/// Field-level validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field` unless `ok` holds. The first message per field wins.
    pub fn check(&mut self, ok: bool, field: &'static str, message: impl Into<String>) {
        if !ok {
            self.0.entry(field).or_insert_with(|| message.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// `Ok(())` when nothing was recorded, otherwise `StoreError::Validation`.
    pub fn into_result(self) -> Result<(), StoreError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

fn not_blank(s: &str) -> bool {
    !s.trim().is_empty()
}

fn all_unique(items: &[String]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    items.iter().all(|item| seen.insert(item.as_str()))
}

// ============================================================================
// Timestamps
// ============================================================================

/// Current time as UTC microseconds since the epoch (storage representation).
pub(crate) fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

// ============================================================================
// Viewer / Users
// ============================================================================

/// Id used for anonymous viewers. Row ids start at 1, so it never matches.
pub const ANONYMOUS_VIEWER_ID: i64 = -1;

/// The (possibly anonymous) user a read is personalized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(i64),
}

impl Viewer {
    /// Id bound into viewer-constrained joins.
    pub fn id(self) -> i64 {
        match self {
            Viewer::Anonymous => ANONYMOUS_VIEWER_ID,
            Viewer::User(id) => id,
        }
    }

    pub fn is_anonymous(self) -> bool {
        matches!(self, Viewer::Anonymous)
    }
}

impl From<&User> for Viewer {
    fn from(user: &User) -> Self {
        Viewer::User(user.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub bio: String,
    pub image: Option<String>,
}

/// Public view of a user relative to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub username: String,
    pub bio: String,
    pub image: Option<String>,
    pub following: bool,
}

// ============================================================================
// Articles
// ============================================================================

/// Input for creating an article.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    pub author_id: i64,
}

impl NewArticle {
    /// Title, description and body must carry text; tags must be distinct.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut errors = ValidationErrors::new();
        check_article_fields(
            &mut errors,
            &self.title,
            &self.description,
            &self.body,
            &self.tag_list,
        );
        errors.into_result()
    }
}

fn check_article_fields(
    errors: &mut ValidationErrors,
    title: &str,
    description: &str,
    body: &str,
    tag_list: &[String],
) {
    errors.check(not_blank(title), "title", "must not be empty or whitespace only");
    errors.check(
        not_blank(description),
        "description",
        "must not be empty or whitespace only",
    );
    errors.check(not_blank(body), "body", "must not be empty or whitespace only");
    errors.check(all_unique(tag_list), "tagList", "must not contain duplicate tags");
}

/// The persisted article entity.
///
/// `version` is the optimistic-concurrency stamp: pass the article back to
/// `update` unchanged in that field and the write only lands if nobody else
/// updated it in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub favorites_count: i64,
    pub version: i64,
    pub author_id: i64,
}

impl Article {
    /// Sets a new title, regenerating the slug when the title changed.
    ///
    /// Returns whether the title (and therefore the slug) changed.
    pub fn retitle(&mut self, title: impl Into<String>) -> bool {
        let title = title.into();
        if title == self.title {
            return false;
        }
        let previous = std::mem::take(&mut self.slug);
        let mut slug = generate_slug(&title);
        while slug == previous {
            slug = generate_slug(&title);
        }
        self.slug = slug;
        self.title = title;
        true
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        let mut errors = ValidationErrors::new();
        check_article_fields(
            &mut errors,
            &self.title,
            &self.description,
            &self.body,
            &self.tag_list,
        );
        errors.into_result()
    }
}

/// An article as shown to one viewer.
///
/// `body` is `None` in list projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleView {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub version: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub tag_list: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub favorited: bool,
    pub favorites_count: i64,
    pub author: Profile,
}

/// One page of a listing plus the total number of matching articles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    pub articles: Vec<ArticleView>,
    pub articles_count: i64,
}

/// Stored result of a comment insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: i64,
    pub body: String,
    pub article_id: i64,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for stored article queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tag_list: Json<Vec<String>>,
    pub created_at: i64,
    pub updated_at: i64,
    pub favorites_count: i64,
    pub version: i64,
    pub author_id: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            slug: self.slug,
            title: self.title,
            description: self.description,
            body: self.body,
            tag_list: self.tag_list.0,
            created_at: from_micros(self.created_at),
            updated_at: from_micros(self.updated_at),
            favorites_count: self.favorites_count,
            version: self.version,
            author_id: self.author_id,
        }
    }
}

/// Row produced by the viewer-aware projection (article + author + flags)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleViewRow {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: Option<String>,
    pub tag_list: Json<Vec<String>>,
    pub created_at: i64,
    pub updated_at: i64,
    pub favorites_count: i64,
    pub version: i64,
    pub author_username: String,
    pub author_bio: String,
    pub author_image: Option<String>,
    pub favorited: bool,
    pub following: bool,
}

impl ArticleViewRow {
    pub(crate) fn into_view(self) -> ArticleView {
        ArticleView {
            id: self.id,
            version: self.version,
            slug: self.slug,
            title: self.title,
            description: self.description,
            body: self.body,
            tag_list: self.tag_list.0,
            created_at: from_micros(self.created_at),
            updated_at: from_micros(self.updated_at),
            favorited: self.favorited,
            favorites_count: self.favorites_count,
            author: Profile {
                username: self.author_username,
                bio: self.author_bio,
                image: self.author_image,
                following: self.following,
            },
        }
    }
}

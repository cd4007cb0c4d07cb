mod articles;
mod comments;
mod favorites;
mod listing;
mod schema;
mod store;
mod tags;
mod types;
mod update;
mod users;

pub use listing::{ListFilter, DEFAULT_PAGE_LIMIT, MAX_FILTER_LEN, MAX_PAGE_LIMIT};
pub use schema::{Database, IN_MEMORY};
pub use store::ArticleStore;
pub use types::{
    Article, ArticlePage, ArticleView, Comment, NewArticle, NewUser, Profile, StoreError, User,
    ValidationErrors, Viewer, ANONYMOUS_VIEWER_ID,
};
pub use update::UpdateOutcome;

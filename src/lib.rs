//! Article storage engine for a social-content API.
//!
//! The [`storage::ArticleStore`] facade is the only entry point an HTTP layer
//! needs: inserting articles, viewer-aware reads, transactional favorite
//! toggling, optimistic updates and filtered listing.
pub mod config;
pub mod storage;
pub mod util;

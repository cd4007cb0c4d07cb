//! Utility functions for common operations.
//!
//! - **Slug generation**: URL-safe article identifiers derived from titles
//!
//! # Examples
//!
//! ```
//! use conduit_store::util::generate_slug;
//!
//! let slug = generate_slug("Hello, World!");
//! assert!(slug.starts_with("hello-world-"));
//! ```

mod slug;

pub use slug::{generate_slug, generate_slug_with, normalize_title, SLUG_SUFFIX_LEN};

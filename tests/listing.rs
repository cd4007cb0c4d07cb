//! Integration tests for filtered, paginated article listings.
//!
//! The fixture has three authors, a handful of tagged articles and a few
//! favorites, so every filter has both matching and non-matching rows.

use std::time::Duration;

use conduit_store::storage::{
    Article, ArticleStore, Database, ListFilter, NewArticle, NewUser, StoreError, User, Viewer,
    MAX_PAGE_LIMIT,
};
use pretty_assertions::assert_eq;

struct Fixture {
    store: ArticleStore,
    alice: User,
    bob: User,
    carol: User,
    /// In insertion order, oldest first
    articles: Vec<Article>,
}

async fn add_user(store: &ArticleStore, name: &str) -> User {
    store
        .database()
        .insert_user(&NewUser {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            bio: String::new(),
            image: None,
        })
        .await
        .unwrap()
}

async fn fixture() -> Fixture {
    let db = Database::open(":memory:").await.unwrap();
    let store = ArticleStore::new(db, Duration::from_secs(5));
    let alice = add_user(&store, "alice").await;
    let bob = add_user(&store, "bob").await;
    let carol = add_user(&store, "carol").await;

    let specs: [(&str, &[&str], &User); 7] = [
        ("Rust Ownership", &["rust", "memory"], &alice),
        ("SQLite Internals", &["sqlite"], &bob),
        ("Async Rust", &["rust", "async"], &alice),
        ("Pagination Patterns", &["sqlite", "api"], &bob),
        ("Untagged Musings", &[], &carol),
        ("Borrow Checker Tips", &["rust"], &bob),
        ("Write Ahead Logging", &["sqlite"], &alice),
    ];

    let mut articles = Vec::new();
    for (title, tags, author) in specs {
        let article = store
            .insert(&NewArticle {
                title: title.to_string(),
                description: format!("About {}", title),
                body: format!("Body of {}", title),
                tag_list: tags.iter().map(|t| t.to_string()).collect(),
                author_id: author.id,
            })
            .await
            .unwrap();
        articles.push(article);
        // Keep created_at strictly increasing across inserts
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // carol favorites the first and fourth articles, bob favorites the first
    store
        .favorite_by_slug(&articles[0].slug, carol.id)
        .await
        .unwrap();
    store
        .favorite_by_slug(&articles[3].slug, carol.id)
        .await
        .unwrap();
    store
        .favorite_by_slug(&articles[0].slug, bob.id)
        .await
        .unwrap();

    Fixture {
        store,
        alice,
        bob,
        carol,
        articles,
    }
}

fn slugs_newest_first(articles: &[Article], pick: &[usize]) -> Vec<String> {
    let mut picked: Vec<usize> = pick.to_vec();
    picked.sort_unstable_by(|a, b| b.cmp(a));
    picked.into_iter().map(|i| articles[i].slug.clone()).collect()
}

async fn listed_slugs(f: &Fixture, filter: &ListFilter) -> (Vec<String>, i64) {
    let page = f.store.list(filter, Viewer::Anonymous).await.unwrap();
    let slugs = page.articles.into_iter().map(|a| a.slug).collect();
    (slugs, page.articles_count)
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_unfiltered_listing_is_newest_first() {
    let f = fixture().await;
    let page = f
        .store
        .list(&ListFilter::default(), Viewer::Anonymous)
        .await
        .unwrap();

    assert_eq!(page.articles_count, 7);
    let slugs: Vec<String> = page.articles.iter().map(|a| a.slug.clone()).collect();
    assert_eq!(slugs, slugs_newest_first(&f.articles, &[0, 1, 2, 3, 4, 5, 6]));
    assert!(page.articles.iter().all(|a| a.body.is_none()));
    assert!(page
        .articles
        .windows(2)
        .all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn test_filter_by_tag() {
    let f = fixture().await;
    let (slugs, count) = listed_slugs(&f, &ListFilter::default().tag("rust")).await;
    assert_eq!(count, 3);
    assert_eq!(slugs, slugs_newest_first(&f.articles, &[0, 2, 5]));

    let (slugs, count) = listed_slugs(&f, &ListFilter::default().tag("nothing")).await;
    assert_eq!(count, 0);
    assert!(slugs.is_empty());
}

#[tokio::test]
async fn test_filter_by_author() {
    let f = fixture().await;
    let (slugs, count) = listed_slugs(&f, &ListFilter::default().author("bob")).await;
    assert_eq!(count, 3);
    assert_eq!(slugs, slugs_newest_first(&f.articles, &[1, 3, 5]));

    // Unknown author yields an empty page, not an error
    let (slugs, count) = listed_slugs(&f, &ListFilter::default().author("nobody")).await;
    assert_eq!(count, 0);
    assert!(slugs.is_empty());
}

#[tokio::test]
async fn test_filter_by_favorited() {
    let f = fixture().await;
    let (slugs, count) = listed_slugs(&f, &ListFilter::default().favorited_by("carol")).await;
    assert_eq!(count, 2);
    assert_eq!(slugs, slugs_newest_first(&f.articles, &[0, 3]));
}

#[tokio::test]
async fn test_filters_combine_conjunctively() {
    let f = fixture().await;
    let filter = ListFilter::default().tag("sqlite").author("bob");
    let (slugs, count) = listed_slugs(&f, &filter).await;
    assert_eq!(count, 2);
    assert_eq!(slugs, slugs_newest_first(&f.articles, &[1, 3]));

    let filter = ListFilter::default()
        .tag("sqlite")
        .author("bob")
        .favorited_by("carol");
    let (slugs, count) = listed_slugs(&f, &filter).await;
    assert_eq!(count, 1);
    assert_eq!(slugs, vec![f.articles[3].slug.clone()]);
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_pages_concatenate_to_full_listing() {
    let f = fixture().await;
    let (full, total) = listed_slugs(&f, &ListFilter::default().page(MAX_PAGE_LIMIT, 0)).await;

    let mut stitched = Vec::new();
    for offset in (0..total).step_by(3) {
        let (page, count) = listed_slugs(&f, &ListFilter::default().page(3, offset)).await;
        assert_eq!(count, total);
        assert!(page.len() <= 3);
        stitched.extend(page);
    }
    assert_eq!(stitched, full);
}

#[tokio::test]
async fn test_offset_past_end_keeps_total() {
    let f = fixture().await;
    let (slugs, count) = listed_slugs(&f, &ListFilter::default().tag("rust").page(5, 40)).await;
    assert!(slugs.is_empty());
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_invalid_filters_rejected() {
    let f = fixture().await;
    for filter in [
        ListFilter::default().tag("no spaces"),
        ListFilter::default().author("x".repeat(51)),
        ListFilter::default().favorited_by(""),
        ListFilter::default().page(0, 0),
        ListFilter::default().page(MAX_PAGE_LIMIT + 1, 0),
        ListFilter::default().page(10, -1),
    ] {
        let err = f.store.list(&filter, Viewer::Anonymous).await.unwrap_err();
        assert!(
            matches!(err, StoreError::Validation(_)),
            "{:?} should be rejected",
            filter
        );
    }
}

// ============================================================================
// Viewer-relative flags
// ============================================================================

#[tokio::test]
async fn test_flags_rendered_for_viewer() {
    let f = fixture().await;
    f.store
        .database()
        .follow_user(f.carol.id, f.alice.id)
        .await
        .unwrap();

    let page = f
        .store
        .list(&ListFilter::default(), Viewer::from(&f.carol))
        .await
        .unwrap();
    for view in &page.articles {
        let index = f
            .articles
            .iter()
            .position(|a| a.slug == view.slug)
            .unwrap();
        assert_eq!(view.favorited, index == 0 || index == 3, "{}", view.slug);
        assert_eq!(view.author.following, view.author.username == "alice");
    }

    let first = page
        .articles
        .iter()
        .find(|a| a.slug == f.articles[0].slug)
        .unwrap();
    assert_eq!(first.favorites_count, 2);

    let as_bob = f
        .store
        .list(&ListFilter::default().author("bob"), Viewer::from(&f.bob))
        .await
        .unwrap();
    assert!(as_bob.articles.iter().all(|a| !a.author.following));
    assert!(as_bob.articles.iter().all(|a| !a.favorited));
}

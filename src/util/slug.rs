use rand::Rng;

/// Length of the random suffix appended to every slug.
pub const SLUG_SUFFIX_LEN: usize = 6;

/// Characters the random suffix is drawn from.
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Normalizes an article title into the readable part of a slug.
///
/// Lowercases the title, turns spaces into hyphens, drops every character
/// that is not `[a-z0-9-]`, collapses hyphen runs and trims hyphens from
/// both ends. Runs in a single pass over the title.
///
/// # Examples
///
/// ```
/// use conduit_store::util::normalize_title;
///
/// assert_eq!(normalize_title("Hello World"), "hello-world");
/// assert_eq!(normalize_title("  Rust -- 2024 edition!  "), "rust-2024-edition");
/// assert_eq!(normalize_title("¿¡!?"), "");
/// ```
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());

    for c in title.chars().flat_map(char::to_lowercase) {
        match c {
            ' ' | '-' => {
                // Leading hyphens are trimmed, runs are collapsed
                if !out.is_empty() && !out.ends_with('-') {
                    out.push('-');
                }
            }
            'a'..='z' | '0'..='9' => out.push(c),
            _ => {}
        }
    }

    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Generates a slug for `title` using the thread-local RNG.
///
/// The result is the normalized title followed by `-` and a
/// [`SLUG_SUFFIX_LEN`]-character lowercase alphanumeric suffix. A title that
/// normalizes to nothing yields the bare suffix.
///
/// Uniqueness is probabilistic only; storage still enforces it with a
/// unique constraint.
pub fn generate_slug(title: &str) -> String {
    generate_slug_with(title, &mut rand::thread_rng())
}

/// Same as [`generate_slug`] with a caller-supplied RNG.
pub fn generate_slug_with<R: Rng + ?Sized>(title: &str, rng: &mut R) -> String {
    let mut slug = normalize_title(title);
    if !slug.is_empty() {
        slug.push('-');
    }
    slug.extend(
        (0..SLUG_SUFFIX_LEN).map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char),
    );
    slug
}

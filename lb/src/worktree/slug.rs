//! Filesystem-safe slugs derived from ticket titles

/// Longest slug produced by [`slugify`]
pub const MAX_SLUG_LEN: usize = 50;

/// Derive a directory name from a title
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single hyphen, trims hyphens from both ends and caps the result at
/// [`MAX_SLUG_LEN`]. May return an empty string.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    // Output is pure ASCII here, so byte truncation is char-safe
    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

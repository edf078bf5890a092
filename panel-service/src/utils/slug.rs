//! Site slugs: lowercase ASCII alphanumeric words joined by single hyphens.

/// Lowercases, turns every run of non-alphanumeric characters into one `-`
/// and trims hyphens from both ends. `"Acme Co!"` becomes `"acme-co"`.
pub fn normalize_slug(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;

    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// Matches `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn is_valid_slug(value: &str) -> bool {
    !value.is_empty()
        && value.split('-').all(|part| {
            !part.is_empty()
                && part
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
}

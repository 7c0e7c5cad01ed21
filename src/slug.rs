/// Derive a URL slug from a title or name.
///
/// Lower-cases the input, keeps alphanumerics (including non-ASCII letters,
/// so CJK titles survive), and collapses every other run of characters into
/// a single hyphen. Leading and trailing hyphens are trimmed.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Use the explicit slug when one was given, otherwise derive it from `source`.
/// Explicit slugs are normalised too so clients can't smuggle in spaces.
pub fn resolve(explicit: Option<&str>, source: &str) -> Option<String> {
    let slug = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => slugify(s),
        None => slugify(source),
    };
    (!slug.is_empty()).then_some(slug)
}

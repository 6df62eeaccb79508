//! Label normalization.

/// Converts heading text to a label, e.g. `Heading 1` to `heading-1`.
///
/// Whitespace, `-` and `_` become `-`, letters are lowercased, `#` is kept
/// as is and every other punctuation character is dropped.
#[must_use]
pub fn anchor(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            '#' => Some('#'),
            '-' | '_' => Some('-'),
            c if c.is_whitespace() => Some('-'),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        })
        .collect()
}

/// Whether a link URL points outside the story.
#[must_use]
pub fn is_normal_link(url: &str) -> bool {
    ["http://", "https://", "ftp://", "www.", "./#"]
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

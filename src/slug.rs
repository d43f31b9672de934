//! URL slug conversion

use lazy_static::lazy_static;
use regex_lite::Regex;
use thiserror::Error;

lazy_static! {
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9]+").expect("static regex");
}

/// Slug conversion errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    #[error("Empty string not permitted")]
    EmptyInput,

    #[error("After removing characters, slug is zero length")]
    EmptySlug,
}

/// Convert `s` to a lowercase, hyphen-delimited slug.
///
/// Runs of characters outside `a-z0-9` collapse into a single `-` and leading
/// and trailing hyphens are trimmed. Input made only of characters outside the
/// basic Latin alphanumerics yields [`SlugError::EmptySlug`].
pub fn to_slug(s: &str) -> Result<String, SlugError> {
    if s.is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let lowered = s.to_lowercase();
    let slug = NON_ALNUM.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');

    if slug.is_empty() {
        return Err(SlugError::EmptySlug);
    }
    Ok(slug.to_string())
}

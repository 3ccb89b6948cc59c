//! Slug derivation for blog posts.
//!
//! Titles are transliterated through `slug::slugify`, so Turkish input such as
//! "Çalışma Notları" becomes `calisma-notlari`. Slugs typed by the author are
//! normalised the same way before they reach storage.

use slug::slugify;
use thiserror::Error;

const MAX_SLUG_LEN: usize = 120;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("slug exceeds {max} characters")]
    TooLong { max: usize },
}

/// Derive a slug from human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }
    if candidate.len() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong { max: MAX_SLUG_LEN });
    }

    Ok(candidate)
}

/// Use the explicit slug when one was typed, otherwise derive it from the title.
pub fn resolve_slug(explicit: Option<&str>, title: &str) -> Result<String, SlugError> {
    match explicit.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => derive_slug(value),
        None => derive_slug(title),
    }
}

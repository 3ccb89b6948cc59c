//! Post input types and the small amount of derived data shown next to posts.

use uuid::Uuid;

use super::{
    entities::PostRecord,
    error::DomainError,
    slug::{SlugError, resolve_slug},
};

/// Average reading speed used for the "N dk okuma" hint.
pub const WORDS_PER_MINUTE: usize = 200;

/// Fields submitted when authoring a new post.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    /// Blank means "derive from title".
    pub slug: String,
    pub author_id: Option<String>,
    pub published: bool,
}

/// Validated post ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPost {
    pub title: String,
    pub content: String,
    pub slug: String,
    pub author_id: Option<String>,
    pub published: bool,
}

impl NewPost {
    pub fn validate(self) -> Result<ValidPost, DomainError> {
        let title = require_text("title", &self.title)?;
        let content = require_text("content", &self.content)?;
        let explicit = (!self.slug.trim().is_empty()).then_some(self.slug.as_str());
        let slug = resolve_slug(explicit, &title).map_err(slug_error)?;

        Ok(ValidPost {
            title,
            content,
            slug,
            author_id: self.author_id,
            published: self.published,
        })
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub slug: Option<String>,
    pub published: Option<bool>,
}

impl PostPatch {
    pub fn validate(self) -> Result<PostPatch, DomainError> {
        let title = self
            .title
            .map(|value| require_text("title", &value))
            .transpose()?;
        let content = self
            .content
            .map(|value| require_text("content", &value))
            .transpose()?;
        let slug = self
            .slug
            .map(|value| resolve_slug(Some(&value), "").map_err(slug_error))
            .transpose()?;

        Ok(PostPatch {
            title,
            content,
            slug,
            published: self.published,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.slug.is_none()
            && self.published.is_none()
    }
}

/// Listing row for the blog index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub published: bool,
    pub created_at: time::OffsetDateTime,
    pub reading_minutes: usize,
}

impl From<&PostRecord> for PostSummary {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            title: post.title.clone(),
            slug: post.slug.clone(),
            published: post.published,
            created_at: post.created_at,
            reading_minutes: reading_minutes(&post.content),
        }
    }
}

/// Whole minutes needed to read `content`, rounded up. Never below one.
pub fn reading_minutes(content: &str) -> usize {
    let words = content.split_whitespace().count().max(1);
    words.div_ceil(WORDS_PER_MINUTE)
}

fn require_text(field: &'static str, value: &str) -> Result<String, DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    Ok(value.to_string())
}

fn slug_error(err: SlugError) -> DomainError {
    DomainError::validation("slug", err.to_string())
}

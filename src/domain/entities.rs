//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Page key of the editable home page prose.
pub const HOMEPAGE_KEY: &str = "homepage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub author_id: Option<String>,
    pub published: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageContentRecord {
    pub id: Uuid,
    pub page_key: String,
    pub content: String,
    pub last_updated_by: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PageContentRecord {
    /// Public path whose rendering depends on this page content.
    pub fn public_path(&self) -> String {
        page_path(&self.page_key)
    }
}

/// Map a page key to the path that displays it.
pub fn page_path(page_key: &str) -> String {
    if page_key == HOMEPAGE_KEY {
        "/".to_string()
    } else {
        format!("/{page_key}")
    }
}

/// Map a post slug to its detail path.
pub fn post_path(slug: &str) -> String {
    format!("/blog/{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homepage_maps_to_root() {
        assert_eq!(page_path(HOMEPAGE_KEY), "/");
        assert_eq!(page_path("about"), "/about");
        assert_eq!(post_path("hello"), "/blog/hello");
    }
}

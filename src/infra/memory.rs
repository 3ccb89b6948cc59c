//! In-memory repositories for local runs without a database and for tests.

use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CreatePostParams, PagesRepo, PagesWriteRepo, PostsRepo, PostsWriteRepo, RepoError,
        UpdatePostParams, UpsertPageContentParams,
    },
    cache::lock::{rw_read, rw_write},
    domain::entities::{PageContentRecord, PostRecord},
};

const SOURCE: &str = "infra::memory";

#[derive(Default)]
struct Tables {
    /// Insertion order; listings reverse it.
    posts: Vec<PostRecord>,
    pages: Vec<PageContentRecord>,
}

#[derive(Default)]
pub struct MemoryRepositories {
    tables: RwLock<Tables>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_homepage(content: &str) -> Self {
        let repos = Self::default();
        let now = OffsetDateTime::now_utc();
        rw_write(&repos.tables, SOURCE, "seed").pages.push(PageContentRecord {
            id: Uuid::new_v4(),
            page_key: crate::domain::entities::HOMEPAGE_KEY.to_string(),
            content: content.to_string(),
            last_updated_by: None,
            created_at: now,
            updated_at: now,
        });
        repos
    }

    fn newest_first<F>(&self, op: &'static str, filter: F) -> Vec<PostRecord>
    where
        F: Fn(&PostRecord) -> bool,
    {
        rw_read(&self.tables, SOURCE, op)
            .posts
            .iter()
            .rev()
            .filter(|post| filter(post))
            .cloned()
            .collect()
    }
}

fn duplicate_slug() -> RepoError {
    RepoError::Duplicate {
        constraint: "posts_slug_key".to_string(),
    }
}

#[async_trait]
impl PostsRepo for MemoryRepositories {
    async fn list_published(&self) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.newest_first("list_published", |post| post.published))
    }

    async fn list_by_author(&self, author_id: &str) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.newest_first("list_by_author", |post| {
            post.author_id.as_deref() == Some(author_id)
        }))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        Ok(rw_read(&self.tables, SOURCE, "find_by_slug")
            .posts
            .iter()
            .find(|post| post.slug == slug)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(rw_read(&self.tables, SOURCE, "find_by_id")
            .posts
            .iter()
            .find(|post| post.id == id)
            .cloned())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "create_post");
        if tables.posts.iter().any(|post| post.slug == params.slug) {
            return Err(duplicate_slug());
        }

        let now = OffsetDateTime::now_utc();
        let record = PostRecord {
            id: Uuid::new_v4(),
            title: params.title,
            content: params.content,
            slug: params.slug,
            author_id: params.author_id,
            published: params.published,
            created_at: now,
            updated_at: now,
        };
        tables.posts.push(record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "update_post");
        if let Some(slug) = params.slug.as_deref()
            && tables
                .posts
                .iter()
                .any(|post| post.slug == slug && post.id != params.id)
        {
            return Err(duplicate_slug());
        }

        let post = tables
            .posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        if let Some(title) = params.title {
            post.title = title;
        }
        if let Some(content) = params.content {
            post.content = content;
        }
        if let Some(slug) = params.slug {
            post.slug = slug;
        }
        if let Some(published) = params.published {
            post.published = published;
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "delete_post");
        let position = tables.posts.iter().position(|post| post.id == id);
        Ok(position.map(|index| tables.posts.remove(index)))
    }
}

#[async_trait]
impl PagesRepo for MemoryRepositories {
    async fn find_page_content(
        &self,
        page_key: &str,
    ) -> Result<Option<PageContentRecord>, RepoError> {
        Ok(rw_read(&self.tables, SOURCE, "find_page_content")
            .pages
            .iter()
            .find(|page| page.page_key == page_key)
            .cloned())
    }
}

#[async_trait]
impl PagesWriteRepo for MemoryRepositories {
    async fn upsert_page_content(
        &self,
        params: UpsertPageContentParams,
    ) -> Result<PageContentRecord, RepoError> {
        let mut tables = rw_write(&self.tables, SOURCE, "upsert_page_content");
        let now = OffsetDateTime::now_utc();

        if let Some(page) = tables
            .pages
            .iter_mut()
            .find(|page| page.page_key == params.page_key)
        {
            page.content = params.content;
            if params.updated_by.is_some() {
                page.last_updated_by = params.updated_by;
            }
            page.updated_at = now;
            return Ok(page.clone());
        }

        let record = PageContentRecord {
            id: Uuid::new_v4(),
            page_key: params.page_key,
            content: params.content,
            last_updated_by: params.updated_by,
            created_at: now,
            updated_at: now,
        };
        tables.pages.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(slug: &str) -> CreatePostParams {
        CreatePostParams {
            title: slug.to_uppercase(),
            content: "body".to_string(),
            slug: slug.to_string(),
            author_id: None,
            published: true,
        }
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let repos = MemoryRepositories::new();
        repos.create_post(params("first")).await.expect("create");
        repos.create_post(params("second")).await.expect("create");

        let slugs: Vec<String> = repos
            .list_published()
            .await
            .expect("list")
            .into_iter()
            .map(|post| post.slug)
            .collect();
        assert_eq!(slugs, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn slug_collisions_are_duplicates() {
        let repos = MemoryRepositories::new();
        let first = repos.create_post(params("a")).await.expect("create");
        repos.create_post(params("b")).await.expect("create");

        assert!(matches!(
            repos.create_post(params("a")).await,
            Err(RepoError::Duplicate { .. })
        ));
        let rename = UpdatePostParams {
            id: first.id,
            title: None,
            content: None,
            slug: Some("b".to_string()),
            published: None,
        };
        assert!(matches!(
            repos.update_post(rename).await,
            Err(RepoError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn upsert_keeps_previous_editor_when_none_given() {
        let repos = MemoryRepositories::with_homepage("hi");
        repos
            .upsert_page_content(UpsertPageContentParams {
                page_key: "homepage".to_string(),
                content: "v2".to_string(),
                updated_by: Some("u1".to_string()),
            })
            .await
            .expect("upsert");
        let page = repos
            .upsert_page_content(UpsertPageContentParams {
                page_key: "homepage".to_string(),
                content: "v3".to_string(),
                updated_by: None,
            })
            .await
            .expect("upsert");

        assert_eq!(page.content, "v3");
        assert_eq!(page.last_updated_by.as_deref(), Some("u1"));
    }
}

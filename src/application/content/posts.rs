use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::application::repos::{CreatePostParams, PostsRepo, PostsWriteRepo, UpdatePostParams};
use crate::domain::{
    entities::{PostRecord, post_path},
    error::DomainError,
    posts::{NewPost, PostPatch, PostSummary},
};

use super::{ContentError, RevalidationHook};

const SOURCE: &str = "application::content::posts";

#[derive(Clone)]
pub struct BlogService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    hook: RevalidationHook,
}

impl BlogService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        hook: RevalidationHook,
    ) -> Self {
        Self {
            reader,
            writer,
            hook,
        }
    }

    /// Published posts, newest first. Empty on backend failure.
    pub async fn list_published(&self) -> Vec<PostSummary> {
        match self.reader.list_published().await {
            Ok(posts) => posts.iter().map(PostSummary::from).collect(),
            Err(err) => {
                error!(target = SOURCE, error = %err, "failed to list published posts");
                Vec::new()
            }
        }
    }

    /// Every post of `author_id`, drafts included.
    pub async fn list_for_author(&self, author_id: &str) -> Vec<PostSummary> {
        match self.reader.list_by_author(author_id).await {
            Ok(posts) => posts.iter().map(PostSummary::from).collect(),
            Err(err) => {
                error!(target = SOURCE, author_id, error = %err, "failed to list author posts");
                Vec::new()
            }
        }
    }

    pub async fn get_by_slug(&self, slug: &str) -> Option<PostRecord> {
        match self.reader.find_by_slug(slug).await {
            Ok(post) => post,
            Err(err) => {
                error!(target = SOURCE, slug, error = %err, "failed to load post");
                None
            }
        }
    }

    pub async fn create(&self, post: NewPost) -> Result<PostRecord, ContentError> {
        let valid = post.validate()?;
        let created = self
            .writer
            .create_post(CreatePostParams {
                title: valid.title,
                content: valid.content,
                slug: valid.slug,
                author_id: valid.author_id,
                published: valid.published,
            })
            .await?;
        info!(target = SOURCE, post_id = %created.id, slug = %created.slug, "post created");

        self.hook.run(None).await;
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, patch: PostPatch) -> Result<PostRecord, ContentError> {
        let patch = patch.validate()?;
        let previous = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;

        let updated = self
            .writer
            .update_post(UpdatePostParams {
                id,
                title: patch.title,
                content: patch.content,
                slug: patch.slug,
                published: patch.published,
            })
            .await?;
        info!(target = SOURCE, post_id = %id, slug = %updated.slug, "post updated");

        self.hook.run(Some(&post_path(&updated.slug))).await;
        if previous.slug != updated.slug {
            self.hook.run(Some(&post_path(&previous.slug))).await;
        }
        self.hook.run(Some("/blog")).await;
        Ok(updated)
    }

    /// `true` when a post was removed.
    pub async fn delete(&self, id: Uuid) -> bool {
        match self.writer.delete_post(id).await {
            Ok(Some(removed)) => {
                info!(target = SOURCE, post_id = %id, slug = %removed.slug, "post deleted");
                self.hook.run(Some("/blog")).await;
                self.hook.run(Some(&post_path(&removed.slug))).await;
                true
            }
            Ok(None) => {
                info!(target = SOURCE, post_id = %id, "delete matched no post");
                false
            }
            Err(err) => {
                error!(target = SOURCE, post_id = %id, error = %err, "failed to delete post");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::content::test_support::RecordingRevalidator;
    use crate::application::repos::RepoError;
    use crate::infra::memory::MemoryRepositories;

    fn service(revalidator: Arc<RecordingRevalidator>) -> (BlogService, Arc<MemoryRepositories>) {
        let repos = Arc::new(MemoryRepositories::default());
        let hook = RevalidationHook::new(revalidator, Duration::from_secs(1));
        (BlogService::new(repos.clone(), repos.clone(), hook), repos)
    }

    fn hello() -> NewPost {
        NewPost {
            title: "Hello".to_string(),
            content: "World".to_string(),
            slug: "hello".to_string(),
            author_id: Some("author-1".to_string()),
            published: true,
        }
    }

    #[tokio::test]
    async fn create_then_get_by_slug() {
        let revalidator = Arc::new(RecordingRevalidator::default());
        let (service, _) = service(revalidator.clone());

        service.create(hello()).await.expect("created");
        let post = service.get_by_slug("hello").await.expect("found");

        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "World");
        assert_eq!(revalidator.calls(), vec!["*"]);
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let revalidator = Arc::new(RecordingRevalidator::default());
        let (service, _) = service(revalidator.clone());
        let created = service.create(hello()).await.expect("created");

        assert!(service.delete(created.id).await);
        assert!(service.get_by_slug("hello").await.is_none());
        assert!(!service.delete(created.id).await);
        assert_eq!(revalidator.calls(), vec!["*", "/blog", "/blog/hello"]);
    }

    #[tokio::test]
    async fn update_revalidates_detail_and_index() {
        let revalidator = Arc::new(RecordingRevalidator::default());
        let (service, _) = service(revalidator.clone());
        let created = service.create(hello()).await.expect("created");

        let updated = service
            .update(
                created.id,
                PostPatch {
                    title: Some("Merhaba".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("updated");

        assert_eq!(updated.title, "Merhaba");
        assert_eq!(updated.slug, "hello");
        assert_eq!(revalidator.calls(), vec!["*", "/blog/hello", "/blog"]);
    }

    #[tokio::test]
    async fn slug_change_revalidates_the_old_path_too() {
        let revalidator = Arc::new(RecordingRevalidator::default());
        let (service, _) = service(revalidator.clone());
        let created = service.create(hello()).await.expect("created");

        service
            .update(
                created.id,
                PostPatch {
                    slug: Some("Yeni Adres".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("updated");

        assert_eq!(
            revalidator.calls(),
            vec!["*", "/blog/yeni-adres", "/blog/hello", "/blog"]
        );
        assert!(service.get_by_slug("yeni-adres").await.is_some());
    }

    #[tokio::test]
    async fn failed_revalidation_does_not_fail_the_write() {
        let revalidator = Arc::new(RecordingRevalidator::failing());
        let (service, _) = service(revalidator.clone());

        let created = service.create(hello()).await;
        assert!(created.is_ok());
        assert_eq!(revalidator.calls().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_and_duplicates_are_errors() {
        let revalidator = Arc::new(RecordingRevalidator::default());
        let (service, _) = service(revalidator.clone());

        let err = service
            .create(NewPost {
                title: String::new(),
                ..hello()
            })
            .await
            .expect_err("blank title");
        assert!(matches!(err, ContentError::Domain(DomainError::Validation { .. })));

        service.create(hello()).await.expect("created");
        let err = service.create(hello()).await.expect_err("duplicate slug");
        assert!(matches!(err, ContentError::Repo(RepoError::Duplicate { .. })));
        assert_eq!(revalidator.calls(), vec!["*"]);
    }

    #[tokio::test]
    async fn update_of_missing_post_is_not_found() {
        let revalidator = Arc::new(RecordingRevalidator::default());
        let (service, _) = service(revalidator);

        let err = service
            .update(
                Uuid::new_v4(),
                PostPatch {
                    title: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn listings_filter_drafts_and_authors() {
        let revalidator = Arc::new(RecordingRevalidator::default());
        let (service, _) = service(revalidator);
        service.create(hello()).await.expect("created");
        service
            .create(NewPost {
                title: "Taslak".to_string(),
                slug: String::new(),
                published: false,
                ..hello()
            })
            .await
            .expect("draft");

        let published = service.list_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].slug, "hello");

        let mine = service.list_for_author("author-1").await;
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].slug, "taslak");
        assert!(service.list_for_author("someone-else").await.is_empty());
    }
}

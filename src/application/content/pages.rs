use std::sync::Arc;

use tracing::{error, info};

use crate::application::repos::{PagesRepo, PagesWriteRepo, UpsertPageContentParams};
use crate::domain::{
    entities::{PageContentRecord, page_path},
    error::DomainError,
};

use super::{ContentError, RevalidationHook};

const SOURCE: &str = "application::content::pages";

#[derive(Clone)]
pub struct PageContentService {
    reader: Arc<dyn PagesRepo>,
    writer: Arc<dyn PagesWriteRepo>,
    hook: RevalidationHook,
}

impl PageContentService {
    pub fn new(
        reader: Arc<dyn PagesRepo>,
        writer: Arc<dyn PagesWriteRepo>,
        hook: RevalidationHook,
    ) -> Self {
        Self {
            reader,
            writer,
            hook,
        }
    }

    pub async fn get(&self, page_key: &str) -> Option<PageContentRecord> {
        match self.reader.find_page_content(page_key).await {
            Ok(page) => page,
            Err(err) => {
                error!(target = SOURCE, page_key, error = %err, "failed to load page content");
                None
            }
        }
    }

    /// Replace the markdown of `page_key`, then revalidate the page that shows it.
    pub async fn update(
        &self,
        page_key: &str,
        content: &str,
        user_id: Option<&str>,
    ) -> Result<PageContentRecord, ContentError> {
        if page_key.trim().is_empty() {
            return Err(DomainError::validation("page_key", "must not be empty").into());
        }

        let page = self
            .writer
            .upsert_page_content(UpsertPageContentParams {
                page_key: page_key.to_string(),
                content: content.to_string(),
                updated_by: user_id.map(str::to_string),
            })
            .await?;
        info!(target = SOURCE, page_key, "page content updated");

        self.hook.run(Some(&page_path(page_key))).await;
        Ok(page)
    }
}
